//! The message shape callers hand to the mailer.

use serde::{Deserialize, Deserializer};
use shopmail_mime::Mailbox;

/// An email to send.
///
/// Deserializes from `{ "to", "subject", "text"?, "html"?, "bcc"? }`, where
/// `to` and `bcc` take one mailbox or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutboundMessage {
    /// Primary recipients; at least one is required.
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<Mailbox>,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Plain-text body.
    #[serde(default)]
    pub text: Option<String>,
    /// HTML body.
    #[serde(default)]
    pub html: Option<String>,
    /// Blind-copy recipients.
    #[serde(default, deserialize_with = "one_or_many")]
    pub bcc: Vec<Mailbox>,
}

impl OutboundMessage {
    /// Creates a message to a single recipient.
    #[must_use]
    pub fn new(to: Mailbox, subject: impl Into<String>) -> Self {
        Self {
            to: vec![to],
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: Mailbox) -> Self {
        self.to.push(recipient);
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: Mailbox) -> Self {
        self.bcc.push(recipient);
        self
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }
}

// A list is tried first: a two-element array would otherwise
// deserialize as an {address, name} pair.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Mailbox>),
    One(Mailbox),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Mailbox>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(list)) => list,
        Some(OneOrMany::One(mailbox)) => vec![mailbox],
        None => Vec::new(),
    })
}
