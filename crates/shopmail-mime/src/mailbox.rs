//! Mailboxes: an address with an optional display name.

use std::fmt;
use std::str::FromStr;

use crate::encoding::{encode_rfc2047, needs_encoding};
use crate::error::{Error, Result};

/// An email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(try_from = "MailboxInput")
)]
pub struct Mailbox {
    /// Display name, e.g. `Shop Orders`.
    pub name: Option<String>,
    /// Bare address, e.g. `orders@shop.example.com`.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox, validating the address.
    ///
    /// An empty or blank name is treated as no name.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is malformed.
    pub fn new(address: impl Into<String>, name: Option<String>) -> Result<Self> {
        let address = address.into().trim().to_string();
        validate_address(&address)?;

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if name.as_deref().is_some_and(|n| n.contains(['\r', '\n'])) {
            return Err(Error::InvalidAddress(
                "Display name contains a line break".into(),
            ));
        }

        Ok(Self { name, address })
    }

    /// Parses `addr`, `<addr>` or `Name <addr>`.
    ///
    /// A quoted name has its quotes and escapes removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a single mailbox.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let Some(open) = input.rfind('<') else {
            return Self::new(input, None);
        };
        let address = input[open + 1..]
            .strip_suffix('>')
            .ok_or_else(|| Error::InvalidAddress(input.to_string()))?;

        let name = input[..open].trim();
        let name = match name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
        {
            Some(quoted) => unescape(quoted),
            None => name.to_string(),
        };

        Self::new(address, Some(name))
    }

    /// Returns the domain part of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map_or("", |(_, domain)| domain)
    }

    /// Formats the mailbox for a header.
    ///
    /// Printable ASCII names are quoted; anything else becomes an RFC 2047
    /// encoded word in `charset`.
    #[must_use]
    pub fn format(&self, charset: &str) -> String {
        match &self.name {
            None => self.address.clone(),
            Some(name) if needs_encoding(name) => {
                format!("{} <{}>", encode_rfc2047(name, charset), self.address)
            }
            Some(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\" <{}>", self.address)
            }
        }
    }
}

impl FromStr for Mailbox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("UTF-8"))
    }
}

fn validate_address(address: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::InvalidAddress(format!("{address}: {reason}")));

    if address.is_empty() {
        return invalid("empty");
    }
    if address
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || matches!(c, '<' | '>' | ',' | '"'))
    {
        return invalid("contains a forbidden character");
    }
    match address.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => invalid("expected local@domain"),
    }
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Accepted request shapes: `"addr"`, `"Name <addr>"` or `{ "address", "name" }`.
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum MailboxInput {
    Text(String),
    Pair {
        address: String,
        #[serde(default)]
        name: Option<String>,
    },
}

#[cfg(feature = "serde")]
impl TryFrom<MailboxInput> for Mailbox {
    type Error = Error;

    fn try_from(input: MailboxInput) -> Result<Self> {
        match input {
            MailboxInput::Text(text) => Self::parse(&text),
            MailboxInput::Pair { address, name } => Self::new(address, name),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let mailbox = Mailbox::parse("  orders@shop.example.com ").unwrap();
        assert_eq!(mailbox.address, "orders@shop.example.com");
        assert_eq!(mailbox.name, None);
        assert_eq!(mailbox.domain(), "shop.example.com");
    }

    #[test]
    fn test_parse_named() {
        let mailbox = Mailbox::parse("Shop Orders <orders@shop.example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Shop Orders"));
        assert_eq!(mailbox.address, "orders@shop.example.com");

        let mailbox = Mailbox::parse(r#""Smith, \"Jo\"" <jo@example.org>"#).unwrap();
        assert_eq!(mailbox.name.as_deref(), Some(r#"Smith, "Jo""#));

        let mailbox = Mailbox::parse("<jo@example.org>").unwrap();
        assert_eq!(mailbox.name, None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Mailbox::parse("").is_err());
        assert!(Mailbox::parse("no-at-sign").is_err());
        assert!(Mailbox::parse("a@b@c").is_err());
        assert!(Mailbox::parse("@example.org").is_err());
        assert!(Mailbox::parse("Name <jo@example.org").is_err());
        assert!(Mailbox::parse("jo@example.org\r\nBcc: x@y").is_err());
        assert!(Mailbox::new("jo@example.org", Some("Evil\r\nBcc: x@y".into())).is_err());
    }

    #[test]
    fn test_format() {
        let bare = Mailbox::new("jo@example.org", Some("  ".into())).unwrap();
        assert_eq!(bare.format("UTF-8"), "jo@example.org");

        let ascii = Mailbox::new("jo@example.org", Some(r#"Jo "JJ" \ Smith"#.into())).unwrap();
        assert_eq!(ascii.format("UTF-8"), r#""Jo \"JJ\" \\ Smith" <jo@example.org>"#);

        let hebrew = Mailbox::new("books@shop.example.com", Some("חנות".into())).unwrap();
        assert_eq!(hebrew.format("UTF-8"), "=?UTF-8?B?15fXoNeV16o=?= <books@shop.example.com>");
    }

    #[test]
    fn test_formatted_name_parses_back() {
        let original = Mailbox::new("jo@example.org", Some(r#"Smith, "Jo""#.into())).unwrap();
        assert_eq!(Mailbox::parse(&original.to_string()).unwrap(), original);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_shapes() {
        let list: Vec<Mailbox> = serde_json::from_str(
            r#"["a@example.org", "Bee <b@example.org>", {"address": "c@example.org", "name": "Cee"}]"#,
        )
        .unwrap();
        assert_eq!(list[0].address, "a@example.org");
        assert_eq!(list[1].name.as_deref(), Some("Bee"));
        assert_eq!(list[2].name.as_deref(), Some("Cee"));

        assert!(serde_json::from_str::<Mailbox>(r#""not an address""#).is_err());
    }
}
