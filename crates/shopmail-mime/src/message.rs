//! MIME message structure and generation.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::content_type::ContentType;
use crate::encoding::{encode_rfc2047, is_ascii_charset, is_supported_charset};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::mailbox::Mailbox;

/// Charset used when none is configured.
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text, sent with `BODY=8BITMIME`.
    EightBit,
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
        }
    }
}

/// Whether BCC recipients are listed in the message headers.
///
/// Envelope delivery is the same either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BccHeader {
    /// Write a `Bcc:` header, visible to every recipient.
    #[default]
    Visible,
    /// Leave BCC recipients out of the headers.
    Hidden,
}

impl BccHeader {
    /// Parses `visible` or `hidden`, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visible" => Some(Self::Visible),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }
}

/// MIME message part.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body with CRLF line endings.
    pub body: String,
}

impl Part {
    fn text(content_type: ContentType, body: &str) -> Self {
        let mut headers = Headers::new();
        headers.add("Content-Type", content_type.to_string());
        // Bodies always go out as 8bit text, ASCII or not
        headers.add(
            "Content-Transfer-Encoding",
            TransferEncoding::EightBit.to_string(),
        );
        Self {
            headers,
            body: normalize_crlf(body),
        }
    }

    /// Gets the content type of this part.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain("us-ascii")), ContentType::parse)
    }
}

/// MIME message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Message parts (empty for single-part messages).
    pub parts: Vec<Part>,
    /// Body for single-part messages.
    pub body: Option<String>,
}

impl Message {
    /// Gets the content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain("us-ascii")), ContentType::parse)
    }

    /// Gets the Subject header as written (possibly RFC 2047 encoded).
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("subject")
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id")
    }

    /// Renders the message with CRLF line endings.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.headers)?;

        if let Some(body) = &self.body {
            return f.write_str(body);
        }

        let content_type = self.content_type().map_err(|_| fmt::Error)?;
        let boundary = content_type.boundary().ok_or(fmt::Error)?;
        for part in &self.parts {
            write!(f, "--{boundary}\r\n{}\r\n{}", part.headers, part.body)?;
        }
        write!(f, "--{boundary}--\r\n")
    }
}

/// Builder for outgoing messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    subject: String,
    text: Option<String>,
    html: Option<String>,
    charset: String,
    bcc_header: BccHeader,
    date: Option<DateTime<Utc>>,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    /// Creates an empty builder using UTF-8.
    #[must_use]
    pub fn new() -> Self {
        Self {
            from: None,
            to: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            text: None,
            html: None,
            charset: DEFAULT_CHARSET.to_string(),
            bcc_header: BccHeader::default(),
            date: None,
        }
    }

    /// Sets the sender.
    #[must_use]
    pub fn from(mut self, from: Mailbox) -> Self {
        self.from = Some(from);
        self
    }

    /// Adds a primary recipient.
    #[must_use]
    pub fn to(mut self, to: Mailbox) -> Self {
        self.to.push(to);
        self
    }

    /// Adds a blind-copy recipient.
    #[must_use]
    pub fn bcc(mut self, bcc: Mailbox) -> Self {
        self.bcc.push(bcc);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
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

    /// Sets the charset for bodies and encoded words.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Chooses whether BCC recipients appear in the headers.
    #[must_use]
    pub const fn bcc_header(mut self, bcc_header: BccHeader) -> Self {
        self.bcc_header = bcc_header;
        self
    }

    /// Overrides the Date header (defaults to now).
    #[must_use]
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Builds the message.
    ///
    /// Text and HTML together produce `multipart/alternative` with the text
    /// part first; a single body produces a single-part message.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no sender or no primary recipient, or if
    /// the charset cannot label the text (see
    /// [`is_supported_charset`](crate::encoding::is_supported_charset)).
    pub fn build(self) -> Result<Message> {
        self.check_charset()?;
        let from = self
            .from
            .ok_or_else(|| Error::MissingHeader("From".into()))?;
        if self.to.is_empty() {
            return Err(Error::MissingHeader("To".into()));
        }

        let charset = self.charset.as_str();
        let list = |mailboxes: &[Mailbox]| {
            mailboxes
                .iter()
                .map(|m| m.format(charset))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut headers = Headers::new();
        headers.add("From", from.format(charset));
        headers.add("To", list(self.to.as_slice()));
        if self.bcc_header == BccHeader::Visible && !self.bcc.is_empty() {
            headers.add("Bcc", list(self.bcc.as_slice()));
        }
        headers.add("Subject", encode_rfc2047(&self.subject, charset));
        headers.add("Date", self.date.unwrap_or_else(Utc::now).to_rfc2822());
        headers.add(
            "Message-ID",
            format!("<{}@{}>", Uuid::new_v4().simple(), from.domain()),
        );
        headers.add("MIME-Version", "1.0");

        match (self.text, self.html) {
            (Some(text), Some(html)) => {
                let boundary = generate_boundary();
                headers.add(
                    "Content-Type",
                    ContentType::multipart_alternative(boundary).to_string(),
                );
                Ok(Message {
                    headers,
                    parts: vec![
                        Part::text(ContentType::text_plain(charset), &text),
                        Part::text(ContentType::text_html(charset), &html),
                    ],
                    body: None,
                })
            }
            (text, html) => {
                let (content_type, body) = match html {
                    Some(html) => (ContentType::text_html(charset), html),
                    None => (ContentType::text_plain(charset), text.unwrap_or_default()),
                };
                let part = Part::text(content_type, &body);
                for (name, value) in part.headers.iter() {
                    headers.add(name, value);
                }
                Ok(Message {
                    headers,
                    parts: Vec::new(),
                    body: Some(part.body),
                })
            }
        }
    }

    /// Rejects charsets whose label would not match the UTF-8 bytes written.
    fn check_charset(&self) -> Result<()> {
        let charset = self.charset.as_str();
        if !is_supported_charset(charset) {
            return Err(Error::InvalidEncoding(format!(
                "Unsupported charset: {charset}"
            )));
        }
        if !is_ascii_charset(charset) {
            return Ok(());
        }

        let names = self
            .from
            .iter()
            .chain(&self.to)
            .chain(&self.bcc)
            .filter_map(|m| m.name.as_deref());
        let texts = [Some(self.subject.as_str()), self.text.as_deref(), self.html.as_deref()];
        if names.chain(texts.into_iter().flatten()).all(str::is_ascii) {
            Ok(())
        } else {
            Err(Error::InvalidEncoding(format!(
                "Non-ASCII text with charset {charset}"
            )))
        }
    }
}

/// Generates a fresh multipart boundary.
#[must_use]
pub fn generate_boundary() -> String {
    format!("----=_Part_{}", Uuid::new_v4().simple())
}

/// Converts bare LF and CR line endings to CRLF and ends the text with CRLF.
fn normalize_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 32 + 2);
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if lines.peek().is_none() && line.is_empty() && !out.is_empty() {
            break;
        }
        out.push_str(&line.replace('\r', "\r\n"));
        out.push_str("\r\n");
    }
    out
}
