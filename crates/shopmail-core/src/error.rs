//! Error types for the core library.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while sending mail.
///
/// Messages may carry server diagnostics; show end users a generic message
/// and log the detail instead.
#[derive(Debug, Error)]
pub enum MailError {
    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The message cannot be sent as given.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Connection, TLS or protocol failure, including timeouts.
    #[error("SMTP error: {0}")]
    Smtp(#[from] shopmail_smtp::Error),

    /// Message construction failed.
    #[error("MIME error: {0}")]
    Mime(#[from] shopmail_mime::Error),
}

impl MailError {
    /// Returns the rejected reply code, if the server refused a step.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Smtp(e) => e.reply_code(),
            _ => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, MailError>;
