//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure (refused, reset, TLS handshake).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The hostname cannot be used as a TLS server name.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Server answered a command with a code outside the accepted set.
    #[error("{command} failed with {code}: {}", .lines.join(" | "))]
    UnexpectedReply {
        /// Command text as sent, with credentials redacted.
        command: String,
        /// Reply code received.
        code: u16,
        /// Every line of the reply.
        lines: Vec<String>,
    },

    /// The socket reached EOF before a complete reply was framed.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Malformed data from the server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid envelope address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// STARTTLS requested on a stream that is already encrypted.
    #[error("Connection already uses TLS")]
    AlreadyTls,

    /// Connect or reply wait exceeded the configured limit.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Builds an [`Error::UnexpectedReply`].
    #[must_use]
    pub fn unexpected_reply(command: impl Into<String>, code: u16, lines: Vec<String>) -> Self {
        Self::UnexpectedReply {
            command: command.into(),
            code,
            lines,
        }
    }

    /// Returns the reply code for protocol rejections.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedReply { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent rejection (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::UnexpectedReply { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient rejection (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::UnexpectedReply { code, .. } if *code >= 400 && *code < 500)
    }
}
