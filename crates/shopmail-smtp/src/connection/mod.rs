//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{Client, Data, Greeted, MailTransaction, Ready, RecipientAdded};
pub use stream::{SmtpStream, Transport, connect};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Replaces the capability set with the lines of an EHLO reply.
    ///
    /// The first line is the server's greeting, not a capability.
    pub(crate) fn set_capabilities(&mut self, ehlo_lines: &[String]) {
        self.extensions = ehlo_lines
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is advertised.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if any AUTH capability is advertised.
    #[must_use]
    pub fn supports_auth(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Auth(_)))
    }

    /// Checks if 8BITMIME is advertised.
    #[must_use]
    pub fn supports_8bitmime(&self) -> bool {
        self.supports(&Extension::EightBitMime)
    }

    /// Returns the maximum message size, if advertised.
    ///
    /// The outer option tells whether SIZE is advertised at all.
    #[must_use]
    pub fn max_message_size(&self) -> Option<Option<usize>> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => Some(*size),
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
