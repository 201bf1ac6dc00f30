//! # shopmail-core
//!
//! Outbound mail for the shop: one call sends one message over one
//! submission connection (STARTTLS, optional AUTH LOGIN, single transaction).
//!
//! ```ignore
//! use shopmail_core::{Mailer, MailerConfig, OutboundMessage};
//! use shopmail_mime::Mailbox;
//!
//! let mailer = Mailer::new(MailerConfig::from_env()?);
//! let report = mailer
//!     .send_email(
//!         OutboundMessage::new(Mailbox::parse("reader@example.org")?, "Order received")
//!             .text("Thanks!")
//!             .html("<p>Thanks!</p>"),
//!     )
//!     .await?;
//! println!("sent {}", report.message_id);
//! ```
//!
//! Every send also blind-copies the configured operational mailbox, if any.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
mod mailer;
mod message;

pub use config::{ConfigError, MailerConfig};
pub use error::{MailError, Result};
pub use mailer::{Mailer, SendReport};
pub use message::OutboundMessage;
