//! # shopmail-mime
//!
//! MIME generation for transactional email.
//!
//! ## Features
//!
//! - **Message generation**: single-part text or HTML, or `multipart/alternative`
//! - **Header encoding**: RFC 2047 encoded words for non-ASCII subjects and names
//! - **Mailboxes**: `addr` / `Name <addr>` parsing and formatting
//!
//! ## Quick Start
//!
//! ```ignore
//! use shopmail_mime::{Mailbox, MessageBuilder};
//!
//! let message = MessageBuilder::new()
//!     .from(Mailbox::parse("Shop <orders@shop.example.com>")?)
//!     .to(Mailbox::parse("reader@example.org")?)
//!     .subject("אישור הזמנה")
//!     .text("Thanks for your order")
//!     .html("<p>Thanks for your order</p>")
//!     .build()?; // multipart/alternative
//!
//! let wire = message.to_bytes();
//! ```
//!
//! ### Encoded words
//!
//! ```ignore
//! use shopmail_mime::encoding::{decode_rfc2047, encode_rfc2047};
//!
//! let encoded = encode_rfc2047("Héllo", "UTF-8");
//! assert_eq!(decode_rfc2047(&encoded)?, "Héllo");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod mailbox;
mod message;

pub mod encoding;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use mailbox::Mailbox;
pub use message::{
    BccHeader, DEFAULT_CHARSET, Message, MessageBuilder, Part, TransferEncoding,
    generate_boundary,
};
