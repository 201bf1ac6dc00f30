//! # shopmail-smtp
//!
//! SMTP submission client: STARTTLS, AUTH LOGIN and a single mail transaction
//! per connection.
//!
//! ## Quick Start
//!
//! ```ignore
//! use shopmail_smtp::{Address, Client};
//! use shopmail_smtp::connection::connect;
//!
//! #[tokio::main]
//! async fn main() -> shopmail_smtp::Result<()> {
//!     let stream = connect("smtp.example.com", 587, None).await?;
//!     let client = Client::greet(stream, None).await?;
//!
//!     let client = client
//!         .ehlo("shop.example.com")
//!         .await?
//!         .starttls("smtp.example.com", "shop.example.com")
//!         .await?;
//!     let client = client.auth_login("user", "password").await?;
//!
//!     let client = client
//!         .mail_from(Address::new("orders@shop.example.com")?, None)
//!         .await?
//!         .rcpt_to(Address::new("reader@example.org")?)
//!         .await?
//!         .data()
//!         .await?;
//!
//!     let client = client
//!         .send_message(b"Subject: Test\r\n\r\nHello\r\n")
//!         .await?;
//!     client.quit().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! greet() ─→ Greeted ── ehlo() / starttls() ──┐
//!               │                              │
//!               ├── auth_login() / skip_auth() ─→ Ready
//!                                                  │
//!      Ready ←── send_message() ── Data ←── data() ── RecipientAdded ←── rcpt_to() ── MailTransaction
//! ```
//!
//! Any rejected step returns an error and drops the connection.
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Transport, TLS upgrade and type-state client
//! - [`parser`]: Reply parsing and framing
//! - [`types`]: Addresses, extensions, replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Client, Data, Greeted, MailTransaction, Ready, RecipientAdded, ServerInfo, SmtpStream,
    Transport,
};
pub use error::{Error, Result};
pub use parser::ReplyBuffer;
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
