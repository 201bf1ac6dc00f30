//! Mail delivery.
//!
//! One call opens one connection, runs the whole submission dialogue and
//! closes it. A rejected step aborts the send; nothing is retried.

use std::collections::HashSet;

use shopmail_mime::{Mailbox, MessageBuilder};
use shopmail_smtp::connection::connect;
use shopmail_smtp::{Address, Client, Transport};
use tracing::{debug, info, warn};

use crate::config::MailerConfig;
use crate::error::{MailError, Result};
use crate::message::OutboundMessage;

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Number of envelope recipients the server accepted.
    pub recipients: usize,
    /// The `Message-ID` header of the sent message.
    pub message_id: String,
}

/// A message ready for the wire.
struct Envelope {
    from: Address,
    recipients: Vec<Address>,
    body: Vec<u8>,
    message_id: String,
}

/// Sends mail through the configured submission server.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: MailerConfig,
}

impl Mailer {
    /// Creates a mailer.
    #[must_use]
    pub const fn new(config: MailerConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Sends one message over a fresh connection.
    ///
    /// The message is built before connecting, so invalid input never opens
    /// a socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is invalid, the connection or TLS
    /// upgrade fails, or the server rejects any step.
    pub async fn send_email(&self, message: OutboundMessage) -> Result<SendReport> {
        let envelope = self.prepare(message)?;
        let stream = connect(&self.config.host, self.config.port, self.config.timeout)
            .await
            .inspect_err(|e| warn!(host = %self.config.host, error = %e, "connection failed"))?;
        self.deliver(stream, envelope).await
    }

    /// Sends one message over an already connected transport.
    ///
    /// # Errors
    ///
    /// Same as [`Mailer::send_email`], minus connecting.
    pub async fn send_email_over<T: Transport>(
        &self,
        transport: T,
        message: OutboundMessage,
    ) -> Result<SendReport> {
        let envelope = self.prepare(message)?;
        self.deliver(transport, envelope).await
    }

    fn prepare(&self, message: OutboundMessage) -> Result<Envelope> {
        if message.to.is_empty() {
            return Err(MailError::InvalidMessage("No recipients specified".into()));
        }

        let charset = self.config.charset.as_str();
        let bcc = with_default_bcc(message.bcc, self.config.default_bcc.as_ref(), charset);

        let mut builder = MessageBuilder::new()
            .from(self.config.from.clone())
            .charset(charset)
            .bcc_header(self.config.bcc_header)
            .subject(message.subject);
        for to in &message.to {
            builder = builder.to(to.clone());
        }
        for bcc in &bcc {
            builder = builder.bcc(bcc.clone());
        }
        if let Some(text) = message.text {
            builder = builder.text(text);
        }
        if let Some(html) = message.html {
            builder = builder.html(html);
        }
        let built = builder.build()?;

        let mut seen = HashSet::new();
        let recipients = message
            .to
            .iter()
            .chain(&bcc)
            .filter(|m| seen.insert(m.address.to_lowercase()))
            .map(|m| envelope_address(&m.address))
            .collect::<Result<Vec<_>>>()?;

        Ok(Envelope {
            from: envelope_address(&self.config.from.address)?,
            recipients,
            message_id: built.message_id().unwrap_or_default().to_string(),
            body: built.to_bytes(),
        })
    }

    async fn deliver<T: Transport>(&self, transport: T, envelope: Envelope) -> Result<SendReport> {
        let config = &self.config;
        let Envelope {
            from,
            recipients,
            body,
            message_id,
        } = envelope;

        let result = async {
            let client = Client::greet(transport, config.timeout)
                .await?
                .ehlo(&config.ehlo_name)
                .await?
                .starttls(&config.host, &config.ehlo_name)
                .await?;

            let client = match config.credentials() {
                Some((username, password)) if client.server_info().supports_auth() => {
                    client.auth_login(username, password).await?
                }
                Some(_) => {
                    warn!("server does not advertise AUTH, sending without authentication");
                    client.skip_auth()
                }
                None => client.skip_auth(),
            };

            let total = recipients.len();
            let mut recipients = recipients.into_iter();
            let first = recipients
                .next()
                .ok_or_else(|| MailError::InvalidMessage("No recipients specified".into()))?;

            let mut client = client
                .mail_from(from, Some(body.len()))
                .await?
                .rcpt_to(first)
                .await?;
            for recipient in recipients {
                client = client.rcpt_to(recipient).await?;
            }
            debug!(recipients = total, bytes = body.len(), "sending message data");

            client
                .data()
                .await?
                .send_message(&body)
                .await?
                .quit()
                .await?;

            Ok::<_, MailError>(total)
        }
        .await;

        match result {
            Ok(recipients) => {
                info!(%message_id, recipients, "message sent");
                Ok(SendReport {
                    recipients,
                    message_id,
                })
            }
            Err(e) => {
                warn!(host = %config.host, error = %e, "send aborted");
                Err(e)
            }
        }
    }
}

/// Appends the default BCC mailbox and drops repeated entries, comparing
/// header-formatted strings.
fn with_default_bcc(bcc: Vec<Mailbox>, default: Option<&Mailbox>, charset: &str) -> Vec<Mailbox> {
    let mut seen = HashSet::new();
    bcc.into_iter()
        .chain(default.cloned())
        .filter(|m| seen.insert(m.format(charset)))
        .collect()
}

fn envelope_address(address: &str) -> Result<Address> {
    Address::new(address).map_err(|e| MailError::InvalidMessage(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn mailbox(s: &str) -> Mailbox {
        Mailbox::parse(s).unwrap()
    }

    fn mailer() -> Mailer {
        let mut config = MailerConfig::new("smtp.example.com", mailbox("Shop <orders@shop.example.com>"));
        config.default_bcc = Some(mailbox("Ops <ops@shop.example.com>"));
        Mailer::new(config)
    }

    #[test]
    fn default_bcc_is_added_once() {
        let ops = mailbox("Ops <ops@shop.example.com>");
        let list = with_default_bcc(vec![ops.clone()], Some(&ops), "UTF-8");
        assert_eq!(list, vec![ops.clone()]);

        // Same formatted string, different spelling
        let quoted = mailbox("\"Ops\"   <ops@shop.example.com>");
        let list = with_default_bcc(vec![quoted], Some(&ops), "UTF-8");
        assert_eq!(list.len(), 1);

        let list = with_default_bcc(Vec::new(), Some(&ops), "UTF-8");
        assert_eq!(list, vec![ops]);

        assert!(with_default_bcc(Vec::new(), None, "UTF-8").is_empty());
    }

    #[test]
    fn envelope_deduplicates_addresses() {
        let message = OutboundMessage::new(mailbox("reader@example.org"), "s")
            .to(mailbox("READER@example.org"))
            .bcc(mailbox("ops@shop.example.com"))
            .text("t");
        let envelope = mailer().prepare(message).unwrap();

        let recipients: Vec<&str> = envelope.recipients.iter().map(Address::as_str).collect();
        assert_eq!(recipients, vec!["reader@example.org", "ops@shop.example.com"]);
        assert_eq!(envelope.from.as_str(), "orders@shop.example.com");
        assert!(envelope.message_id.ends_with("@shop.example.com>"));
    }

    #[test]
    fn empty_recipient_list_is_rejected() {
        let message = OutboundMessage::default();
        assert!(matches!(
            mailer().prepare(message),
            Err(MailError::InvalidMessage(_))
        ));
    }
}
