//! Type-state SMTP client.

use std::marker::PhantomData;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::stream::with_timeout;
use super::{ServerInfo, Transport};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::ReplyBuffer;
use crate::types::{Address, AuthMechanism, Reply, ReplyCode};

const READ_CHUNK: usize = 4096;

/// Type-state marker: greeting received, EHLO/STARTTLS/AUTH allowed.
#[derive(Debug)]
pub struct Greeted;

/// Type-state marker: handshake done, a mail transaction may start.
#[derive(Debug)]
pub struct Ready;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
///
/// Every step consumes the client. When a step fails the client is dropped
/// with it, which closes the socket without a QUIT.
#[derive(Debug)]
pub struct Client<T, State> {
    stream: T,
    buffer: ReplyBuffer,
    server_info: ServerInfo,
    timeout: Option<Duration>,
    _state: PhantomData<State>,
}

impl<T: Transport> Client<T, Greeted> {
    /// Reads the server greeting from a freshly connected stream.
    ///
    /// `timeout` bounds every later reply wait as well; `None` waits forever.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or the code is not 220.
    pub async fn greet(stream: T, timeout: Option<Duration>) -> Result<Self> {
        let mut client = Self {
            stream,
            buffer: ReplyBuffer::new(),
            server_info: ServerInfo::default(),
            timeout,
            _state: PhantomData,
        };

        let greeting = client.read_reply().await?;
        let greeting = expect("<greeting>", greeting, &[ReplyCode::SERVICE_READY])?;

        // First word of the greeting text is the server's name
        client.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %client.server_info.hostname, "greeted");

        Ok(client)
    }

    /// Sends EHLO and records the advertised capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let cmd = Command::Ehlo {
            hostname: client_hostname.to_string(),
        };
        let reply = self.command(&cmd, &[ReplyCode::OK]).await?;
        self.server_info.set_capabilities(&reply.message);
        Ok(self)
    }

    /// Upgrades the connection with STARTTLS, then repeats EHLO over TLS.
    ///
    /// `server_name` is verified against the certificate. Capabilities from
    /// the plaintext EHLO are discarded and replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted, the server does
    /// not answer 220, the handshake fails, or the second EHLO is rejected.
    pub async fn starttls(mut self, server_name: &str, client_hostname: &str) -> Result<Self> {
        if self.stream.is_tls() {
            return Err(Error::AlreadyTls);
        }

        self.command(&Command::StartTls, &[ReplyCode::SERVICE_READY])
            .await?;

        // Plaintext arriving now would be read as if it came over TLS
        if self.buffer.pending() > 0 {
            return Err(Error::Protocol(
                "Unexpected data after STARTTLS reply".into(),
            ));
        }

        let Self {
            stream,
            buffer,
            mut server_info,
            timeout,
            _state,
        } = self;
        let stream = with_timeout(timeout, stream.upgrade_to_tls(server_name)).await?;
        info!(server = %server_info.hostname, "connection upgraded to TLS");
        server_info.extensions.clear();

        Self {
            stream,
            buffer,
            server_info,
            timeout,
            _state,
        }
        .ehlo(client_hostname)
        .await
    }

    /// Authenticates with AUTH LOGIN.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three exchanges is rejected.
    pub async fn auth_login(mut self, username: &str, password: &str) -> Result<Client<T, Ready>> {
        let start = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        self.command(&start, &[ReplyCode::AUTH_CONTINUE]).await?;

        let user = Command::AuthResponse(STANDARD.encode(username.as_bytes()));
        self.command(&user, &[ReplyCode::AUTH_CONTINUE]).await?;

        let pass = Command::AuthResponse(STANDARD.encode(password.as_bytes()));
        self.command(&pass, &[ReplyCode::AUTH_SUCCEEDED]).await?;

        info!(username, "authenticated");
        Ok(self.transition())
    }

    /// Proceeds without authenticating.
    #[must_use]
    pub fn skip_auth(self) -> Client<T, Ready> {
        self.transition()
    }
}

impl<T: Transport> Client<T, Ready> {
    /// Starts a mail transaction.
    ///
    /// Adds `BODY=8BITMIME` when the server advertises it, and `SIZE=` when
    /// the server advertises SIZE and `size` is known.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn mail_from(
        mut self,
        from: Address,
        size: Option<usize>,
    ) -> Result<Client<T, MailTransaction>> {
        let body = self
            .server_info
            .supports_8bitmime()
            .then(|| "8BITMIME".to_string());
        let size = size.filter(|_| self.server_info.max_message_size().is_some());

        let cmd = Command::MailFrom { from, body, size };
        self.command(&cmd, &[ReplyCode::OK]).await?;
        Ok(self.transition())
    }
}

impl<T: Transport> Client<T, MailTransaction> {
    /// Adds the first recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server answers anything but 250 or 251.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Client<T, RecipientAdded>> {
        self.recipient(to).await?;
        Ok(self.transition())
    }
}

impl<T: Transport> Client<T, RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server answers anything but 250 or 251.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Self> {
        self.recipient(to).await?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 354.
    pub async fn data(mut self) -> Result<Client<T, Data>> {
        self.command(&Command::Data, &[ReplyCode::START_DATA])
            .await?;
        Ok(self.transition())
    }
}

impl<T: Transport> Client<T, Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to CRLF, lines starting with `.` are
    /// dot-stuffed and the terminating `.` line is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or the server does not answer 250.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<T, Ready>> {
        let data = encode_data(message);
        self.write(&data).await?;

        let reply = self.read_reply().await?;
        expect("<message data>", reply, &[ReplyCode::OK])?;
        Ok(self.transition())
    }
}

// Common implementation for all states
impl<T: Transport, S> Client<T, S> {
    /// Returns the server information.
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true once STARTTLS has completed.
    pub fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 221.
    pub async fn quit(mut self) -> Result<()> {
        self.command(&Command::Quit, &[ReplyCode::CLOSING]).await?;
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "shutdown after QUIT failed");
        }
        Ok(())
    }

    async fn recipient(&mut self, to: Address) -> Result<()> {
        let cmd = Command::RcptTo { to };
        self.command(&cmd, &[ReplyCode::OK, ReplyCode::FORWARD])
            .await?;
        Ok(())
    }

    async fn command(&mut self, cmd: &Command, accepted: &[ReplyCode]) -> Result<Reply> {
        let described = cmd.describe();
        debug!(command = %described, "sending");
        self.write(&cmd.serialize()).await?;
        let reply = self.read_reply().await?;
        expect(&described, reply, accepted)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = &mut self.stream;
        with_timeout(self.timeout, async {
            stream.write_all(data).await?;
            stream.flush().await?;
            Ok(())
        })
        .await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let Self {
            stream,
            buffer,
            timeout,
            ..
        } = self;
        with_timeout(*timeout, async {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                if let Some(reply) = buffer.next_reply()? {
                    return Ok(reply);
                }
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::ConnectionClosed);
                }
                buffer.extend(&chunk[..n]);
            }
        })
        .await
    }

    fn transition<N>(self) -> Client<T, N> {
        Client {
            stream: self.stream,
            buffer: self.buffer,
            server_info: self.server_info,
            timeout: self.timeout,
            _state: PhantomData,
        }
    }
}

fn expect(command: &str, reply: Reply, accepted: &[ReplyCode]) -> Result<Reply> {
    if reply.is_one_of(accepted) {
        return Ok(reply);
    }
    warn!(command, code = reply.code.as_u16(), reply = %reply.message_text(), "unexpected reply");
    Err(Error::unexpected_reply(
        command,
        reply.code.as_u16(),
        reply.message,
    ))
}

/// Prepares a message for the DATA phase.
fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 32 + 8);
    let body = message
        .strip_suffix(b"\n")
        .map_or(message, |m| m.strip_suffix(b"\r").unwrap_or(m));

    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b".\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_normalizes_line_endings() {
        assert_eq!(encode_data(b"a\nb\r\nc"), b"a\r\nb\r\nc\r\n.\r\n");
    }

    #[test]
    fn data_keeps_single_trailing_crlf() {
        assert_eq!(encode_data(b"Subject: x\r\n\r\nbody\r\n"), b"Subject: x\r\n\r\nbody\r\n.\r\n");
    }

    #[test]
    fn data_dot_stuffs() {
        assert_eq!(encode_data(b"a\r\n.\r\n..b"), b"a\r\n..\r\n...b\r\n.\r\n");
    }

    #[test]
    fn data_empty_message() {
        assert_eq!(encode_data(b""), b"\r\n.\r\n");
    }
}
