//! Low-level SMTP stream handling.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use crate::error::{Error, Result};

/// A byte stream an SMTP session runs over.
///
/// The session reads and writes through it and calls [`Transport::upgrade_to_tls`]
/// once, right after the server accepts STARTTLS. The upgrade consumes the
/// plaintext stream, so nothing can touch the raw socket afterwards.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sized {
    /// Wraps the stream in TLS, verifying the server as `hostname`.
    fn upgrade_to_tls(self, hostname: &str) -> impl Future<Output = Result<Self>> + Send;

    /// Returns true once the stream is encrypted.
    fn is_tls(&self) -> bool;
}

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Plain(TcpStream),
    /// TLS-encrypted connection (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport for SmtpStream {
    async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let tcp = match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(_) => return Err(Error::AlreadyTls),
        };

        let connector = create_tls_connector();
        let server_name = ServerName::try_from(hostname.to_string())?;
        let tls = connector.connect(server_name, tcp).await?;
        debug!(hostname, "TLS handshake complete");
        Ok(Self::Tls(Box::new(tls)))
    }

    fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Connects to an SMTP server over plain TCP, ready for STARTTLS.
///
/// # Errors
///
/// Returns an error if the connection fails or exceeds `timeout`.
pub async fn connect(hostname: &str, port: u16, timeout: Option<Duration>) -> Result<SmtpStream> {
    let addr = format!("{hostname}:{port}");
    let stream = with_timeout(timeout, async { Ok(TcpStream::connect(&addr).await?) }).await?;
    debug!(%addr, "connected");
    Ok(SmtpStream::Plain(stream))
}

/// Runs `fut`, failing with [`Error::Timeout`] once `limit` elapses.
pub(crate) async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_refused_is_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect("127.0.0.1", port, None).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn upgrade_rejects_invalid_server_name() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let stream = connect("127.0.0.1", port, None).await.unwrap();
        assert!(!stream.is_tls());

        let err = stream.upgrade_to_tls("not a hostname!").await.unwrap_err();
        assert!(matches!(err, Error::InvalidDnsName(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_expires() {
        let limit = Duration::from_secs(5);
        let result: Result<()> = with_timeout(Some(limit), std::future::pending()).await;
        assert!(matches!(result, Err(Error::Timeout(d)) if d == limit));
    }
}
