//! Command line arguments.

use std::path::{Path, PathBuf};

use anyhow::Context;
use shopmail_core::OutboundMessage;
use shopmail_mime::Mailbox;

/// Send one message through the configured submission server.
///
/// Server settings come from `MAIL_*` environment variables.
#[derive(Debug, clap::Parser, PartialEq, Eq)]
#[command(about, version, author)]
pub struct Args {
    /// Recipient, as `addr` or `Name <addr>` (repeatable)
    #[arg(short, long, required = true)]
    pub to: Vec<Mailbox>,

    /// Blind-copy recipient (repeatable)
    #[arg(short, long)]
    pub bcc: Vec<Mailbox>,

    /// Subject line
    #[arg(short, long, default_value = "")]
    pub subject: String,

    /// Plain-text body
    #[arg(long, conflicts_with = "text_file")]
    pub text: Option<String>,

    /// Read the plain-text body from a file
    #[arg(long)]
    pub text_file: Option<PathBuf>,

    /// HTML body
    #[arg(long, conflicts_with = "html_file")]
    pub html: Option<String>,

    /// Read the HTML body from a file
    #[arg(long)]
    pub html_file: Option<PathBuf>,
}

impl Args {
    /// Turns the arguments into a message, reading body files.
    ///
    /// # Errors
    ///
    /// Returns an error if a body file cannot be read.
    pub async fn into_message(self) -> anyhow::Result<OutboundMessage> {
        Ok(OutboundMessage {
            to: self.to,
            bcc: self.bcc,
            subject: self.subject,
            text: body(self.text, self.text_file.as_deref()).await?,
            html: body(self.html, self.html_file.as_deref()).await?,
        })
    }
}

async fn body(inline: Option<String>, file: Option<&Path>) -> anyhow::Result<Option<String>> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map(Some)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(inline),
    }
}
