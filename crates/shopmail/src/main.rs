//! `shopmail`: send one transactional email.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod args;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use shopmail_core::{Mailer, MailerConfig, SendReport};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the Message-ID
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopmail=info,shopmail_core=info,shopmail_smtp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(report) => {
            println!("{}", report.message_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("shopmail: the message could not be sent");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<SendReport> {
    let config = MailerConfig::from_env().context("loading mail configuration")?;
    info!(host = %config.host, port = config.port, "using submission server");

    let message = args.into_message().await?;
    let report = Mailer::new(config)
        .send_email(message)
        .await
        .context("sending message")?;
    Ok(report)
}
