//! Mailer configuration.
//!
//! Built once at startup from `MAIL_*` environment variables, with defaults
//! applied here rather than at the use site.

use std::env;
use std::fmt;
use std::time::Duration;

use shopmail_mime::encoding::is_supported_charset;
use shopmail_mime::{BccHeader, DEFAULT_CHARSET, Mailbox};
use tracing::{info, warn};

/// Submission port used when `MAIL_PORT` is unset.
pub const DEFAULT_PORT: u16 = 587;

/// EHLO name used when `MAIL_EHLO_NAME` is unset.
pub const DEFAULT_EHLO_NAME: &str = "localhost";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{0} is not set")]
    Missing(&'static str),

    /// A variable could not be parsed.
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Everything needed to submit mail.
#[derive(Clone)]
pub struct MailerConfig {
    /// Submission server host name, also used for certificate verification.
    pub host: String,
    /// Submission server port.
    pub port: u16,
    /// AUTH LOGIN user name.
    pub username: Option<String>,
    /// AUTH LOGIN password.
    pub password: Option<String>,
    /// Charset for bodies and encoded words.
    pub charset: String,
    /// Sender mailbox, used for the `From` header and `MAIL FROM`.
    pub from: Mailbox,
    /// Operational mailbox blind-copied on every message.
    pub default_bcc: Option<Mailbox>,
    /// Name sent with EHLO.
    pub ehlo_name: String,
    /// Whether BCC recipients are listed in a `Bcc` header.
    pub bcc_header: BccHeader,
    /// Bound on connecting and on each reply wait; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl MailerConfig {
    /// Creates a configuration with defaults for everything but host and sender.
    #[must_use]
    pub fn new(host: impl Into<String>, from: Mailbox) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            charset: DEFAULT_CHARSET.to_string(),
            from,
            default_bcc: None,
            ehlo_name: DEFAULT_EHLO_NAME.to_string(),
            bcc_header: BccHeader::default(),
            timeout: None,
        }
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `MAIL_HOST` or `MAIL_FROM_ADDRESS` is missing, or
    /// a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// Empty values count as unset. Values are trimmed, except the
    /// credentials, which are used exactly as given.
    ///
    /// # Errors
    ///
    /// Same as [`MailerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = var("MAIL_HOST").ok_or(ConfigError::Missing("MAIL_HOST"))?;
        let from_address =
            var("MAIL_FROM_ADDRESS").ok_or(ConfigError::Missing("MAIL_FROM_ADDRESS"))?;
        let from = mailbox("MAIL_FROM_ADDRESS", from_address, var("MAIL_FROM_NAME"))?;

        let mut config = Self::new(host, from);

        if let Some(port) = var("MAIL_PORT") {
            config.port = parse("MAIL_PORT", port)?;
        } else {
            info!("MAIL_PORT not set, using default: {DEFAULT_PORT}");
        }

        config.username = raw("MAIL_USERNAME");
        config.password = raw("MAIL_PASSWORD");
        if config.username.is_some() != config.password.is_some() {
            warn!("Only one of MAIL_USERNAME and MAIL_PASSWORD is set, authentication disabled");
        }

        if let Some(charset) = var("MAIL_CHARSET") {
            if !is_supported_charset(&charset) {
                return Err(ConfigError::Invalid {
                    key: "MAIL_CHARSET",
                    value: charset,
                    reason: "expected UTF-8 or US-ASCII".into(),
                });
            }
            config.charset = charset;
        }

        match (var("MAIL_BCC_ADDRESS"), var("MAIL_BCC_NAME")) {
            (Some(address), name) => {
                config.default_bcc = Some(mailbox("MAIL_BCC_ADDRESS", address, name)?);
            }
            (None, Some(_)) => warn!("MAIL_BCC_NAME is set without MAIL_BCC_ADDRESS, ignoring"),
            (None, None) => {}
        }

        if let Some(name) = var("MAIL_EHLO_NAME") {
            config.ehlo_name = name;
        }

        if let Some(value) = var("MAIL_BCC_HEADER") {
            config.bcc_header = BccHeader::parse(&value).ok_or_else(|| ConfigError::Invalid {
                key: "MAIL_BCC_HEADER",
                value: value.clone(),
                reason: "expected visible or hidden".into(),
            })?;
        }

        if let Some(value) = var("MAIL_TIMEOUT_SECS") {
            let secs: u64 = parse("MAIL_TIMEOUT_SECS", value)?;
            config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Returns the credentials when both halves are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username.as_deref().zip(self.password.as_deref())
    }
}

impl fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("charset", &self.charset)
            .field("from", &self.from)
            .field("default_bcc", &self.default_bcc)
            .field("ehlo_name", &self.ehlo_name)
            .field("bcc_header", &self.bcc_header)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

fn mailbox(
    key: &'static str,
    address: String,
    name: Option<String>,
) -> Result<Mailbox, ConfigError> {
    Mailbox::new(address.clone(), name).map_err(|e| ConfigError::Invalid {
        key,
        value: address,
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<MailerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        MailerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("MAIL_HOST", "smtp.example.com"),
        ("MAIL_FROM_ADDRESS", "orders@shop.example.com"),
    ];

    #[test]
    fn defaults_are_applied() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.charset, "UTF-8");
        assert_eq!(config.ehlo_name, "localhost");
        assert_eq!(config.bcc_header, BccHeader::Visible);
        assert_eq!(config.timeout, None);
        assert_eq!(config.default_bcc, None);
        assert_eq!(config.credentials(), None);
        assert_eq!(config.from.name, None);
    }

    #[test]
    fn every_variable_is_read() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("MAIL_PORT", "2525"),
            ("MAIL_USERNAME", "shop"),
            ("MAIL_PASSWORD", "hunter2"),
            ("MAIL_CHARSET", "us-ascii"),
            ("MAIL_FROM_NAME", "ספרים"),
            ("MAIL_BCC_ADDRESS", "audit@shop.example.com"),
            ("MAIL_BCC_NAME", "Audit"),
            ("MAIL_EHLO_NAME", "shop.example.com"),
            ("MAIL_BCC_HEADER", "Hidden"),
            ("MAIL_TIMEOUT_SECS", "30"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.port, 2525);
        assert_eq!(config.credentials(), Some(("shop", "hunter2")));
        assert_eq!(config.charset, "us-ascii");
        assert_eq!(config.from.name.as_deref(), Some("ספרים"));
        let bcc = config.default_bcc.as_ref().unwrap();
        assert_eq!(bcc.address, "audit@shop.example.com");
        assert_eq!(bcc.name.as_deref(), Some("Audit"));
        assert_eq!(config.ehlo_name, "shop.example.com");
        assert_eq!(config.bcc_header, BccHeader::Hidden);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_required_values() {
        assert!(matches!(
            load(&[("MAIL_FROM_ADDRESS", "a@example.org")]),
            Err(ConfigError::Missing("MAIL_HOST"))
        ));
        assert!(matches!(
            load(&[("MAIL_HOST", "smtp.example.com"), ("MAIL_FROM_ADDRESS", "  ")]),
            Err(ConfigError::Missing("MAIL_FROM_ADDRESS"))
        ));
    }

    #[test]
    fn invalid_values() {
        let with = |key, value| {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            load(&vars)
        };
        assert!(matches!(
            with("MAIL_PORT", "smtp"),
            Err(ConfigError::Invalid { key: "MAIL_PORT", .. })
        ));
        assert!(matches!(
            with("MAIL_PORT", "70000"),
            Err(ConfigError::Invalid { key: "MAIL_PORT", .. })
        ));
        assert!(matches!(
            with("MAIL_TIMEOUT_SECS", "-1"),
            Err(ConfigError::Invalid { key: "MAIL_TIMEOUT_SECS", .. })
        ));
        assert!(matches!(
            with("MAIL_BCC_HEADER", "sometimes"),
            Err(ConfigError::Invalid { key: "MAIL_BCC_HEADER", .. })
        ));
        assert!(matches!(
            with("MAIL_BCC_ADDRESS", "not-an-address"),
            Err(ConfigError::Invalid { key: "MAIL_BCC_ADDRESS", .. })
        ));
        assert!(matches!(
            with("MAIL_CHARSET", "ISO-8859-8"),
            Err(ConfigError::Invalid { key: "MAIL_CHARSET", .. })
        ));
    }

    #[test]
    fn credentials_are_not_trimmed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("MAIL_USERNAME", " shop"), ("MAIL_PASSWORD", "pass phrase ")]);
        let config = load(&vars).unwrap();
        assert_eq!(config.credentials(), Some((" shop", "pass phrase ")));
    }

    #[test]
    fn partial_credentials_disable_auth() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("MAIL_USERNAME", "shop"));
        assert_eq!(load(&vars).unwrap().credentials(), None);
    }

    #[test]
    fn zero_timeout_means_none() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("MAIL_TIMEOUT_SECS", "0"));
        assert_eq!(load(&vars).unwrap().timeout, None);
    }

    #[test]
    fn debug_redacts_password() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("MAIL_USERNAME", "shop"), ("MAIL_PASSWORD", "hunter2")]);
        let debug = format!("{:?}", load(&vars).unwrap());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
