//! Notifier configuration (`epn.conf`)
//!
//! Format:
//! ```text
//! [global]
//! smtp_server = localhost
//! smtp_port = 25
//! smtp_user = admin
//! smtp_password = Secret123
//! smtp_security = starttls
//! smtp_admin = root@localhost
//! smtp_delay = 0
//! notify_ttls = 28, 14, 7, 3, 1
//! ```
//!
//! Only the `[global]` section is read. Unknown keys are ignored with a
//! warning so newer configuration files still load.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{ConfigError, EpnError, Result};
use crate::window::DEFAULT_NOTIFY_TTLS;

static SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\s*([^\]]+?)\s*\]$").expect("section pattern"));

static ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_.-]+)\s*[=:]\s*(.*)$").expect("entry pattern"));

pub const DEFAULT_SUBJECT: &str = "Your password will expire soon.";

pub const DEFAULT_FROM_NAME: &str = "IPA-EPN";

/// Default body of the expiration message
pub const DEFAULT_TEMPLATE: &str = "Hi {{ first }} {{ last }},\n\
\n\
Your password will expire on {{ expiration }}.\n\
\n\
Please change it as soon as possible.\n\
\n\
Your friendly neighborhood admins.\n";

/// `smtp_security`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    #[default]
    None,
    StartTls,
    Ssl,
}

impl FromStr for SmtpSecurity {
    type Err = ConfigError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(SmtpSecurity::None),
            "starttls" => Ok(SmtpSecurity::StartTls),
            "ssl" => Ok(SmtpSecurity::Ssl),
            _ => Err(ConfigError::InvalidSetting {
                key: "smtp_security".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Parsed `[global]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpnConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_timeout: u64,
    pub smtp_security: SmtpSecurity,
    pub smtp_admin: String,
    /// Milliseconds to wait between two messages
    pub smtp_delay: f64,
    pub mail_from: String,
    pub notify_ttls: Vec<i64>,
    pub msg_subject: String,
    pub msg_charset: String,
    pub template: String,
}

impl EpnConfig {
    /// Defaults for a deployment serving `domain`
    pub fn for_domain(domain: &str) -> Self {
        Self {
            smtp_server: "localhost".to_string(),
            smtp_port: 25,
            smtp_user: None,
            smtp_password: None,
            smtp_timeout: 60,
            smtp_security: SmtpSecurity::None,
            smtp_admin: "root@localhost".to_string(),
            smtp_delay: 0.0,
            mail_from: format!("noreply@{}", domain),
            notify_ttls: DEFAULT_NOTIFY_TTLS.to_vec(),
            msg_subject: DEFAULT_SUBJECT.to_string(),
            msg_charset: "utf8".to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Parse `epn.conf` text on top of the defaults for `domain`
    pub fn parse(text: &str, domain: &str) -> std::result::Result<Self, ConfigError> {
        let mut config = Self::for_domain(domain);
        let mut section: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(caps) = SECTION.captures(line) {
                section = Some(caps[1].to_string());
                continue;
            }
            let caps = ENTRY.captures(line).ok_or_else(|| ConfigError::MalformedLine {
                line: index + 1,
                content: raw.to_string(),
            })?;
            if section.as_deref() != Some("global") {
                continue;
            }
            config.apply(&caps[1].to_ascii_lowercase(), caps[2].trim())?;
        }

        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn load<P: AsRef<Path>>(path: P, domain: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EpnError::FileNotFound(path.to_string_lossy().to_string()));
        }
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text, domain)?)
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// `From` header value, e.g. `IPA-EPN <noreply@ipa.test>`
    pub fn from_header(&self) -> String {
        format!("{} <{}>", DEFAULT_FROM_NAME, self.mail_from)
    }

    fn apply(&mut self, key: &str, value: &str) -> std::result::Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "smtp_server" => self.smtp_server = value.to_string(),
            "smtp_port" => self.smtp_port = value.parse().map_err(|_| invalid())?,
            "smtp_user" => self.smtp_user = non_empty(value),
            "smtp_password" => self.smtp_password = non_empty(value),
            "smtp_timeout" => self.smtp_timeout = value.parse().map_err(|_| invalid())?,
            "smtp_security" => self.smtp_security = value.parse()?,
            "smtp_admin" => self.smtp_admin = value.to_string(),
            "smtp_delay" => {
                let delay: f64 = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidDelay(value.to_string()))?;
                if !delay.is_finite() {
                    return Err(ConfigError::InvalidDelay(value.to_string()));
                }
                if delay < 0.0 {
                    return Err(ConfigError::NegativeDelay);
                }
                self.smtp_delay = delay;
            }
            "mail_from" => self.mail_from = value.to_string(),
            "notify_ttls" => {
                self.notify_ttls = value
                    .split(',')
                    .map(|day| day.trim().parse::<i64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| invalid())?;
            }
            "msg_subject" => self.msg_subject = value.to_string(),
            "msg_charset" => self.msg_charset = value.to_string(),
            _ => warn!(key, "ignoring unknown epn.conf setting"),
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
