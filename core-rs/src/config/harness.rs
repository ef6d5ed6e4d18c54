/**
 * harness.rs
 * Parser for harness files (YAML format)
 *
 * Format:
 * ```yaml
 * apiVersion: epnck/v1
 * kind: Harness
 * metadata:
 *   name: epn-two-path
 * spec:
 *   domain: ipa.test
 *   accessPaths:
 *     - name: ldapi
 *       program: ipa-epn
 *     - name: gssapi
 *       program: ssh
 *       args: [client0.ipa.test, ipa-epn]
 *   store:
 *     program: ipa
 *   mailSpool: /var/mail
 *   timeoutSecs: 120
 *   epnConfig: /etc/ipa/epn.conf
 *   mailTestRecipient: user2
 *   scenarios: [emptyState, defaultSchedule]
 * ```
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::EpnConfig;
use crate::errors::{EpnError, Result};
use crate::mail::SpoolMailbox;
use crate::notifier::CommandAccessPath;
use crate::store::CommandStore;

pub const API_VERSION: &str = "epnck/v1";
pub const KIND: &str = "Harness";

/// Default harness file name, looked up in the working directory
pub const DEFAULT_FILE: &str = "epnck.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HarnessConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: HarnessSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub name: String,
}

/// One way of invoking the notifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessPathConfig {
    pub name: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_spool() -> PathBuf {
    PathBuf::from("/var/mail")
}

fn default_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HarnessSpec {
    pub domain: String,
    pub access_paths: Vec<AccessPathConfig>,
    pub store: StoreConfig,
    #[serde(default = "default_spool")]
    pub mail_spool: PathBuf,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Notifier configuration, read for its `notify_ttls`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epn_config: Option<PathBuf>,
    /// Mailbox handle that receives `--mail-test` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_test_recipient: Option<String>,
    /// Scenario names to run; all when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Vec<String>>,
}

impl HarnessConfig {
    /// Load and validate a harness file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(EpnError::FileNotFound(path.to_string_lossy().to_string()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: HarnessConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Ensures:
    /// - apiVersion is "epnck/v1" and kind is "Harness"
    /// - domain and metadata.name are non-empty
    /// - exactly two access paths with distinct, non-empty names
    pub fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            return Err(EpnError::ValidationError(format!(
                "Invalid apiVersion: expected '{}', got '{}'",
                API_VERSION, self.api_version
            )));
        }

        if self.kind != KIND {
            return Err(EpnError::ValidationError(format!(
                "Invalid kind: expected '{}', got '{}'",
                KIND, self.kind
            )));
        }

        if self.metadata.name.trim().is_empty() {
            return Err(EpnError::ValidationError(
                "metadata.name cannot be empty".to_string(),
            ));
        }

        if self.spec.domain.trim().is_empty() {
            return Err(EpnError::ValidationError(
                "spec.domain cannot be empty".to_string(),
            ));
        }

        let paths = &self.spec.access_paths;
        if paths.len() != 2 {
            return Err(EpnError::ValidationError(format!(
                "spec.accessPaths must list exactly two paths, got {}",
                paths.len()
            )));
        }
        if paths.iter().any(|p| p.name.trim().is_empty()) {
            return Err(EpnError::ValidationError(
                "access path name cannot be empty".to_string(),
            ));
        }
        if paths[0].name == paths[1].name {
            return Err(EpnError::ValidationError(format!(
                "access path names must differ, both are '{}'",
                paths[0].name
            )));
        }

        if self.spec.timeout_secs == 0 {
            return Err(EpnError::ValidationError(
                "spec.timeoutSecs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.spec.timeout_secs)
    }

    /// Both access paths, in file order
    pub fn access_paths(&self) -> Vec<CommandAccessPath> {
        self.spec
            .access_paths
            .iter()
            .map(|p| {
                p.env.iter().fold(
                    CommandAccessPath::new(&p.name, &p.program)
                        .with_args(p.args.iter().cloned())
                        .with_timeout(self.timeout()),
                    |path, (k, v)| path.with_env(k, v),
                )
            })
            .collect()
    }

    pub fn store(&self) -> CommandStore {
        CommandStore::new(&self.spec.store.program).with_args(self.spec.store.args.iter().cloned())
    }

    pub fn mailbox(&self) -> SpoolMailbox {
        SpoolMailbox::new(&self.spec.mail_spool)
    }

    /// Notifier configuration, defaults when no file is named
    pub fn epn_config(&self) -> Result<EpnConfig> {
        match &self.spec.epn_config {
            Some(path) => EpnConfig::load(path, &self.spec.domain),
            None => Ok(EpnConfig::for_domain(&self.spec.domain)),
        }
    }
}
