//! Process-invoking access path
//!
//! Runs a notifier program with the option flags appended to a fixed argument
//! prefix, e.g. `ipa-epn` locally or `ssh client ipa-epn` for the remote path.
//! The child runs on a current-thread tokio runtime so a hung notifier can be
//! timed out and killed.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use super::{AccessPath, NotifierOptions, EXIT_TIMEOUT};
use crate::capture::ScenarioResult;
use crate::errors::{EpnError, Result};

/// Default time a single invocation may take
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct CommandAccessPath {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl CommandAccessPath {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Arguments placed before the option flags
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Full argument list for one run
    pub fn command_args(&self, options: &NotifierOptions) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(options.to_args());
        args
    }

    async fn run(&self, options: &NotifierOptions) -> Result<ScenarioResult> {
        let args = self.command_args(options);
        debug!(path = %self.name, program = %self.program.display(), ?args, "invoking notifier");

        let child = Command::new(&self.program)
            .args(&args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EpnError::Invocation(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ScenarioResult::from_output(&output)),
            Ok(Err(e)) => Err(EpnError::Invocation(format!(
                "Failed to collect output of {}: {}",
                self.program.display(),
                e
            ))),
            Err(_) => {
                warn!(path = %self.name, timeout = ?self.timeout, "notifier timed out");
                Ok(ScenarioResult::new(
                    "",
                    format!(
                        "{} did not finish within {} seconds\n",
                        self.program.display(),
                        self.timeout.as_secs_f64()
                    ),
                    EXIT_TIMEOUT,
                ))
            }
        }
    }
}

impl AccessPath for CommandAccessPath {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, options: &NotifierOptions) -> Result<ScenarioResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EpnError::Invocation(format!("Failed to start runtime: {}", e)))?;
        runtime.block_on(self.run(options))
    }
}
