//! Identity store driven by the `ipa` command line

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use tracing::{debug, warn};

use super::IdentityStore;
use crate::clock::format_wire_timestamp;
use crate::errors::{EpnError, Result};
use crate::identity::IdentityRecord;

/// Runs `ipa user-add` / `ipa user-del`
#[derive(Debug, Clone)]
pub struct CommandStore {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandStore {
    /// `program` is invoked as `program [args...] user-add ...`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments of the `user-add` call for `record`
    ///
    /// `--first` and `--last` are mandatory and fall back to the login.
    pub fn user_add_args(record: &IdentityRecord) -> Result<Vec<String>> {
        let mut args = vec![
            "user-add".to_string(),
            record.login.clone(),
            "--first".to_string(),
            record.first_name.clone().unwrap_or_else(|| record.login.clone()),
            "--last".to_string(),
            record.last_name.clone().unwrap_or_else(|| record.login.clone()),
        ];
        for address in &record.mail {
            args.push("--email".to_string());
            args.push(address.clone());
        }
        if let Some(expiration) = record.expiration {
            args.push("--password-expiration".to_string());
            args.push(format_wire_timestamp(expiration)?);
        }
        if record.password.is_some() {
            args.push("--password".to_string());
        }
        Ok(args)
    }

    fn run(&self, args: &[String], stdin: Option<String>) -> Result<Output> {
        debug!(program = %self.program.display(), ?args, "running store command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EpnError::Store(format!("Failed to run {}: {}", self.program.display(), e))
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            if let Err(e) = pipe.write_all(input.as_bytes()) {
                drop(pipe);
                // the child may still be waiting on its input
                if let Err(kill) = child.kill() {
                    warn!(
                        program = %self.program.display(),
                        error = %kill,
                        "could not kill store command"
                    );
                }
                if let Err(wait) = child.wait() {
                    warn!(
                        program = %self.program.display(),
                        error = %wait,
                        "could not reap store command"
                    );
                }
                return Err(EpnError::Store(format!("Failed to write password: {}", e)));
            }
        }

        let output = child.wait_with_output().map_err(|e| {
            EpnError::Store(format!("Failed to wait for {}: {}", self.program.display(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let command = args.first().map(String::as_str).unwrap_or("");
            return Err(EpnError::Store(format!("{} failed: {}", command, stderr.trim())));
        }
        Ok(output)
    }
}

impl IdentityStore for CommandStore {
    fn add(&self, record: &IdentityRecord) -> Result<()> {
        let args = Self::user_add_args(record)?;
        // the password is asked twice on stdin
        let stdin = record
            .password
            .as_ref()
            .map(|password| format!("{0}\n{0}\n", password));
        self.run(&args, stdin)?;
        Ok(())
    }

    fn remove(&self, login: &str) -> Result<()> {
        self.run(&["user-del".to_string(), login.to_string()], None)?;
        Ok(())
    }
}
