//! Structured result of one invocation
//!
//! Scoped invocations write into in-memory buffers handed to them rather than
//! into the process-wide stdout/stderr, and come back as a
//! [`ScenarioResult`].
//!
//! Streams are kept as raw bytes. They are decoded only to parse a payload
//! or to show them, so two runs that differ in invalid UTF-8 never compare
//! equal.

use std::borrow::Cow;
use std::io::Write;
use std::process::Output;

use serde::{Deserialize, Serialize};

/// stdout, stderr and exit code of one notifier run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    #[serde(with = "text_bytes")]
    pub stdout: Vec<u8>,
    #[serde(with = "text_bytes")]
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ScenarioResult {
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout decoded for parsing and display; invalid bytes become U+FFFD
    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Convert a finished child process
    ///
    /// A child killed by a signal has no exit code; it is reported as
    /// `128 + signal` on unix, like a shell would.
    pub fn from_output(output: &Output) -> Self {
        Self {
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            exit_code: exit_code_of(&output.status),
        }
    }
}

#[cfg(unix)]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Run `body` against fresh stdout/stderr buffers
///
/// `body` returns the exit code; whatever it wrote is returned alongside.
pub fn capture<F>(body: F) -> ScenarioResult
where
    F: FnOnce(&mut dyn Write, &mut dyn Write) -> i32,
{
    let mut stdout: Vec<u8> = Vec::new();
    let mut stderr: Vec<u8> = Vec::new();
    let exit_code = body(&mut stdout, &mut stderr);
    ScenarioResult {
        stdout,
        stderr,
        exit_code,
    }
}

/// Streams as JSON strings; captured results are written and read by hand
mod text_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}
