//! Mail delivery and inspection
//!
//! The notifier hands rendered messages to a [`MailTransport`]; scenarios read
//! them back through a [`Mailbox`]. Mailboxes are addressed by handle, the
//! local part of the recipient address (`user7@ipa.test` → `user7`), which is
//! also the file name under a mail spool such as `/var/mail`.

pub mod message;

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::errors::{EpnError, Result, TransportError};

pub use message::{ExpectedMail, MailMessage, MessageBuilder};

/// Read side of delivered mail
pub trait Mailbox {
    /// Raw bytes of the mailbox, `None` when nothing was delivered
    fn read(&self, handle: &str) -> Result<Option<Vec<u8>>>;

    /// Drop everything delivered to `handle`
    fn clear(&self, handle: &str) -> Result<()>;

    fn read_message(&self, handle: &str) -> Result<Option<MailMessage>> {
        match self.read(handle)? {
            Some(raw) => MailMessage::parse(&raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Write side used by the notifier
pub trait MailTransport: Send + Sync {
    fn deliver(&self, recipient: &str, raw: &[u8]) -> std::result::Result<(), TransportError>;
}

/// Local part of an address
pub fn mailbox_handle(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

fn valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle != "."
        && handle != ".."
        && !handle.contains('/')
        && !handle.contains('\\')
        && !handle.contains('\0')
}

/// One file per handle under a spool directory
///
/// Each delivery replaces the file, so a mailbox always holds the most
/// recent message.
#[derive(Debug, Clone)]
pub struct SpoolMailbox {
    dir: PathBuf,
}

impl SpoolMailbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, handle: &str) -> Result<PathBuf> {
        if !valid_handle(handle) {
            return Err(EpnError::Mail(format!("invalid mailbox handle: {:?}", handle)));
        }
        Ok(self.dir.join(handle))
    }
}

impl Mailbox for SpoolMailbox {
    fn read(&self, handle: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(handle)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EpnError::Mail(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn clear(&self, handle: &str) -> Result<()> {
        let path = self.path_for(handle)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EpnError::Mail(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

impl MailTransport for SpoolMailbox {
    fn deliver(&self, recipient: &str, raw: &[u8]) -> std::result::Result<(), TransportError> {
        let handle = mailbox_handle(recipient);
        let path = self.path_for(handle).map_err(|e| TransportError::Rejected {
            recipient: recipient.to_string(),
            reason: e.to_string(),
        })?;
        fs::write(&path, raw).map_err(|e| TransportError::Rejected {
            recipient: recipient.to_string(),
            reason: e.to_string(),
        })?;
        debug!(recipient, path = %path.display(), "delivered to spool");
        Ok(())
    }
}

/// In-memory outbox, shareable between a transport and a reader
#[derive(Debug, Clone, Default)]
pub struct MemoryMailbox {
    inner: Arc<Mutex<HashMap<String, Vec<Vec<u8>>>>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message delivered to `handle`, oldest first
    pub fn messages(&self, handle: &str) -> Result<Vec<Vec<u8>>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| EpnError::Mail("mailbox lock poisoned".to_string()))?;
        Ok(inner.get(handle).cloned().unwrap_or_default())
    }

    /// Handles that received at least one message, sorted
    pub fn handles(&self) -> Result<Vec<String>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| EpnError::Mail("mailbox lock poisoned".to_string()))?;
        let mut handles: Vec<String> = inner
            .iter()
            .filter(|(_, messages)| !messages.is_empty())
            .map(|(handle, _)| handle.clone())
            .collect();
        handles.sort();
        Ok(handles)
    }
}

impl Mailbox for MemoryMailbox {
    fn read(&self, handle: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.messages(handle)?.pop())
    }

    fn clear(&self, handle: &str) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EpnError::Mail("mailbox lock poisoned".to_string()))?;
        inner.remove(handle);
        Ok(())
    }
}

impl MailTransport for MemoryMailbox {
    fn deliver(&self, recipient: &str, raw: &[u8]) -> std::result::Result<(), TransportError> {
        let mut inner = self.inner.lock().map_err(|_| TransportError::Rejected {
            recipient: recipient.to_string(),
            reason: "mailbox lock poisoned".to_string(),
        })?;
        inner
            .entry(mailbox_handle(recipient).to_string())
            .or_default()
            .push(raw.to_vec());
        Ok(())
    }
}

/// Transport whose server never answers
#[derive(Debug, Clone)]
pub struct UnreachableTransport {
    pub server: String,
    pub port: u16,
}

impl MailTransport for UnreachableTransport {
    fn deliver(&self, _recipient: &str, _raw: &[u8]) -> std::result::Result<(), TransportError> {
        Err(TransportError::Unreachable {
            server: self.server.clone(),
            port: self.port,
        })
    }
}
