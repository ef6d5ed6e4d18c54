//! Configuration
//!
//! - [`EpnConfig`]: the notifier's own `epn.conf`
//! - [`HarnessConfig`]: which notifiers, store and mail spool a run uses

pub mod epn;
pub mod harness;

pub use epn::{EpnConfig, SmtpSecurity, DEFAULT_TEMPLATE};
pub use harness::{AccessPathConfig, HarnessConfig, StoreConfig};
