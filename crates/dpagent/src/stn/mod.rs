//! STN (steal-the-NIC) rules.
//!
//! A rule depends on its interface: it waits in the pending cache until the
//! interface exists and is taken down with it. Resync matches rules on
//! address + interface.

#[cfg(feature = "mod-stn")]
mod orch;
mod types;

#[cfg(feature = "mod-stn")]
pub use orch::StnRuleSpec;
pub use types::{StnRuleConfig, StnRuleMeta};
