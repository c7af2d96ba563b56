//! Agent coordination.
//!
//! The [`Agent`] owns one [`KindOrch`] per enabled resource kind and routes
//! registry changes between them:
//!
//! ```text
//! Request ──> [kind orch] ──> device
//!                  │
//!                  ↓ registry watch
//!              [pump] ──> resolve_created / resolve_deleted
//!                  │          on every kind depending on the change
//!                  └──────────── repeat until no change is queued
//! ```
//!
//! Resync runs kind by kind in priority order (interfaces first), then
//! pumps once so cross-kind dependencies settle.

mod agent;
mod orch;

pub use agent::{
    AgentResyncReport, AgentSnapshot, Agent, ApplyReport, DeviceHandlers, KindSnapshot,
};
pub use orch::{ChangeNotice, KindOrch, ObjectOutcome, PendingRecord, RegistryRecord, SpecOrch};
