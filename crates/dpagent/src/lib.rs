//! Dataplane agent - reconciles desired state onto a packet-processing device
//!
//! The agent keeps interfaces, BFD sessions, keys and the echo function, and
//! STN rules on a dataplane device in line with a desired state. Objects
//! whose dependencies are missing wait in a pending cache and are realized
//! as soon as the dependency appears; a resync rebuilds the agent's view
//! from a device dump and converges the device to the desired state.
//!
//! # Architecture
//!
//! ```text
//! [Request / DesiredState] ──> [Agent] ──> [kind orch] ──> [DeviceHandler] ──> [device]
//!                                 ↑             │
//!                                 └── registry changes (pump)
//! ```
//!
//! # Key Components
//!
//! - [`daemon::Agent`]: per-kind orchs, change routing, resync, introspection
//! - [`intfs`], [`bfd`], [`stn`]: the per-kind predicates
//! - [`resource`]: resource kinds and northbound payloads
//! - [`sim::SimDevice`]: in-memory device used by the binary and the tests
//!
//! # Feature Flags
//!
//! - `full` (default): every resource kind
//! - `mod-bfd`: BFD sessions, authentication keys and the echo function
//! - `mod-stn`: STN rules
//!
//! Interfaces are always built.

// ============================================================================
// Agent
// ============================================================================

pub mod audit;
pub mod config;
pub mod daemon;
pub mod error;
pub mod resource;
pub mod sim;

// ============================================================================
// Resource Kinds
// ============================================================================

pub mod bfd;
pub mod intfs;
pub mod stn;

pub use config::{AgentConfig, ResyncStrategy};
pub use daemon::{Agent, AgentResyncReport, ApplyReport, DeviceHandlers, ObjectOutcome};
pub use error::{AgentError, ConfigFileError};
pub use resource::{DesiredState, Operation, Request, ResourceConfig, ResourceKind};
pub use sim::SimDevice;
