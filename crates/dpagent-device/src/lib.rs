//! Device handler boundary for the dataplane agent.
//!
//! The agent never talks to the packet-processing engine directly; every
//! resource kind goes through a [`DeviceHandler`] that executes one control
//! operation per call. This crate defines that boundary:
//!
//! - [`types`]: typed device handles, so an interface index cannot be passed
//!   where a BFD session handle is expected
//! - [`error`]: device status codes and [`DeviceError`], which separates
//!   rejected requests from an unreachable device
//! - [`context`]: [`OpContext`], the cancellation token and deadline every
//!   device call receives
//! - [`handler`]: the [`DeviceHandler`] trait and [`DumpedInstance`]
//! - [`sim`]: [`SimTable`], an in-memory device table with call counters and
//!   fault injection
//!
//! # Example
//!
//! ```
//! use dpagent_device::{DeviceHandler, InterfaceKind, OpContext, SimTable};
//!
//! let table: SimTable<InterfaceKind, String> = SimTable::new("interfaces");
//! let ctx = OpContext::new();
//! let handle = DeviceHandler::<InterfaceKind, String, ()>::add(
//!     &table, &ctx, "loop1", &"loopback".to_string(), &(),
//! )
//! .unwrap();
//! assert_eq!(handle.as_raw(), 1);
//! ```

pub mod context;
pub mod error;
pub mod handler;
pub mod sim;
pub mod types;

pub use context::OpContext;
pub use error::{DeviceError, DeviceResult, DeviceStatus};
pub use handler::{DeviceHandler, DumpedInstance};
pub use sim::{SimCounters, SimEntry, SimOp, SimTable};
pub use types::{
    BfdAuthKeyHandle, BfdAuthKeyKind, BfdEchoHandle, BfdEchoKind, BfdSessionHandle,
    BfdSessionKind, Handle, HostInterfaceHandle, HostInterfaceKind, InterfaceHandle,
    InterfaceKind, ObjectKind, RawHandle, StnRuleHandle, StnRuleKind,
};
