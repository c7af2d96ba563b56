//! Reconciliation engine for the dataplane agent.
//!
//! This crate provides the pieces every resource kind is configured
//! through:
//!
//! - [`Registry`]: name to device handle to metadata map with a watch stream
//! - [`PendingCache`]: objects waiting on a missing [`Dependency`]
//! - [`ResourceSpec`]: the per-kind predicates (validation, dependency
//!   resolution, change detection, heuristic correlation)
//! - [`Configurator`]: Create / Modify / Delete / dependency resolution /
//!   resync / introspection for one kind
//! - [`ConfigError`] and [`TaskStatus`]: the per-object outcome taxonomy
//!
//! # Architecture
//!
//! 1. Northbound requests arrive as Create / Modify / Delete calls on the
//!    configurator of the request's kind
//! 2. The configurator evaluates the payload's dependencies through its
//!    spec; a missing dependency parks the payload in the pending cache
//! 3. Otherwise it calls the device handler and records the handle in the
//!    registry, which publishes the change to its watchers
//! 4. Whoever owns the configurators routes those changes to dependent
//!    kinds as `resolve_created` / `resolve_deleted` calls
//! 5. Resync rebuilds the registry from a device dump and converges it to
//!    the desired state

mod configurator;
mod pending;
mod registry;
mod resync;
mod spec;
mod task;

#[cfg(test)]
mod testing;

pub use configurator::{Applied, Configurator, ConfiguratorStats, Outcome};
pub use pending::{Dependency, PendingCache, PendingEntry};
pub use registry::{EventKind, Registry, RegistryEntry, RegistryError, RegistryEvent, RegistryWatch};
pub use resync::{ResyncOptions, ResyncReport, OBSOLETE_PREFIX};
pub use spec::{Match, Resolution, ResourceSpec};
pub use task::{ConfigError, ConfigResult, TaskStatus};
