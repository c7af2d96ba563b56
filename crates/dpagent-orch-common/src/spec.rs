//! Per-kind behaviour plugged into the generic [`Configurator`].
//!
//! [`Configurator`]: crate::Configurator

use std::fmt::Debug;

use dpagent_device::{DumpedInstance, ObjectKind};

use crate::pending::Dependency;

/// Result of evaluating a payload's dependencies.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<R> {
    /// Every dependency holds; `R` carries what the device call needs from
    /// them (peer handles, addresses).
    Ready(R),
    /// The first dependency that does not hold.
    Blocked(Dependency),
}

/// Strength of a heuristic match between a dumped instance and a desired
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// Hardware address equality
    Primary,
    /// Address-list equality
    Secondary,
}

/// Kind-specific predicates for one resource kind.
///
/// Implementations hold whatever they need to evaluate dependencies, usually
/// `Arc`s of other kinds' registries, and any secondary cache the kind keeps
/// (e.g. memif socket IDs). Methods take `&self`; secondary caches use
/// interior mutability.
pub trait ResourceSpec: Send + Sync {
    type Kind: ObjectKind;
    type Config: Clone + Debug + Send + Sync + 'static;
    type Meta: Debug + Send + Sync + 'static;
    type Resolved: Debug;

    /// Kind name, also used as the `kind` of dependencies on this kind.
    fn kind(&self) -> &'static str;

    /// Kinds whose changes can unblock or invalidate objects of this kind.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// Logical name of a payload.
    fn name(&self, config: &Self::Config) -> String;

    /// Structural checks. Returns the reason on failure.
    fn validate(&self, config: &Self::Config) -> Result<(), String>;

    /// Every resource the payload references. Used to find realized
    /// instances affected by a deleted resource.
    fn dependencies(&self, _config: &Self::Config) -> Vec<Dependency> {
        Vec::new()
    }

    /// Evaluates the dependencies against current state.
    fn resolve(&self, config: &Self::Config) -> Resolution<Self::Resolved>;

    /// Metadata registered alongside the handle.
    fn metadata(&self, config: &Self::Config) -> Self::Meta;

    /// True if moving from `old` to `new` needs a device call.
    fn is_modified(&self, old: &Self::Config, new: &Self::Config) -> bool;

    /// True if the device can apply `new` over `old` without a recreate.
    fn can_modify_in_place(&self, _old: &Self::Config, _new: &Self::Config) -> bool {
        false
    }

    /// Heuristic match of an untagged dumped instance against a desired
    /// payload.
    fn correlate(
        &self,
        _dumped: &DumpedInstance<Self::Kind, Self::Config>,
        _desired: &Self::Config,
    ) -> Option<Match> {
        None
    }

    /// Built-in instances are never deleted by resync.
    fn is_builtin(&self, _dumped: &DumpedInstance<Self::Kind, Self::Config>) -> bool {
        false
    }

    /// Name an uncorrelated built-in is registered under, if any.
    fn builtin_name(&self, _dumped: &DumpedInstance<Self::Kind, Self::Config>) -> Option<String> {
        None
    }

    /// For instances the device owns and that can be neither added nor
    /// deleted (physical ports): the payload that releases `config` back to
    /// its unconfigured state. `None` for everything else.
    fn fixed_default(&self, _config: &Self::Config) -> Option<Self::Config> {
        None
    }

    /// True if the dump looks like a device nobody has configured.
    fn is_factory_default(&self, dumped: &[DumpedInstance<Self::Kind, Self::Config>]) -> bool {
        dumped.is_empty()
    }

    /// Clears secondary caches at the start of a resync.
    fn reset(&self) {}

    /// Rebuilds secondary caches from a fresh dump.
    fn observe_dump(&self, _dumped: &[DumpedInstance<Self::Kind, Self::Config>]) {}
}
