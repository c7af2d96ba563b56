//! Generic per-kind configurator.
//!
//! A [`Configurator`] combines one kind's [`ResourceSpec`], its device
//! handler, its [`Registry`] and its [`PendingCache`]. It is not internally
//! synchronized; callers serialize access per kind (the agent keeps each
//! configurator behind its own mutex) so a resync never observes a
//! half-applied create.
//!
//! Device-owned instances (see [`ResourceSpec::fixed_default`]) are never
//! added or deleted. Resync keeps the unclaimed ones in a spare set; a
//! create claims one from there and a delete resets it and puts it back.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dpagent_device::{DeviceError, DeviceHandler, Handle, ObjectKind, OpContext};
use log::{debug, info, warn};
use serde::Serialize;

use crate::pending::{Dependency, PendingCache, PendingEntry};
use crate::registry::{Registry, RegistryEntry};
use crate::spec::{Resolution, ResourceSpec};
use crate::task::{ConfigError, ConfigResult, TaskStatus};

/// What a successful operation did.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied<K: ObjectKind> {
    /// Added to the device, or claimed from it, and registered
    Configured { handle: Handle<K> },
    /// Updated on the device in place
    Modified { handle: Handle<K> },
    /// Deleted and added again
    Recreated { handle: Handle<K> },
    /// Parked in the pending cache
    Pending { waiting_on: Dependency },
    /// No device call was needed
    Unchanged,
    /// Removed from the device or dropped from the pending cache
    Removed,
}

impl<K: ObjectKind> Applied<K> {
    pub fn status(&self) -> TaskStatus {
        match self {
            Applied::Configured { .. } | Applied::Modified { .. } | Applied::Recreated { .. } => {
                TaskStatus::Configured
            }
            Applied::Pending { .. } => TaskStatus::Pending,
            Applied::Unchanged => TaskStatus::Unchanged,
            Applied::Removed => TaskStatus::Removed,
        }
    }

    /// Device handle after the operation, if the object is realized.
    pub fn handle(&self) -> Option<Handle<K>> {
        match self {
            Applied::Configured { handle }
            | Applied::Modified { handle }
            | Applied::Recreated { handle } => Some(*handle),
            _ => None,
        }
    }
}

/// Per-object result of a batch operation such as dependency resolution.
#[derive(Debug, Clone)]
pub struct Outcome<K: ObjectKind> {
    pub name: String,
    pub result: ConfigResult<Applied<K>>,
}

impl<K: ObjectKind> Outcome<K> {
    pub fn new(name: impl Into<String>, result: ConfigResult<Applied<K>>) -> Self {
        Self {
            name: name.into(),
            result,
        }
    }

    pub fn status(&self) -> TaskStatus {
        match &self.result {
            Ok(applied) => applied.status(),
            Err(err) => err.status(),
        }
    }
}

/// Configurator statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfiguratorStats {
    /// Device adds
    pub created: u64,
    /// In-place device modifies
    pub modified: u64,
    /// Delete-then-add cycles
    pub recreated: u64,
    /// Device deletes requested northbound or by resync cleanup
    pub deleted: u64,
    /// Objects parked in the pending cache
    pub pended: u64,
    /// Pending objects realized by dependency resolution
    pub promoted: u64,
    /// Realized objects taken down because a dependency went away
    pub unrealized: u64,
    /// Resync passes started
    pub resyncs: u64,
}

/// Create / Modify / Delete / Resync engine for one resource kind.
pub struct Configurator<S: ResourceSpec> {
    pub(crate) spec: S,
    pub(crate) device: Arc<dyn DeviceHandler<S::Kind, S::Config, S::Resolved>>,
    pub(crate) registry: Arc<Registry<S::Kind, S::Meta>>,
    pub(crate) pending: Arc<PendingCache<S::Config>>,
    /// Last payload realized for each registered name
    pub(crate) applied: BTreeMap<String, S::Config>,
    /// Unclaimed device-owned instances and their current payload
    pub(crate) spare: BTreeMap<String, (Handle<S::Kind>, S::Config)>,
    pub(crate) stats: ConfiguratorStats,
}

impl<S: ResourceSpec> fmt::Debug for Configurator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configurator")
            .field("kind", &self.spec.kind())
            .field("registered", &self.registry.len())
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<S: ResourceSpec> Configurator<S> {
    /// Creates a configurator over existing registry and pending cache.
    ///
    /// The registry is shared with the specs of kinds that depend on this
    /// one; the pending cache with anything that inspects it.
    pub fn new(
        spec: S,
        device: Arc<dyn DeviceHandler<S::Kind, S::Config, S::Resolved>>,
        registry: Arc<Registry<S::Kind, S::Meta>>,
        pending: Arc<PendingCache<S::Config>>,
    ) -> Self {
        Self {
            spec,
            device,
            registry,
            pending,
            applied: BTreeMap::new(),
            spare: BTreeMap::new(),
            stats: ConfiguratorStats::default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.spec.kind()
    }

    pub fn spec(&self) -> &S {
        &self.spec
    }

    pub fn registry(&self) -> &Arc<Registry<S::Kind, S::Meta>> {
        &self.registry
    }

    pub fn pending(&self) -> &Arc<PendingCache<S::Config>> {
        &self.pending
    }

    pub fn stats(&self) -> ConfiguratorStats {
        self.stats
    }

    /// Configures a new object, or parks it if a dependency is missing.
    ///
    /// A name that is already pending has its payload replaced. On a device
    /// error the object is neither registered nor pending.
    pub fn create(&mut self, ctx: &OpContext, config: S::Config) -> ConfigResult<Applied<S::Kind>> {
        let name = self.spec.name(&config);
        self.validate(&name, &config)?;

        if self.registry.contains(&name) {
            return Err(ConfigError::AlreadyConfigured {
                kind: self.kind(),
                name,
            });
        }
        if self.pending.remove(&name).is_some() {
            debug!("{}: '{}' replaces its pending payload", self.kind(), name);
        }
        self.realize(ctx, name, config)
    }

    /// Moves an object to a new payload.
    ///
    /// Pending objects get the new payload and are re-evaluated; unknown
    /// names are created. Realized objects are compared against the last
    /// applied payload: unchanged ones only refresh registry metadata,
    /// others are modified in place or recreated.
    pub fn modify(&mut self, ctx: &OpContext, config: S::Config) -> ConfigResult<Applied<S::Kind>> {
        let name = self.spec.name(&config);
        self.validate(&name, &config)?;

        if self.pending.remove(&name).is_some() {
            return self.realize(ctx, name, config);
        }
        let Some(entry) = self.registry.lookup_by_name(&name) else {
            return self.realize(ctx, name, config);
        };
        let old = self
            .applied
            .get(&name)
            .cloned()
            .unwrap_or_else(|| config.clone());
        self.update_realized(ctx, &name, entry.handle, &old, config)
    }

    /// Removes an object from the device, or drops it if it only ever was
    /// pending. Unknown names are a no-op.
    pub fn delete(&mut self, ctx: &OpContext, config: &S::Config) -> ConfigResult<Applied<S::Kind>> {
        let name = self.spec.name(config);

        if self.pending.remove(&name).is_some() {
            debug!("{}: dropped pending '{}'", self.kind(), name);
            return Ok(Applied::Removed);
        }
        let Some(entry) = self.registry.lookup_by_name(&name) else {
            debug!("{}: delete of unknown '{}' ignored", self.kind(), name);
            return Ok(Applied::Unchanged);
        };
        let old = self
            .applied
            .get(&name)
            .cloned()
            .unwrap_or_else(|| config.clone());
        self.unrealize(ctx, &name, entry.handle, &old)?;
        if self.is_fixed(&old) {
            info!("{}: released '{}' (handle {})", self.kind(), name, entry.handle);
        } else {
            self.stats.deleted += 1;
            info!("{}: deleted '{}' (handle {})", self.kind(), name, entry.handle);
        }
        Ok(Applied::Removed)
    }

    /// Re-attempts every pending object waiting on `dependency`, which has
    /// just been created or updated.
    ///
    /// Objects still blocked on another dependency are re-keyed. Objects
    /// whose device add fails stay pending and the failure is reported.
    /// Realized objects referencing `dependency` whose requirements no
    /// longer hold (e.g. the interface lost the source address) are taken
    /// down and parked.
    pub fn resolve_created(
        &mut self,
        ctx: &OpContext,
        dependency: &Dependency,
    ) -> ConfigResult<Vec<Outcome<S::Kind>>> {
        let mut outcomes = Vec::new();

        for entry in self.pending.resolve_by_dependency(dependency) {
            let PendingEntry { name, config, .. } = entry;
            match self.spec.resolve(&config) {
                Resolution::Blocked(other) => {
                    if other != *dependency {
                        debug!("{}: '{}' now waits on {}", self.kind(), name, other);
                        self.pending.add(name, config, other);
                    }
                }
                Resolution::Ready(resolved) => match self.place(ctx, &name, &config, &resolved) {
                    Ok(applied) => {
                        self.pending.remove(&name);
                        self.stats.promoted += 1;
                        info!("{}: '{}' resolved by {}", self.kind(), name, dependency);
                        outcomes.push(Outcome::new(name, Ok(applied)));
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!("{}: '{}' stays pending: {}", self.kind(), name, err);
                        outcomes.push(Outcome::new(name, Err(err)));
                    }
                },
            }
        }

        for (name, config) in self.dependents_of(dependency) {
            if let Resolution::Blocked(missing) = self.spec.resolve(&config) {
                if let Some(outcome) = self.take_down(ctx, name, config, missing)? {
                    outcomes.push(outcome);
                }
            }
        }

        Ok(outcomes)
    }

    /// Takes down every realized object referencing `dependency`, which has
    /// just been deleted, and parks it on that dependency.
    pub fn resolve_deleted(
        &mut self,
        ctx: &OpContext,
        dependency: &Dependency,
    ) -> ConfigResult<Vec<Outcome<S::Kind>>> {
        let mut outcomes = Vec::new();
        for (name, config) in self.dependents_of(dependency) {
            if let Some(outcome) = self.take_down(ctx, name, config, dependency.clone())? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Returns true unless the device looks factory-default.
    pub fn verify_config_presence(&self, ctx: &OpContext) -> ConfigResult<bool> {
        let dumped = self
            .device
            .dump(&ctx.for_call())
            .map_err(|err| self.device_error("dump", err))?;
        let present = !self.spec.is_factory_default(&dumped);
        debug!(
            "{}: {} dumped instances, configuration present: {}",
            self.kind(),
            dumped.len(),
            present
        );
        Ok(present)
    }

    /// Dependency `name` is pending on, if it is pending.
    pub fn is_pending(&self, name: &str) -> Option<Dependency> {
        self.pending.waiting_on(name)
    }

    /// True if `name` is registered.
    pub fn exists(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Registry contents sorted by name.
    pub fn dump_registry(&self) -> Vec<RegistryEntry<S::Kind, S::Meta>> {
        self.registry.entries()
    }

    /// Pending entries, oldest first.
    pub fn dump_pending(&self) -> Vec<PendingEntry<S::Config>> {
        self.pending.snapshot()
    }

    /// Payload last realized for `name`.
    pub fn applied_config(&self, name: &str) -> Option<&S::Config> {
        self.applied.get(name)
    }

    /// Names of the device-owned instances nothing has claimed.
    pub fn spare_names(&self) -> Vec<String> {
        self.spare.keys().cloned().collect()
    }

    /// True if a modify to `config` would take the realized instance off
    /// the device, either to recreate it or because a dependency is missing.
    pub fn removes_on_modify(&self, config: &S::Config) -> bool {
        let name = self.spec.name(config);
        if self.validate(&name, config).is_err() || !self.registry.contains(&name) {
            return false;
        }
        let Some(old) = self.applied.get(&name) else {
            return false;
        };
        if !self.spec.is_modified(old, config) {
            return false;
        }
        match self.spec.resolve(config) {
            Resolution::Blocked(_) => true,
            Resolution::Ready(_) => !self.spec.can_modify_in_place(old, config),
        }
    }

    pub(crate) fn is_fixed(&self, config: &S::Config) -> bool {
        self.spec.fixed_default(config).is_some()
    }

    pub(crate) fn validate(&self, name: &str, config: &S::Config) -> ConfigResult<()> {
        if name.is_empty() {
            return Err(ConfigError::validation(self.kind(), name, "name must not be empty"));
        }
        self.spec
            .validate(config)
            .map_err(|reason| ConfigError::validation(self.kind(), name, reason))
    }

    pub(crate) fn device_error(&self, name: &str, error: DeviceError) -> ConfigError {
        ConfigError::from_device(self.kind(), name, error)
    }

    /// Adds `config` to the device if its dependencies hold, parks it
    /// otherwise.
    fn realize(
        &mut self,
        ctx: &OpContext,
        name: String,
        config: S::Config,
    ) -> ConfigResult<Applied<S::Kind>> {
        match self.spec.resolve(&config) {
            Resolution::Blocked(dependency) => Ok(self.park(name, config, dependency)),
            Resolution::Ready(resolved) => {
                let applied = self.place(ctx, &name, &config, &resolved)?;
                if let Some(handle) = applied.handle() {
                    info!("{}: configured '{}' (handle {})", self.kind(), name, handle);
                }
                Ok(applied)
            }
        }
    }

    /// Brings a resolved payload onto the device: device-owned instances
    /// are claimed from the spare set, anything else is added.
    fn place(
        &mut self,
        ctx: &OpContext,
        name: &str,
        config: &S::Config,
        resolved: &S::Resolved,
    ) -> ConfigResult<Applied<S::Kind>> {
        if !self.is_fixed(config) {
            let handle = self.install(ctx, name, config, resolved)?;
            self.stats.created += 1;
            return Ok(Applied::Configured { handle });
        }

        let Some((handle, current)) = self.spare.remove(name) else {
            return Err(ConfigError::NotPresent {
                kind: self.kind(),
                name: name.to_string(),
            });
        };
        let modified = self.spec.is_modified(&current, config);
        if modified {
            if let Err(err) = self
                .device
                .modify(&ctx.for_call(), handle, &current, config, resolved)
            {
                self.spare.insert(name.to_string(), (handle, current));
                return Err(self.device_error(name, err));
            }
        }
        if let Err(err) = self
            .registry
            .register(name, handle, self.spec.metadata(config))
        {
            self.spare.insert(name.to_string(), (handle, config.clone()));
            return Err(err.into());
        }
        self.applied.insert(name.to_string(), config.clone());
        debug!("{}: claimed '{}' (handle {})", self.kind(), name, handle);
        if modified {
            self.stats.modified += 1;
            Ok(Applied::Modified { handle })
        } else {
            Ok(Applied::Configured { handle })
        }
    }

    pub(crate) fn park(
        &mut self,
        name: String,
        config: S::Config,
        dependency: Dependency,
    ) -> Applied<S::Kind> {
        info!("{}: '{}' pending on {}", self.kind(), name, dependency);
        self.pending.add(name, config, dependency.clone());
        self.stats.pended += 1;
        Applied::Pending {
            waiting_on: dependency,
        }
    }

    /// Device add followed by registration.
    pub(crate) fn install(
        &mut self,
        ctx: &OpContext,
        name: &str,
        config: &S::Config,
        resolved: &S::Resolved,
    ) -> ConfigResult<Handle<S::Kind>> {
        let handle = self
            .device
            .add(&ctx.for_call(), name, config, resolved)
            .map_err(|err| self.device_error(name, err))?;

        if let Err(err) = self
            .registry
            .register(name, handle, self.spec.metadata(config))
        {
            warn!("{}: rolling back '{}': {}", self.kind(), name, err);
            self.device
                .delete(&ctx.for_call(), handle, config)
                .map_err(|err| self.device_error(name, err))?;
            return Err(err.into());
        }
        self.applied.insert(name.to_string(), config.clone());
        Ok(handle)
    }

    /// Device delete followed by unregistration. A device-owned instance
    /// is reset instead and goes back to the spare set.
    pub(crate) fn unrealize(
        &mut self,
        ctx: &OpContext,
        name: &str,
        handle: Handle<S::Kind>,
        config: &S::Config,
    ) -> ConfigResult<()> {
        match self.spec.fixed_default(config) {
            Some(reset) => {
                if self.spec.is_modified(config, &reset) {
                    if let Resolution::Ready(resolved) = self.spec.resolve(&reset) {
                        self.device
                            .modify(&ctx.for_call(), handle, config, &reset, &resolved)
                            .map_err(|err| self.device_error(name, err))?;
                    }
                }
                self.spare.insert(name.to_string(), (handle, reset));
            }
            None => self
                .device
                .delete(&ctx.for_call(), handle, config)
                .map_err(|err| self.device_error(name, err))?,
        }
        self.registry.unregister(name);
        self.applied.remove(name);
        Ok(())
    }

    /// Applies `new` over a realized instance currently holding `old`.
    pub(crate) fn update_realized(
        &mut self,
        ctx: &OpContext,
        name: &str,
        handle: Handle<S::Kind>,
        old: &S::Config,
        new: S::Config,
    ) -> ConfigResult<Applied<S::Kind>> {
        if !self.spec.is_modified(old, &new) {
            self.registry.update_metadata(name, self.spec.metadata(&new));
            self.applied.insert(name.to_string(), new);
            return Ok(Applied::Unchanged);
        }

        let resolved = match self.spec.resolve(&new) {
            Resolution::Ready(resolved) => resolved,
            Resolution::Blocked(dependency) => {
                self.unrealize(ctx, name, handle, old)?;
                self.stats.unrealized += 1;
                return Ok(self.park(name.to_string(), new, dependency));
            }
        };

        if self.spec.can_modify_in_place(old, &new) {
            self.device
                .modify(&ctx.for_call(), handle, old, &new, &resolved)
                .map_err(|err| self.device_error(name, err))?;
            self.registry.update_metadata(name, self.spec.metadata(&new));
            self.applied.insert(name.to_string(), new);
            self.stats.modified += 1;
            info!("{}: modified '{}' (handle {})", self.kind(), name, handle);
            return Ok(Applied::Modified { handle });
        }

        if self.is_fixed(old) || self.is_fixed(&new) {
            return Err(ConfigError::validation(
                self.kind(),
                name,
                "a device-owned instance cannot be recreated",
            ));
        }
        self.unrealize(ctx, name, handle, old)?;
        let handle = self.install(ctx, name, &new, &resolved)?;
        self.stats.recreated += 1;
        info!("{}: recreated '{}' (handle {})", self.kind(), name, handle);
        Ok(Applied::Recreated { handle })
    }

    /// Realized objects whose payload references `dependency`.
    fn dependents_of(&self, dependency: &Dependency) -> Vec<(String, S::Config)> {
        self.applied
            .iter()
            .filter(|(_, config)| self.spec.dependencies(config).contains(dependency))
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect()
    }

    /// Unrealizes `name` and parks it on `dependency`. Fatal errors abort;
    /// other failures leave the object realized and are reported.
    fn take_down(
        &mut self,
        ctx: &OpContext,
        name: String,
        config: S::Config,
        dependency: Dependency,
    ) -> ConfigResult<Option<Outcome<S::Kind>>> {
        let Some(entry) = self.registry.lookup_by_name(&name) else {
            return Ok(None);
        };
        match self.unrealize(ctx, &name, entry.handle, &config) {
            Ok(()) => {
                self.stats.unrealized += 1;
                let applied = self.park(name.clone(), config, dependency);
                Ok(Some(Outcome::new(name, Ok(applied))))
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!("{}: could not take down '{}': {}", self.kind(), name, err);
                Ok(Some(Outcome::new(name, Err(err))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{gadget, Harness, Widget};
    use dpagent_device::{DeviceStatus, SimOp};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_registers_handle() {
        let mut h = Harness::new();
        let applied = h
            .configurator
            .create(&h.ctx, Widget::new("w1").label("first"))
            .unwrap();

        assert_eq!(applied, Applied::Configured { handle: Handle::new(1) });
        assert!(h.configurator.exists("w1"));
        let entry = h.configurator.registry().lookup_by_name("w1").unwrap();
        assert_eq!(*entry.metadata, "first");
        assert_eq!(h.device.counters().adds, 1);
    }

    #[test]
    fn test_create_twice_is_rejected() {
        let mut h = Harness::new();
        h.configurator.create(&h.ctx, Widget::new("w1")).unwrap();

        let err = h.configurator.create(&h.ctx, Widget::new("w1")).unwrap_err();
        assert_eq!(
            err,
            ConfigError::AlreadyConfigured {
                kind: "widget",
                name: "w1".to_string()
            }
        );
        assert_eq!(h.device.counters().adds, 1);
    }

    #[test]
    fn test_invalid_payload_touches_nothing() {
        let mut h = Harness::new();
        let err = h
            .configurator
            .create(&h.ctx, Widget::new("w1").size(0).needs("g1"))
            .unwrap_err();

        assert_eq!(err.status(), TaskStatus::InvalidEntry);
        assert!(!h.configurator.exists("w1"));
        assert_eq!(h.configurator.is_pending("w1"), None);
        assert_eq!(h.device.counters(), Default::default());
    }

    #[test]
    fn test_pending_round_trip() {
        let mut h = Harness::new();
        let applied = h
            .configurator
            .create(&h.ctx, Widget::new("w1").needs("g1"))
            .unwrap();
        assert_eq!(applied, Applied::Pending { waiting_on: gadget("g1") });
        assert!(!h.configurator.exists("w1"));
        assert_eq!(h.mutations(), 0);

        h.add_gadget("g1", 40);
        let outcomes = h.configurator.resolve_created(&h.ctx, &gadget("g1")).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status(), TaskStatus::Configured);
        assert!(h.configurator.exists("w1"));
        assert!(h.configurator.dump_pending().is_empty());

        h.gadgets.unregister("g1");
        let outcomes = h.configurator.resolve_deleted(&h.ctx, &gadget("g1")).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status(), TaskStatus::Pending);
        assert!(!h.configurator.exists("w1"));
        assert_eq!(h.configurator.is_pending("w1"), Some(gadget("g1")));
        assert!(h.device.is_empty());
        assert_eq!(h.configurator.stats().unrealized, 1);
    }

    #[test]
    fn test_resolve_ignores_unrelated_dependency() {
        let mut h = Harness::new();
        h.configurator
            .create(&h.ctx, Widget::new("w1").needs("g1"))
            .unwrap();

        h.add_gadget("g2", 41);
        let outcomes = h.configurator.resolve_created(&h.ctx, &gadget("g2")).unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(h.configurator.is_pending("w1"), Some(gadget("g1")));
    }

    #[test]
    fn test_failed_promotion_stays_pending() {
        let mut h = Harness::new();
        h.configurator
            .create(&h.ctx, Widget::new("w1").needs("g1"))
            .unwrap();
        h.add_gadget("g1", 40);
        h.device.fail_next(
            SimOp::Add,
            DeviceError::rejected(DeviceStatus::ResourceExhausted, "add"),
        );

        let outcomes = h.configurator.resolve_created(&h.ctx, &gadget("g1")).unwrap();
        assert_eq!(outcomes[0].status(), TaskStatus::Rejected);
        assert_eq!(h.configurator.is_pending("w1"), Some(gadget("g1")));
        assert!(!h.configurator.exists("w1"));

        h.configurator.resolve_created(&h.ctx, &gadget("g1")).unwrap();
        assert!(h.configurator.exists("w1"));
    }

    #[test]
    fn test_noop_modify_refreshes_metadata_only() {
        let mut h = Harness::new();
        h.configurator
            .create(&h.ctx, Widget::new("w1").label("old"))
            .unwrap();
        let before = h.mutations();

        let applied = h
            .configurator
            .modify(&h.ctx, Widget::new("w1").label("new"))
            .unwrap();
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(h.mutations(), before);
        let entry = h.configurator.registry().lookup_by_name("w1").unwrap();
        assert_eq!(*entry.metadata, "new");
        assert_eq!(h.configurator.applied_config("w1").unwrap().label, "new");
    }

    #[test]
    fn test_modify_in_place_and_recreate() {
        let mut h = Harness::new();
        h.configurator.create(&h.ctx, Widget::new("w1")).unwrap();

        let applied = h
            .configurator
            .modify(&h.ctx, Widget::new("w1").color("blue"))
            .unwrap();
        assert_eq!(applied, Applied::Modified { handle: Handle::new(1) });
        assert_eq!(h.device.counters().modifies, 1);

        let applied = h
            .configurator
            .modify(&h.ctx, Widget::new("w1").color("blue").size(4))
            .unwrap();
        assert_eq!(applied, Applied::Recreated { handle: Handle::new(2) });
        assert_eq!(h.device.counters().deletes, 1);
        assert_eq!(h.device.counters().adds, 2);
        assert_eq!(
            h.configurator.registry().lookup_by_name("w1").unwrap().handle,
            Handle::new(2)
        );
        assert_eq!(h.configurator.stats().recreated, 1);
    }

    #[test]
    fn test_modify_pending_and_unknown() {
        let mut h = Harness::new();
        h.configurator
            .create(&h.ctx, Widget::new("w1").needs("g1"))
            .unwrap();

        // New payload drops the dependency and realizes immediately.
        let applied = h.configurator.modify(&h.ctx, Widget::new("w1")).unwrap();
        assert_eq!(applied.status(), TaskStatus::Configured);
        assert_eq!(h.configurator.is_pending("w1"), None);

        let applied = h.configurator.modify(&h.ctx, Widget::new("w2")).unwrap();
        assert_eq!(applied.status(), TaskStatus::Configured);
        assert!(h.configurator.exists("w2"));
    }

    #[test]
    fn test_modify_onto_missing_dependency_unrealizes() {
        let mut h = Harness::new();
        h.configurator.create(&h.ctx, Widget::new("w1")).unwrap();

        let applied = h
            .configurator
            .modify(&h.ctx, Widget::new("w1").needs("g9"))
            .unwrap();
        assert_eq!(applied, Applied::Pending { waiting_on: gadget("g9") });
        assert!(!h.configurator.exists("w1"));
        assert!(h.device.is_empty());
    }

    #[test]
    fn test_delete_paths() {
        let mut h = Harness::new();
        h.configurator
            .create(&h.ctx, Widget::new("p").needs("g1"))
            .unwrap();
        h.configurator.create(&h.ctx, Widget::new("r")).unwrap();

        assert_eq!(
            h.configurator.delete(&h.ctx, &Widget::new("p")).unwrap(),
            Applied::Removed
        );
        assert_eq!(h.device.counters().deletes, 0);
        assert_eq!(h.configurator.is_pending("p"), None);

        assert_eq!(
            h.configurator.delete(&h.ctx, &Widget::new("r")).unwrap(),
            Applied::Removed
        );
        assert_eq!(h.device.counters().deletes, 1);
        assert!(!h.configurator.exists("r"));

        assert_eq!(
            h.configurator.delete(&h.ctx, &Widget::new("ghost")).unwrap(),
            Applied::Unchanged
        );
    }

    #[test]
    fn test_rejected_create_is_neither_registered_nor_pending() {
        let mut h = Harness::new();
        h.device
            .fail_next(SimOp::Add, DeviceError::rejected(DeviceStatus::InvalidValue, "add"));

        let err = h.configurator.create(&h.ctx, Widget::new("w1")).unwrap_err();
        assert_eq!(err.status(), TaskStatus::Rejected);
        assert!(!err.is_fatal());
        assert!(!h.configurator.exists("w1"));
        assert_eq!(h.configurator.is_pending("w1"), None);
    }

    #[test]
    fn test_unreachable_is_fatal() {
        let mut h = Harness::new();
        h.device.set_unreachable(true);

        let err = h.configurator.create(&h.ctx, Widget::new("w1")).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.status(), TaskStatus::Unreachable);
    }

    #[test]
    fn test_resolve_created_takes_down_stale_dependents() {
        let mut h = Harness::new();
        h.add_gadget("g1", 40);
        h.configurator
            .create(&h.ctx, Widget::new("w1").needs("g1"))
            .unwrap();

        // Gadget re-registered under a different name; w1 no longer resolves.
        h.gadgets.unregister("g1");
        let outcomes = h.configurator.resolve_created(&h.ctx, &gadget("g1")).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(h.configurator.is_pending("w1"), Some(gadget("g1")));
    }

    #[test]
    fn test_name_appears_in_at_most_one_place() {
        let mut h = Harness::new();
        let w = || Widget::new("w1").needs("g1");

        h.configurator.create(&h.ctx, w()).unwrap();
        h.add_gadget("g1", 40);
        h.configurator.resolve_created(&h.ctx, &gadget("g1")).unwrap();
        h.configurator.modify(&h.ctx, w().color("green")).unwrap();
        h.gadgets.unregister("g1");
        h.configurator.resolve_deleted(&h.ctx, &gadget("g1")).unwrap();
        h.configurator.modify(&h.ctx, w().size(3)).unwrap();

        let registered = h.configurator.exists("w1");
        let pending = h.configurator.is_pending("w1").is_some();
        assert!(!(registered && pending));
        assert!(pending);
        assert_eq!(h.configurator.dump_pending().len(), 1);
    }

    #[test]
    fn test_device_owned_instance_is_claimed_and_released() {
        let mut h = Harness::new();
        let port = h
            .device
            .inject(None, Widget::new("port1").port().mac("02:00:00:00:00:01"));
        h.configurator
            .resync(&h.ctx, vec![], crate::ResyncOptions::default())
            .unwrap();
        assert!(!h.configurator.exists("port1"));
        assert_eq!(h.configurator.spare_names(), vec!["port1".to_string()]);

        let applied = h
            .configurator
            .create(
                &h.ctx,
                Widget::new("port1")
                    .port()
                    .mac("02:00:00:00:00:01")
                    .color("blue")
                    .ips(&["10.0.0.1/24"]),
            )
            .unwrap();
        assert_eq!(applied, Applied::Modified { handle: port });
        assert!(h.configurator.exists("port1"));
        assert!(h.configurator.spare_names().is_empty());
        assert_eq!(h.device.counters().adds, 0);

        let applied = h
            .configurator
            .delete(&h.ctx, &Widget::new("port1").port())
            .unwrap();
        assert_eq!(applied, Applied::Removed);
        assert!(!h.configurator.exists("port1"));
        assert_eq!(h.configurator.spare_names(), vec!["port1".to_string()]);
        let entry = h.device.get(port).unwrap();
        assert_eq!(entry.config.color, "red");
        assert!(entry.config.ips.is_empty());
        assert_eq!(entry.config.mac, Some("02:00:00:00:00:01"));
        assert_eq!(h.device.counters().deletes, 0);
        assert_eq!(h.configurator.stats().deleted, 0);

        // Claiming it unchanged needs no device call.
        let applied = h
            .configurator
            .create(&h.ctx, Widget::new("port1").port().mac("02:00:00:00:00:01"))
            .unwrap();
        assert_eq!(applied, Applied::Configured { handle: port });
        assert_eq!(h.device.counters().modifies, 2);
    }

    #[test]
    fn test_missing_device_owned_instance_is_rejected() {
        let mut h = Harness::new();
        let err = h
            .configurator
            .create(&h.ctx, Widget::new("port9").port())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotPresent {
                kind: "widget",
                name: "port9".to_string()
            }
        );
        assert_eq!(err.status(), TaskStatus::Rejected);
        assert!(!h.configurator.exists("port9"));
        assert_eq!(h.configurator.is_pending("port9"), None);
        assert_eq!(h.mutations(), 0);
    }

    #[test]
    fn test_device_owned_instance_parks_without_leaving_the_device() {
        let mut h = Harness::new();
        let port = h.device.inject(None, Widget::new("port1").port());
        h.configurator
            .resync(&h.ctx, vec![Widget::new("port1").port()], crate::ResyncOptions::default())
            .unwrap();
        assert!(h.configurator.exists("port1"));

        let applied = h
            .configurator
            .modify(&h.ctx, Widget::new("port1").port().needs("g1"))
            .unwrap();
        assert_eq!(applied, Applied::Pending { waiting_on: gadget("g1") });
        assert!(h.device.get(port).is_some());

        h.add_gadget("g1", 40);
        let outcomes = h.configurator.resolve_created(&h.ctx, &gadget("g1")).unwrap();
        assert_eq!(outcomes[0].result, Ok(Applied::Modified { handle: port }));
        assert_eq!(h.device.counters().adds, 0);
        assert_eq!(h.device.counters().deletes, 0);
    }

    #[test]
    fn test_removes_on_modify() {
        let mut h = Harness::new();
        h.configurator.create(&h.ctx, Widget::new("w1")).unwrap();

        assert!(!h.configurator.removes_on_modify(&Widget::new("w1").label("x")));
        assert!(!h.configurator.removes_on_modify(&Widget::new("w1").color("blue")));
        assert!(h.configurator.removes_on_modify(&Widget::new("w1").size(2)));
        assert!(h.configurator.removes_on_modify(&Widget::new("w1").needs("g1")));
        assert!(!h.configurator.removes_on_modify(&Widget::new("w1").size(0)));
        assert!(!h.configurator.removes_on_modify(&Widget::new("w2").size(2)));
    }
}
