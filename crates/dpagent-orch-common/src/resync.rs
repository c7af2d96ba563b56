//! Resync correlator.
//!
//! One pass runs four phases in order:
//!
//! 1. Snapshot: clear the registry, the pending cache and the kind's
//!    secondary caches, then dump the device.
//! 2. Tagged correlation: a dumped instance whose tag names a desired object
//!    is registered under that name and brought to the desired payload.
//! 3. Heuristic correlation: untagged instances are matched against the
//!    remaining desired objects by [`ResourceSpec::correlate`]. The first
//!    primary match in desired order wins, then the first secondary match.
//! 4. Cleanup and creation: uncorrelated instances are registered
//!    transiently and deleted; uncorrelated desired objects go through
//!    [`Configurator::create`].
//!
//! A tag is authoritative: a tagged instance whose tag names no remaining
//! desired object is obsolete and never matched heuristically. Built-in
//! instances are never deleted; uncorrelated device-owned ones are kept
//! unregistered as spares for a later create to claim.
//!
//! [`ResourceSpec::correlate`]: crate::ResourceSpec::correlate

use std::collections::HashMap;

use dpagent_device::{DumpedInstance, OpContext};
use log::{debug, info, warn};
use serde::Serialize;

use crate::configurator::{Applied, Configurator};
use crate::spec::{Match, ResourceSpec};
use crate::task::{ConfigError, ConfigResult};

/// Registry name prefix for obsolete instances awaiting deletion.
pub const OBSOLETE_PREFIX: &str = "obsolete-";

/// Resync options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncOptions {
    /// Delete uncorrelated, non-built-in instances
    pub cleanup: bool,
}

impl Default for ResyncOptions {
    fn default() -> Self {
        Self { cleanup: true }
    }
}

/// Summary of one resync pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResyncReport {
    pub kind: &'static str,
    /// Instances returned by the dump
    pub dumped: usize,
    /// Correlated by tag
    pub tagged: usize,
    /// Correlated heuristically
    pub heuristic: usize,
    /// Uncorrelated built-ins kept
    pub builtin: usize,
    pub unchanged: usize,
    pub modified: usize,
    pub recreated: usize,
    /// Obsolete instances deleted
    pub deleted: usize,
    /// Obsolete instances left alone because cleanup was off
    pub skipped: usize,
    pub created: usize,
    pub pending: usize,
    #[serde(skip)]
    pub errors: Vec<(String, ConfigError)>,
}

impl ResyncReport {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Instances correlated with a desired object.
    pub fn correlated(&self) -> usize {
        self.tagged + self.heuristic
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record<K: dpagent_device::ObjectKind>(&mut self, applied: &Applied<K>) {
        match applied {
            Applied::Configured { .. } => self.created += 1,
            Applied::Modified { .. } => self.modified += 1,
            Applied::Recreated { .. } => self.recreated += 1,
            Applied::Pending { .. } => self.pending += 1,
            Applied::Unchanged | Applied::Removed => self.unchanged += 1,
        }
    }

    fn fail(&mut self, name: impl Into<String>, error: ConfigError) {
        let name = name.into();
        warn!("{}: resync of '{}' failed: {}", self.kind, name, error);
        self.errors.push((name, error));
    }
}

type Slot<C> = Option<(String, C)>;

impl<S: ResourceSpec> Configurator<S> {
    /// Converges the device to `desired`.
    ///
    /// Per-object failures are collected in the report. A device-unreachable
    /// error aborts the pass and leaves the registry needing another resync.
    pub fn resync(
        &mut self,
        ctx: &OpContext,
        desired: Vec<S::Config>,
        options: ResyncOptions,
    ) -> ConfigResult<ResyncReport> {
        let kind = self.kind();
        ctx.check().map_err(|err| self.device_error("resync", err))?;
        self.stats.resyncs += 1;
        let mut report = ResyncReport::new(kind);

        // Phase 1
        self.registry.clear();
        self.pending.clear();
        self.applied.clear();
        self.spare.clear();
        self.spec.reset();

        let dumped = self
            .device
            .dump(&ctx.for_call())
            .map_err(|err| self.device_error("dump", err))?;
        self.spec.observe_dump(&dumped);
        report.dumped = dumped.len();

        let mut remaining: Vec<Slot<S::Config>> = Vec::with_capacity(desired.len());
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for config in desired {
            let name = self.spec.name(&config);
            if let Err(err) = self.validate(&name, &config) {
                report.fail(name, err);
                continue;
            }
            if by_name.contains_key(&name) {
                let err = ConfigError::validation(kind, &name, "duplicate name in desired state");
                report.fail(name, err);
                continue;
            }
            by_name.insert(name.clone(), remaining.len());
            remaining.push(Some((name, config)));
        }

        // Phase 2
        let mut untagged = Vec::new();
        let mut obsolete = Vec::new();
        for instance in dumped {
            let Some(tag) = instance.tag().map(str::to_string) else {
                untagged.push(instance);
                continue;
            };
            match by_name.get(&tag).and_then(|&idx| remaining[idx].take()) {
                Some((name, config)) => {
                    report.tagged += 1;
                    self.adopt(ctx, instance, name, config, true, &mut report)?;
                }
                None if self.spec.is_builtin(&instance) => {
                    self.keep_builtin(instance, tag, &mut report);
                }
                None => obsolete.push(instance),
            }
        }

        // Phase 3
        for instance in untagged {
            let matched = self
                .best_match(&instance, &remaining)
                .and_then(|idx| remaining[idx].take());
            match matched {
                Some((name, config)) => {
                    report.heuristic += 1;
                    self.adopt(ctx, instance, name, config, false, &mut report)?;
                }
                None if self.spec.is_builtin(&instance) => {
                    match self.spec.builtin_name(&instance) {
                        Some(name) => self.keep_builtin(instance, name, &mut report),
                        None => report.builtin += 1,
                    }
                }
                None => obsolete.push(instance),
            }
        }

        // Phase 4
        for instance in obsolete {
            if !options.cleanup {
                debug!("{}: leaving uncorrelated handle {}", kind, instance.handle);
                report.skipped += 1;
                continue;
            }
            self.remove_obsolete(ctx, instance, &mut report)?;
        }
        for (name, config) in remaining.into_iter().flatten() {
            match self.create(ctx, config) {
                Ok(applied) => report.record(&applied),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => report.fail(name, err),
            }
        }

        info!(
            "{}: resync done: dumped={} tagged={} heuristic={} modified={} recreated={} deleted={} created={} pending={} errors={}",
            kind,
            report.dumped,
            report.tagged,
            report.heuristic,
            report.modified,
            report.recreated,
            report.deleted,
            report.created,
            report.pending,
            report.errors.len()
        );
        Ok(report)
    }

    /// First primary match in desired order, else the first secondary one.
    fn best_match(
        &self,
        instance: &DumpedInstance<S::Kind, S::Config>,
        remaining: &[Slot<S::Config>],
    ) -> Option<usize> {
        let mut secondary = None;
        for (idx, slot) in remaining.iter().enumerate() {
            let Some((_, config)) = slot else {
                continue;
            };
            match self.spec.correlate(instance, config) {
                Some(Match::Primary) => return Some(idx),
                Some(Match::Secondary) if secondary.is_none() => secondary = Some(idx),
                _ => {}
            }
        }
        secondary
    }

    /// Registers a correlated instance, writes its tag back if needed, then
    /// brings it to the desired payload.
    fn adopt(
        &mut self,
        ctx: &OpContext,
        instance: DumpedInstance<S::Kind, S::Config>,
        name: String,
        desired: S::Config,
        tagged: bool,
        report: &mut ResyncReport,
    ) -> ConfigResult<()> {
        let DumpedInstance {
            handle,
            config: current,
            ..
        } = instance;

        if let Err(err) = self
            .registry
            .register(name.clone(), handle, self.spec.metadata(&current))
        {
            report.fail(name, err.into());
            return Ok(());
        }
        self.applied.insert(name.clone(), current.clone());
        debug!("{}: correlated '{}' with handle {}", self.kind(), name, handle);

        if !tagged && self.device.supports_tags() {
            if let Err(err) = self.device.set_tag(&ctx.for_call(), handle, &name) {
                let err = self.device_error(&name, err);
                if err.is_fatal() {
                    return Err(err);
                }
                report.fail(name.clone(), err);
            }
        }

        match self.update_realized(ctx, &name, handle, &current, desired) {
            Ok(applied) => report.record(&applied),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => report.fail(name, err),
        }
        Ok(())
    }

    fn keep_builtin(
        &mut self,
        instance: DumpedInstance<S::Kind, S::Config>,
        name: String,
        report: &mut ResyncReport,
    ) {
        report.builtin += 1;
        if self.is_fixed(&instance.config) {
            debug!("{}: spare '{}' at handle {}", self.kind(), name, instance.handle);
            self.spare.insert(name, (instance.handle, instance.config));
            return;
        }
        let metadata = self.spec.metadata(&instance.config);
        match self.registry.register(name.clone(), instance.handle, metadata) {
            Ok(()) => {
                debug!("{}: built-in '{}' at handle {}", self.kind(), name, instance.handle);
                self.applied.insert(name, instance.config);
            }
            Err(err) => debug!("{}: built-in not registered: {}", self.kind(), err),
        }
    }

    /// Registers an obsolete instance under a transient name, then deletes it.
    fn remove_obsolete(
        &mut self,
        ctx: &OpContext,
        instance: DumpedInstance<S::Kind, S::Config>,
        report: &mut ResyncReport,
    ) -> ConfigResult<()> {
        let name = format!("{}{}", OBSOLETE_PREFIX, instance.handle.as_raw());
        let registered = self
            .registry
            .register(name.clone(), instance.handle, self.spec.metadata(&instance.config))
            .is_ok();

        let result = self.device.delete(&ctx.for_call(), instance.handle, &instance.config);
        if registered {
            self.registry.unregister(&name);
        }
        match result {
            Ok(()) => {
                info!("{}: deleted obsolete handle {}", self.kind(), instance.handle);
                self.stats.deleted += 1;
                report.deleted += 1;
                Ok(())
            }
            Err(err) => {
                let err = self.device_error(&name, err);
                if err.is_fatal() {
                    return Err(err);
                }
                report.fail(name, err);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, Widget};
    use std::time::Duration;

    use dpagent_device::{DeviceError, Handle, OpContext, SimTable};
    use pretty_assertions::assert_eq;

    fn resync(h: &mut Harness, desired: Vec<Widget>) -> ResyncReport {
        h.configurator
            .resync(&h.ctx, desired, ResyncOptions::default())
            .unwrap()
    }

    #[test]
    fn test_resync_is_idempotent() {
        let mut h = Harness::new();
        h.add_gadget("g1", 40);
        h.device.inject_at(0, None, Widget::new("local0"));
        h.device.inject(None, Widget::new("stray").mac("02:00:00:00:00:99"));

        let desired = vec![
            Widget::new("a").mac("02:00:00:00:00:01"),
            Widget::new("b").needs("g1").color("blue"),
            Widget::new("c").needs("g2"),
        ];
        let first = resync(&mut h, desired.clone());
        assert_eq!(first.deleted, 1);
        assert_eq!(first.created, 2);
        assert_eq!(first.pending, 1);
        assert!(first.is_clean());

        h.device.reset_counters();
        let second = resync(&mut h, desired);
        assert_eq!(h.mutations(), 0);
        assert_eq!(second.tagged, 2);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.pending, 1);
        assert!(h.configurator.exists("local0"));
    }

    #[test]
    fn test_tag_beats_heuristic() {
        let mut h = Harness::new();
        let handle = h
            .device
            .inject(Some("x"), Widget::new("x").mac("02:00:00:00:00:0b"));

        let report = resync(
            &mut h,
            vec![
                Widget::new("x").mac("02:00:00:00:00:0a"),
                Widget::new("y").mac("02:00:00:00:00:0b"),
            ],
        );

        assert_eq!(report.tagged, 1);
        assert_eq!(report.heuristic, 0);
        let x = h.configurator.registry().lookup_by_name("x").unwrap();
        assert_eq!(x.handle, handle);
        let y = h.configurator.registry().lookup_by_name("y").unwrap();
        assert_ne!(y.handle, handle);
        assert_eq!(report.created, 1);
    }

    #[test]
    fn test_heuristic_match_writes_tag_back() {
        let mut h = Harness::new();
        let handle = h.device.inject(None, Widget::new("").mac("02:00:00:00:00:01"));

        let report = resync(&mut h, vec![Widget::new("tap1").mac("02:00:00:00:00:01")]);

        assert_eq!(report.heuristic, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(h.mutations(), 0);
        assert_eq!(h.device.get(handle).unwrap().tag.as_deref(), Some("tap1"));
        assert_eq!(h.configurator.registry().lookup_by_name("tap1").unwrap().handle, handle);
    }

    #[test]
    fn test_heuristic_tie_break() {
        let mut h = Harness::new();
        let dumped = h.device.inject(
            None,
            Widget::new("")
                .mac("02:00:00:00:00:02")
                .ips(&["10.0.0.1/24"]),
        );

        // Secondary matches on both; primary only on the last one.
        resync(
            &mut h,
            vec![
                Widget::new("first").ips(&["10.0.0.1/24"]),
                Widget::new("second").ips(&["10.0.0.1/24"]),
                Widget::new("third").mac("02:00:00:00:00:02"),
            ],
        );
        assert_eq!(
            h.configurator.registry().lookup_by_handle(dumped).unwrap().name,
            "third"
        );

        let mut h = Harness::new();
        let dumped = h.device.inject(None, Widget::new("").ips(&["10.0.0.1/24"]));
        resync(
            &mut h,
            vec![
                Widget::new("first").ips(&["10.0.0.1/24"]),
                Widget::new("second").ips(&["10.0.0.1/24"]),
            ],
        );
        assert_eq!(
            h.configurator.registry().lookup_by_handle(dumped).unwrap().name,
            "first"
        );
    }

    #[test]
    fn test_correlated_instance_is_modified() {
        let mut h = Harness::new();
        h.device.inject(Some("w1"), Widget::new("w1").color("red"));
        h.device.inject(Some("w2"), Widget::new("w2").size(1));

        let report = resync(
            &mut h,
            vec![Widget::new("w1").color("blue"), Widget::new("w2").size(2)],
        );
        assert_eq!(report.modified, 1);
        assert_eq!(report.recreated, 1);
        assert_eq!(h.device.len(), 2);
    }

    #[test]
    fn test_unknown_and_duplicate_tags_are_obsolete() {
        let mut h = Harness::new();
        h.device.inject(Some("w1"), Widget::new("w1"));
        h.device.inject(Some("w1"), Widget::new("w1"));
        h.device.inject(Some("gone"), Widget::new("gone").mac("02:00:00:00:00:01"));

        let report = resync(&mut h, vec![Widget::new("w1"), Widget::new("n").mac("02:00:00:00:00:01")]);

        assert_eq!(report.tagged, 1);
        assert_eq!(report.heuristic, 0);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.created, 1);
        assert_eq!(h.device.len(), 2);
        assert!(h
            .configurator
            .registry()
            .names()
            .iter()
            .all(|name| !name.starts_with(OBSOLETE_PREFIX)));
    }

    #[test]
    fn test_cleanup_disabled_leaves_strays() {
        let mut h = Harness::new();
        let stray = h.device.inject(None, Widget::new("stray"));

        let report = h
            .configurator
            .resync(&h.ctx, vec![Widget::new("w1")], ResyncOptions { cleanup: false })
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert!(h.device.get(stray).is_some());
        assert!(h.configurator.registry().lookup_by_handle(stray).is_none());
    }

    #[test]
    fn test_builtin_is_registered_and_kept() {
        let mut h = Harness::new();
        h.device.inject_at(0, None, Widget::new("local0"));

        let report = resync(&mut h, vec![]);
        assert_eq!(report.builtin, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(
            h.configurator.registry().lookup_by_name("local0").unwrap().handle,
            Handle::new(0)
        );
    }

    #[test]
    fn test_resync_drops_stale_state() {
        let mut h = Harness::new();
        h.configurator
            .create(&h.ctx, Widget::new("p").needs("g1"))
            .unwrap();
        h.configurator.create(&h.ctx, Widget::new("r")).unwrap();
        h.device.remove_out_of_band(Handle::new(1));

        let report = resync(&mut h, vec![Widget::new("r")]);
        assert_eq!(report.created, 1);
        assert!(h.configurator.exists("r"));
        assert_eq!(h.configurator.is_pending("p"), None);
        assert!(h.configurator.dump_pending().is_empty());
        assert_eq!(h.configurator.is_pending("r"), None);
    }

    #[test]
    fn test_invalid_desired_reported() {
        let mut h = Harness::new();
        let report = resync(&mut h, vec![Widget::new("bad").size(0), Widget::new("ok"), Widget::new("ok")]);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.created, 1);
    }

    #[test]
    fn test_unreachable_dump_aborts() {
        let mut h = Harness::with_device(SimTable::new("widgets"));
        h.device.set_unreachable(true);

        let err = h
            .configurator
            .resync(&h.ctx, vec![Widget::new("w1")], ResyncOptions::default())
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_cancelled_pass_aborts() {
        let mut h = Harness::new();
        h.ctx.cancel();

        let err = h
            .configurator
            .resync(&h.ctx, vec![Widget::new("w1")], ResyncOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DeviceUnreachable {
                kind: "widget",
                source: DeviceError::Cancelled
            }
        );
    }

    #[test]
    fn test_call_timeout_applies_per_device_call() {
        let mut h = Harness::new();
        h.device.set_latency(Duration::from_millis(20));
        h.ctx = OpContext::new().with_call_timeout(Duration::from_millis(60));

        let desired = (1..=6).map(|i| Widget::new(&format!("w{}", i))).collect();
        let report = resync(&mut h, desired);
        assert_eq!(report.created, 6);
        assert!(report.is_clean());

        h.device.set_latency(Duration::from_millis(80));
        let err = h
            .configurator
            .resync(&h.ctx, vec![Widget::new("w1")], ResyncOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DeviceUnreachable {
                kind: "widget",
                source: DeviceError::DeadlineExceeded
            }
        );
    }

    #[test]
    fn test_device_owned_instances_are_never_deleted() {
        let mut h = Harness::new();
        h.device.inject(Some("old"), Widget::new("p0").port().color("blue"));
        let p1 = h.device.inject(None, Widget::new("p1").port());

        let report = resync(&mut h, vec![Widget::new("p1").port().color("green")]);
        assert_eq!(report.builtin, 2);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.created, 0);
        assert_eq!(report.modified, 1);
        assert_eq!(h.device.len(), 2);
        assert_eq!(h.device.counters().adds, 0);
        assert_eq!(h.configurator.registry().lookup_by_name("p1").unwrap().handle, p1);
        assert_eq!(h.configurator.spare_names(), vec!["old".to_string()]);
    }
}
