//! Object-safe wrapper around one kind's configurator.

use dpagent_device::{ObjectKind, OpContext, RawHandle};
use dpagent_orch_common::{
    Applied, ConfigError, ConfigResult, Configurator, ConfiguratorStats, Dependency, EventKind,
    RegistryWatch, ResourceSpec, ResyncOptions, ResyncReport, TaskStatus, OBSOLETE_PREFIX,
};
use serde::Serialize;
use tracing::debug;

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::resource::{KindConfig, Operation, ResourceConfig, ResourceKind};

/// Registry change of one kind, routed to the kinds depending on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub kind: &'static str,
    pub name: String,
    pub event: EventKind,
}

impl ChangeNotice {
    pub fn dependency(&self) -> Dependency {
        Dependency::new(self.kind, &self.name)
    }
}

/// Result of one object, as reported northbound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<RawHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_on: Option<Dependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ObjectOutcome {
    pub fn from_result<K: ObjectKind>(
        kind: ResourceKind,
        name: impl Into<String>,
        result: &ConfigResult<Applied<K>>,
    ) -> Self {
        let name = name.into();
        match result {
            Ok(applied) => Self {
                kind,
                name,
                status: applied.status(),
                handle: applied.handle().map(|handle| handle.as_raw()),
                waiting_on: match applied {
                    Applied::Pending { waiting_on } => Some(waiting_on.clone()),
                    _ => None,
                },
                error: None,
            },
            Err(err) => Self::from_error(kind, name, err),
        }
    }

    pub fn from_error(kind: ResourceKind, name: impl Into<String>, error: &ConfigError) -> Self {
        Self {
            kind,
            name: name.into(),
            status: error.status(),
            handle: None,
            waiting_on: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// One registry entry, metadata rendered as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryRecord {
    pub name: String,
    pub handle: RawHandle,
    pub metadata: serde_json::Value,
}

/// One pending entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRecord {
    pub name: String,
    pub waiting_on: Dependency,
}

/// What the agent needs from one kind, independent of its payload type.
pub trait KindOrch: Send {
    fn kind(&self) -> ResourceKind;

    /// Kind names whose changes this orch reacts to.
    fn depends_on(&self) -> &'static [&'static str];

    /// Runs one northbound operation. Per-object failures are folded into
    /// the outcome; only fatal errors are returned.
    fn apply(
        &mut self,
        ctx: &OpContext,
        op: Operation,
        config: ResourceConfig,
    ) -> ConfigResult<ObjectOutcome>;

    /// Name of the realized object `op` would take off the device, if any.
    /// Its dependents must be taken down first.
    fn releases(&self, op: Operation, config: &ResourceConfig) -> Option<String>;

    /// Reacts to a change of a kind listed in [`KindOrch::depends_on`].
    fn resolve(
        &mut self,
        ctx: &OpContext,
        notice: &ChangeNotice,
    ) -> ConfigResult<Vec<ObjectOutcome>>;

    fn resync(
        &mut self,
        ctx: &OpContext,
        desired: Vec<ResourceConfig>,
        options: ResyncOptions,
    ) -> ConfigResult<ResyncReport>;

    fn verify_config_presence(&self, ctx: &OpContext) -> ConfigResult<bool>;

    /// Registry changes since the last call.
    fn drain_changes(&mut self) -> Vec<ChangeNotice>;

    fn is_pending(&self, name: &str) -> Option<Dependency>;

    fn exists(&self, name: &str) -> bool;

    fn dump_registry(&self) -> Vec<RegistryRecord>;

    fn dump_pending(&self) -> Vec<PendingRecord>;

    fn stats(&self) -> ConfiguratorStats;
}

/// [`KindOrch`] over a [`Configurator`], with audit records for every
/// object-level result.
pub struct SpecOrch<S: ResourceSpec> {
    configurator: Configurator<S>,
    watch: RegistryWatch<S::Kind, S::Meta>,
}

impl<S> SpecOrch<S>
where
    S: ResourceSpec,
    S::Config: KindConfig,
    S::Meta: Serialize,
{
    pub fn new(configurator: Configurator<S>) -> Self {
        let watch = configurator.registry().watch();
        Self {
            configurator,
            watch,
        }
    }

    pub fn configurator(&self) -> &Configurator<S> {
        &self.configurator
    }

    fn outcome(
        &self,
        action: &str,
        name: String,
        result: ConfigResult<Applied<S::Kind>>,
    ) -> ConfigResult<ObjectOutcome> {
        audit_result(S::Config::KIND, action, &name, &result);
        match result {
            Err(err) if err.is_fatal() => Err(err),
            result => Ok(ObjectOutcome::from_result(S::Config::KIND, name, &result)),
        }
    }
}

impl<S> KindOrch for SpecOrch<S>
where
    S: ResourceSpec,
    S::Config: KindConfig,
    S::Meta: Serialize,
{
    fn kind(&self) -> ResourceKind {
        S::Config::KIND
    }

    fn depends_on(&self) -> &'static [&'static str] {
        self.configurator.spec().depends_on()
    }

    fn apply(
        &mut self,
        ctx: &OpContext,
        op: Operation,
        config: ResourceConfig,
    ) -> ConfigResult<ObjectOutcome> {
        let name = config.name();
        let Some(config) = S::Config::from_resource(config) else {
            let err = ConfigError::validation(
                self.configurator.kind(),
                name.clone(),
                "payload of another kind",
            );
            return Ok(ObjectOutcome::from_error(self.kind(), name, &err));
        };
        let result = match op {
            Operation::Create => self.configurator.create(ctx, config),
            Operation::Modify => self.configurator.modify(ctx, config),
            Operation::Delete => self.configurator.delete(ctx, &config),
        };
        self.outcome(&op.to_string(), name, result)
    }

    fn releases(&self, op: Operation, config: &ResourceConfig) -> Option<String> {
        let name = config.name();
        let removes = match op {
            Operation::Create => false,
            Operation::Modify => S::Config::from_resource(config.clone())
                .is_some_and(|config| self.configurator.removes_on_modify(&config)),
            Operation::Delete => self.configurator.exists(&name),
        };
        removes.then_some(name)
    }

    fn resolve(
        &mut self,
        ctx: &OpContext,
        notice: &ChangeNotice,
    ) -> ConfigResult<Vec<ObjectOutcome>> {
        if !self.depends_on().contains(&notice.kind) {
            return Ok(Vec::new());
        }
        let dependency = notice.dependency();
        let outcomes = match notice.event {
            EventKind::Put => self.configurator.resolve_created(ctx, &dependency)?,
            EventKind::Delete => self.configurator.resolve_deleted(ctx, &dependency)?,
        };
        outcomes
            .into_iter()
            .map(|outcome| self.outcome("resolve", outcome.name, outcome.result))
            .collect()
    }

    fn resync(
        &mut self,
        ctx: &OpContext,
        desired: Vec<ResourceConfig>,
        options: ResyncOptions,
    ) -> ConfigResult<ResyncReport> {
        let desired = desired
            .into_iter()
            .filter_map(S::Config::from_resource)
            .collect();
        self.configurator.resync(ctx, desired, options)
    }

    fn verify_config_presence(&self, ctx: &OpContext) -> ConfigResult<bool> {
        self.configurator.verify_config_presence(ctx)
    }

    fn drain_changes(&mut self) -> Vec<ChangeNotice> {
        let kind = self.configurator.kind();
        self.watch
            .drain()
            .into_iter()
            .filter(|event| !event.name.starts_with(OBSOLETE_PREFIX))
            .map(|event| ChangeNotice {
                kind,
                name: event.name,
                event: event.kind,
            })
            .collect()
    }

    fn is_pending(&self, name: &str) -> Option<Dependency> {
        self.configurator.is_pending(name)
    }

    fn exists(&self, name: &str) -> bool {
        self.configurator.exists(name)
    }

    fn dump_registry(&self) -> Vec<RegistryRecord> {
        self.configurator
            .dump_registry()
            .into_iter()
            .map(|entry| RegistryRecord {
                metadata: serde_json::to_value(entry.metadata.as_ref())
                    .unwrap_or(serde_json::Value::Null),
                name: entry.name,
                handle: entry.handle.as_raw(),
            })
            .collect()
    }

    fn dump_pending(&self) -> Vec<PendingRecord> {
        self.configurator
            .dump_pending()
            .into_iter()
            .map(|entry| PendingRecord {
                name: entry.name,
                waiting_on: entry.waiting_on,
            })
            .collect()
    }

    fn stats(&self) -> ConfiguratorStats {
        self.configurator.stats()
    }
}

fn audit_result<K: ObjectKind>(
    kind: ResourceKind,
    action: &str,
    name: &str,
    result: &ConfigResult<Applied<K>>,
) {
    let (category, outcome) = match result {
        Ok(Applied::Configured { .. }) => (AuditCategory::ResourceCreate, AuditOutcome::Success),
        Ok(Applied::Modified { .. }) | Ok(Applied::Recreated { .. }) => {
            (AuditCategory::ResourceModify, AuditOutcome::Success)
        }
        Ok(Applied::Pending { .. }) => (AuditCategory::DependencyPending, AuditOutcome::InProgress),
        Ok(Applied::Removed) => (AuditCategory::ResourceDelete, AuditOutcome::Success),
        Ok(Applied::Unchanged) => {
            debug!(kind = %kind, name, action, "no device call needed");
            return;
        }
        Err(_) => (AuditCategory::ErrorCondition, AuditOutcome::Failure),
    };

    let mut record = AuditRecord::new(category, kind.as_str(), action)
        .with_outcome(outcome)
        .with_object_id(name)
        .with_object_type(kind.as_str());
    match result {
        Ok(Applied::Configured { handle })
        | Ok(Applied::Modified { handle })
        | Ok(Applied::Recreated { handle }) => {
            record = record.with_details(serde_json::json!({
                "handle": handle.as_raw(),
                "recreated": matches!(result, Ok(Applied::Recreated { .. })),
            }));
        }
        Ok(Applied::Pending { waiting_on }) => {
            record = record.with_details(serde_json::json!({
                "waiting_on": waiting_on.to_string(),
            }));
        }
        Err(err) => record = record.with_error(err.to_string()),
        _ => {}
    }
    audit_log!(record);
}
