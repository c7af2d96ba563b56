//! The agent: one orch per resource kind and the change pump between them.

use std::collections::BTreeMap;
use std::sync::Arc;

use dpagent_device::{
    BfdAuthKeyKind, BfdEchoKind, BfdSessionKind, DeviceHandler, HostInterfaceHandle,
    HostInterfaceKind, InterfaceHandle, InterfaceKind, OpContext, StnRuleKind,
};
use dpagent_orch_common::{
    ConfiguratorStats, Configurator, Dependency, EventKind, PendingCache, Registry, RegistryWatch,
    ResourceSpec, ResyncOptions, ResyncReport,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::orch::{ChangeNotice, KindOrch, ObjectOutcome, PendingRecord, RegistryRecord, SpecOrch};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::bfd::{BfdAuthKeyConfig, BfdEchoConfig, BfdSessionConfig, BfdSessionResolved};
use crate::config::{AgentConfig, ResyncStrategy};
use crate::error::AgentError;
use crate::intfs::{
    HostInterfaceRegistry, InterfaceConfig, InterfaceRegistry, InterfaceResolved, InterfaceSpec,
};
use crate::resource::{
    DesiredState, KindConfig, Request, ResourceKind, HOST_INTERFACE, INTERFACE,
};
use crate::stn::StnRuleConfig;

/// Device handler of every resource kind.
pub struct DeviceHandlers {
    pub interfaces: Arc<dyn DeviceHandler<InterfaceKind, InterfaceConfig, InterfaceResolved>>,
    pub bfd_auth_keys: Arc<dyn DeviceHandler<BfdAuthKeyKind, BfdAuthKeyConfig, ()>>,
    pub bfd_sessions: Arc<dyn DeviceHandler<BfdSessionKind, BfdSessionConfig, BfdSessionResolved>>,
    pub bfd_echo: Arc<dyn DeviceHandler<BfdEchoKind, BfdEchoConfig, InterfaceHandle>>,
    pub stn_rules: Arc<dyn DeviceHandler<StnRuleKind, StnRuleConfig, InterfaceHandle>>,
}

/// Result of one northbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyReport {
    pub outcome: ObjectOutcome,
    /// Objects of any kind changed by the resulting dependency resolution
    pub cascaded: Vec<ObjectOutcome>,
}

/// Result of an agent-wide resync.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResyncReport {
    pub strategy: ResyncStrategy,
    /// False when obsolete instances were left on the device
    pub cleanup: bool,
    pub skipped: bool,
    pub kinds: Vec<ResyncReport>,
    pub errors: Vec<ObjectOutcome>,
    pub cascaded: Vec<ObjectOutcome>,
}

impl AgentResyncReport {
    fn new(strategy: ResyncStrategy) -> Self {
        Self {
            strategy,
            cleanup: true,
            skipped: false,
            kinds: Vec::new(),
            errors: Vec::new(),
            cascaded: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Report of one kind, by kind name.
    pub fn kind(&self, kind: ResourceKind) -> Option<&ResyncReport> {
        self.kinds.iter().find(|report| report.kind == kind.as_str())
    }
}

/// Registry, pending cache and counters of one kind.
#[derive(Debug, Clone, Serialize)]
pub struct KindSnapshot {
    pub kind: ResourceKind,
    pub registered: Vec<RegistryRecord>,
    pub pending: Vec<PendingRecord>,
    pub stats: ConfiguratorStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub kinds: Vec<KindSnapshot>,
    pub host_interfaces: Vec<String>,
}

/// Coordinates the per-kind orchs.
///
/// Each orch sits behind its own mutex, held for the duration of one
/// operation on that kind. Registry changes an operation causes are queued
/// on the registries' watches and routed afterwards by [`Agent::pump`],
/// which locks one orch at a time, so no two orch locks are ever held
/// together.
pub struct Agent {
    config: AgentConfig,
    orchs: BTreeMap<ResourceKind, Mutex<Box<dyn KindOrch>>>,
    host_interfaces: HostInterfaceRegistry,
    host_watch: Mutex<RegistryWatch<HostInterfaceKind, ()>>,
    root: OpContext,
}

fn boxed<S>(configurator: Configurator<S>) -> Mutex<Box<dyn KindOrch>>
where
    S: ResourceSpec + 'static,
    S::Config: KindConfig,
    S::Meta: Serialize,
{
    Mutex::new(Box::new(SpecOrch::new(configurator)))
}

impl Agent {
    /// Builds the orchs of every kind enabled in this build.
    pub fn new(config: AgentConfig, handlers: DeviceHandlers) -> Self {
        let host_interfaces: HostInterfaceRegistry = Arc::new(Registry::new(HOST_INTERFACE));
        let host_watch = Mutex::new(host_interfaces.watch());
        let interfaces: InterfaceRegistry = Arc::new(Registry::new(INTERFACE));

        let mut orchs = BTreeMap::new();
        let spec = InterfaceSpec::new(
            Arc::clone(&interfaces),
            Arc::clone(&host_interfaces),
            config.agent.track_host_interfaces,
        );
        orchs.insert(
            ResourceKind::Interface,
            boxed(Configurator::new(
                spec,
                handlers.interfaces,
                Arc::clone(&interfaces),
                Arc::new(PendingCache::new()),
            )),
        );

        #[cfg(feature = "mod-bfd")]
        {
            use crate::bfd::{
                BfdAuthKeyRegistry, BfdAuthKeySpec, BfdEchoRegistry, BfdEchoSpec, BfdSessionSpec,
            };
            use crate::resource::{BFD_AUTH_KEY, BFD_ECHO_FUNCTION, BFD_SESSION};

            let auth_keys: BfdAuthKeyRegistry = Arc::new(Registry::new(BFD_AUTH_KEY));
            orchs.insert(
                ResourceKind::BfdAuthKey,
                boxed(Configurator::new(
                    BfdAuthKeySpec,
                    handlers.bfd_auth_keys,
                    Arc::clone(&auth_keys),
                    Arc::new(PendingCache::new()),
                )),
            );
            orchs.insert(
                ResourceKind::BfdSession,
                boxed(Configurator::new(
                    BfdSessionSpec::new(Arc::clone(&interfaces), auth_keys),
                    handlers.bfd_sessions,
                    Arc::new(Registry::new(BFD_SESSION)),
                    Arc::new(PendingCache::new()),
                )),
            );

            let echo: BfdEchoRegistry = Arc::new(Registry::new(BFD_ECHO_FUNCTION));
            let echo_pending = Arc::new(PendingCache::new());
            let spec = BfdEchoSpec::new(
                Arc::clone(&interfaces),
                Arc::clone(&echo),
                Arc::clone(&echo_pending),
            );
            orchs.insert(
                ResourceKind::BfdEchoFunction,
                boxed(Configurator::new(spec, handlers.bfd_echo, echo, echo_pending)),
            );
        }

        #[cfg(feature = "mod-stn")]
        {
            use crate::resource::STN_RULE;
            use crate::stn::StnRuleSpec;

            orchs.insert(
                ResourceKind::StnRule,
                boxed(Configurator::new(
                    StnRuleSpec::new(Arc::clone(&interfaces)),
                    handlers.stn_rules,
                    Arc::new(Registry::new(STN_RULE)),
                    Arc::new(PendingCache::new()),
                )),
            );
        }

        for kind in orchs.keys() {
            info!("Registering {} with priority {}", kind, kind.priority());
            let record = AuditRecord::new(AuditCategory::SystemLifecycle, "Agent", "register_orch")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(kind.as_str())
                .with_object_type("orch")
                .with_details(serde_json::json!({ "priority": kind.priority() }));
            audit_log!(record);
        }

        Self {
            config,
            orchs,
            host_interfaces,
            host_watch,
            root: OpContext::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Kinds enabled in this build, in resync order.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.orchs.keys().copied().collect()
    }

    /// Cancels every in-flight and future device call.
    pub fn cancel(&self) {
        info!("Cancelling agent operations");
        self.root.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.token().clone()
    }

    /// Runs one northbound request, then resolves the dependencies it
    /// affected.
    ///
    /// When the request takes a realized object off the device (delete, or
    /// a modify that recreates it), its dependents are taken down first so
    /// the device never sees a referenced object go away. If the object is
    /// still registered afterwards, the dependents are offered it again.
    pub fn apply(&self, request: Request) -> Result<ApplyReport, AgentError> {
        let Request { op, config } = request;
        let kind = config.kind();
        let orch = self.orch(kind)?;
        let ctx = self.op_context();

        let mut cascaded = Vec::new();
        let released = orch.lock().releases(op, &config);
        if let Some(name) = &released {
            debug!(kind = %kind, name = %name, "releasing dependents");
            let notice = ChangeNotice {
                kind: kind.as_str(),
                name: name.clone(),
                event: EventKind::Delete,
            };
            cascaded.extend(self.notify(&ctx, &notice)?);
        }

        let outcome = orch.lock().apply(&ctx, op, config)?;
        cascaded.extend(self.pump()?);

        if let Some(name) = released {
            if orch.lock().exists(&name) {
                let notice = ChangeNotice {
                    kind: kind.as_str(),
                    name,
                    event: EventKind::Put,
                };
                cascaded.extend(self.notify(&ctx, &notice)?);
                cascaded.extend(self.pump()?);
            }
        }
        Ok(ApplyReport { outcome, cascaded })
    }

    /// Runs requests in order. A fatal error stops the batch; later
    /// requests are not attempted.
    pub fn apply_batch(&self, requests: Vec<Request>) -> Result<Vec<ApplyReport>, AgentError> {
        let mut reports = Vec::with_capacity(requests.len());
        for request in requests {
            reports.push(self.apply(request)?);
        }
        Ok(reports)
    }

    /// Routes queued registry changes to the kinds depending on them until
    /// no change is left or the round limit is hit.
    ///
    /// Changes produced in the last allowed round stay queued and are
    /// routed by the next pump.
    pub fn pump(&self) -> Result<Vec<ObjectOutcome>, AgentError> {
        let mut outcomes = Vec::new();
        for _ in 0..self.config.agent.max_resolution_rounds {
            let notices = self.collect_changes();
            if notices.is_empty() {
                return Ok(outcomes);
            }
            let ctx = self.op_context();
            for notice in &notices {
                outcomes.extend(self.notify(&ctx, notice)?);
            }
        }
        warn!(
            rounds = self.config.agent.max_resolution_rounds,
            "dependency resolution did not settle; remaining changes stay queued"
        );
        Ok(outcomes)
    }

    /// Converges the device to `desired`, kind by kind in priority order,
    /// honouring the configured strategy.
    pub fn resync(&self, desired: DesiredState) -> Result<AgentResyncReport, AgentError> {
        let strategy = self.config.agent.resync_strategy;
        let mut report = AgentResyncReport::new(strategy);
        if strategy == ResyncStrategy::Skip {
            info!("Resync skipped by configuration");
            report.skipped = true;
            return Ok(report);
        }

        let objects = desired.len();
        let desired = desired.into_kinds();
        if let Some(kind) = desired
            .iter()
            .find(|(kind, configs)| !configs.is_empty() && !self.orchs.contains_key(kind))
            .map(|(kind, _)| *kind)
        {
            return Err(AgentError::KindDisabled(kind));
        }

        let record = AuditRecord::new(AuditCategory::Resync, "Agent", "resync_start")
            .with_outcome(AuditOutcome::InProgress)
            .with_details(serde_json::json!({
                "strategy": strategy.to_string(),
                "objects": objects,
            }));
        audit_log!(record);

        if strategy == ResyncStrategy::OptimizeColdStart {
            let present = self
                .orch(ResourceKind::Interface)?
                .lock()
                .verify_config_presence(&self.op_context())?;
            if !present {
                info!("Device looks factory-default; resync runs without cleanup");
                report.cleanup = false;
            }
        }
        let options = ResyncOptions {
            cleanup: report.cleanup,
        };

        for (kind, configs) in desired {
            let Some(orch) = self.orchs.get(&kind) else {
                continue;
            };
            let result = orch.lock().resync(&self.op_context(), configs, options);
            let kind_report = match result {
                Ok(kind_report) => kind_report,
                Err(err) => {
                    let record = AuditRecord::new(AuditCategory::Resync, "Agent", "resync_aborted")
                        .with_object_type(kind.as_str())
                        .with_error(err.to_string());
                    audit_log!(record);
                    return Err(err.into());
                }
            };
            report.errors.extend(
                kind_report
                    .errors
                    .iter()
                    .map(|(name, err)| ObjectOutcome::from_error(kind, name.as_str(), err)),
            );
            report.kinds.push(kind_report);
        }
        report.cascaded = self.pump()?;

        let record = AuditRecord::new(AuditCategory::Resync, "Agent", "resync_end")
            .with_outcome(if report.is_clean() {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            })
            .with_details(serde_json::json!({
                "cleanup": report.cleanup,
                "errors": report.errors.len(),
                "cascaded": report.cascaded.len(),
            }));
        audit_log!(record);
        Ok(report)
    }

    /// Records a host interface and promotes whatever waited on it.
    pub fn host_interface_added(
        &self,
        name: &str,
        ifindex: u32,
    ) -> Result<Vec<ObjectOutcome>, AgentError> {
        self.host_interfaces
            .register(name, HostInterfaceHandle::new(ifindex), ())?;
        let record = AuditRecord::new(AuditCategory::HostInterface, "Agent", "host_interface_added")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(name)
            .with_object_type(HOST_INTERFACE)
            .with_details(serde_json::json!({ "ifindex": ifindex }));
        audit_log!(record);
        self.pump()
    }

    /// Forgets a host interface and takes down whatever used it.
    pub fn host_interface_removed(&self, name: &str) -> Result<Vec<ObjectOutcome>, AgentError> {
        if self.host_interfaces.unregister(name).is_none() {
            debug!(name, "removal of unknown host interface ignored");
            return Ok(Vec::new());
        }
        let record = AuditRecord::new(AuditCategory::HostInterface, "Agent", "host_interface_removed")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(name)
            .with_object_type(HOST_INTERFACE);
        audit_log!(record);
        self.pump()
    }

    pub fn is_pending(&self, kind: ResourceKind, name: &str) -> Option<Dependency> {
        self.orchs.get(&kind)?.lock().is_pending(name)
    }

    pub fn exists(&self, kind: ResourceKind, name: &str) -> bool {
        self.orchs
            .get(&kind)
            .is_some_and(|orch| orch.lock().exists(name))
    }

    pub fn dump_registry(&self, kind: ResourceKind) -> Vec<RegistryRecord> {
        self.orchs
            .get(&kind)
            .map(|orch| orch.lock().dump_registry())
            .unwrap_or_default()
    }

    pub fn dump_pending(&self, kind: ResourceKind) -> Vec<PendingRecord> {
        self.orchs
            .get(&kind)
            .map(|orch| orch.lock().dump_pending())
            .unwrap_or_default()
    }

    pub fn stats(&self, kind: ResourceKind) -> Option<ConfiguratorStats> {
        self.orchs.get(&kind).map(|orch| orch.lock().stats())
    }

    /// Registry and pending contents of every kind.
    pub fn snapshot(&self) -> AgentSnapshot {
        let kinds = self
            .orchs
            .iter()
            .map(|(kind, orch)| {
                let orch = orch.lock();
                KindSnapshot {
                    kind: *kind,
                    registered: orch.dump_registry(),
                    pending: orch.dump_pending(),
                    stats: orch.stats(),
                }
            })
            .collect();
        AgentSnapshot {
            kinds,
            host_interfaces: self.host_interfaces.names(),
        }
    }

    fn orch(&self, kind: ResourceKind) -> Result<&Mutex<Box<dyn KindOrch>>, AgentError> {
        self.orchs.get(&kind).ok_or(AgentError::KindDisabled(kind))
    }

    /// Context for one operation: cancelled with the agent. Each device call
    /// made under it gets the configured device timeout of its own.
    fn op_context(&self) -> OpContext {
        let ctx = self.root.child();
        match self.config.device_timeout() {
            Some(timeout) => ctx.with_call_timeout(timeout),
            None => ctx,
        }
    }

    /// Hands one change to every orch depending on its kind.
    fn notify(
        &self,
        ctx: &OpContext,
        notice: &ChangeNotice,
    ) -> Result<Vec<ObjectOutcome>, AgentError> {
        debug!(
            kind = notice.kind,
            name = %notice.name,
            event = ?notice.event,
            "routing registry change"
        );
        let mut outcomes = Vec::new();
        for orch in self.orchs.values() {
            let mut orch = orch.lock();
            if orch.depends_on().contains(&notice.kind) {
                outcomes.extend(orch.resolve(ctx, notice)?);
            }
        }
        Ok(outcomes)
    }

    fn collect_changes(&self) -> Vec<ChangeNotice> {
        let mut notices: Vec<ChangeNotice> = self
            .host_watch
            .lock()
            .drain()
            .into_iter()
            .map(|event| ChangeNotice {
                kind: HOST_INTERFACE,
                name: event.name,
                event: event.kind,
            })
            .collect();
        for orch in self.orchs.values() {
            notices.extend(orch.lock().drain_changes());
        }
        notices
    }
}
