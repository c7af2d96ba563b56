//! BFD resource specs: sessions, authentication keys, echo function.

use std::sync::Arc;

use dpagent_device::{BfdAuthKeyKind, BfdEchoKind, BfdSessionKind, DumpedInstance, InterfaceHandle};
use dpagent_orch_common::{Dependency, Match, PendingCache, Registry, Resolution, ResourceSpec};

use super::types::{
    BfdAuthKeyConfig, BfdAuthKeyMeta, BfdEchoConfig, BfdEchoMeta, BfdSessionConfig,
    BfdSessionMeta, BfdSessionResolved, BFD_AUTH_SECRET_MAX,
};
use crate::intfs::InterfaceRegistry;
use crate::resource::{BFD_AUTH_KEY, BFD_ECHO_FUNCTION, BFD_SESSION, INTERFACE};

pub type BfdAuthKeyRegistry = Arc<Registry<BfdAuthKeyKind, BfdAuthKeyMeta>>;
pub type BfdEchoRegistry = Arc<Registry<BfdEchoKind, BfdEchoMeta>>;

/// Session predicates.
///
/// A session needs its interface registered with the session's source
/// address, and its authentication key when it is authenticated.
pub struct BfdSessionSpec {
    interfaces: InterfaceRegistry,
    auth_keys: BfdAuthKeyRegistry,
}

impl BfdSessionSpec {
    pub fn new(interfaces: InterfaceRegistry, auth_keys: BfdAuthKeyRegistry) -> Self {
        Self {
            interfaces,
            auth_keys,
        }
    }
}

impl ResourceSpec for BfdSessionSpec {
    type Kind = BfdSessionKind;
    type Config = BfdSessionConfig;
    type Meta = BfdSessionMeta;
    type Resolved = BfdSessionResolved;

    fn kind(&self) -> &'static str {
        BFD_SESSION
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[INTERFACE, BFD_AUTH_KEY]
    }

    fn name(&self, config: &BfdSessionConfig) -> String {
        config.name.clone()
    }

    fn validate(&self, config: &BfdSessionConfig) -> Result<(), String> {
        let (src, dst) = (config.source(), config.destination());
        if src.is_ipv4() != dst.is_ipv4() {
            return Err("source and destination address families differ".into());
        }
        if src.is_unspecified() || dst.is_unspecified() {
            return Err("source and destination addresses must be specified".into());
        }
        if config.interface.is_empty() {
            return Err("interface is empty".into());
        }
        if config.detect_multiplier == 0 {
            return Err("detect multiplier must be > 0".into());
        }
        if config.desired_min_tx_interval == 0 || config.required_min_rx_interval == 0 {
            return Err("intervals must be > 0".into());
        }
        Ok(())
    }

    fn dependencies(&self, config: &BfdSessionConfig) -> Vec<Dependency> {
        let mut deps = vec![Dependency::new(INTERFACE, &config.interface)];
        if let Some(auth) = &config.authentication {
            deps.push(Dependency::new(BFD_AUTH_KEY, auth.key_id.to_string()));
        }
        deps
    }

    fn resolve(&self, config: &BfdSessionConfig) -> Resolution<BfdSessionResolved> {
        let source = config.source();
        let interface = match self
            .interfaces
            .lookup_by_name(&config.interface)
            .filter(|entry| entry.metadata.has_address(&source))
        {
            Some(entry) => entry.handle,
            None => return Resolution::Blocked(Dependency::new(INTERFACE, &config.interface)),
        };

        let auth_key = match &config.authentication {
            None => None,
            Some(auth) => {
                let key_name = auth.key_id.to_string();
                match self.auth_keys.lookup_by_name(&key_name) {
                    Some(entry) => Some(entry.handle),
                    None => return Resolution::Blocked(Dependency::new(BFD_AUTH_KEY, key_name)),
                }
            }
        };

        Resolution::Ready(BfdSessionResolved {
            interface,
            auth_key,
        })
    }

    fn metadata(&self, config: &BfdSessionConfig) -> BfdSessionMeta {
        BfdSessionMeta {
            interface: config.interface.clone(),
            source_address: config.source(),
            destination_address: config.destination(),
        }
    }

    fn is_modified(&self, old: &BfdSessionConfig, new: &BfdSessionConfig) -> bool {
        !old.same_endpoints(new)
            || old.desired_min_tx_interval != new.desired_min_tx_interval
            || old.required_min_rx_interval != new.required_min_rx_interval
            || old.detect_multiplier != new.detect_multiplier
            || old.enabled != new.enabled
            || old.authentication != new.authentication
    }

    /// The device modifies timers, multiplier and admin state only.
    fn can_modify_in_place(&self, old: &BfdSessionConfig, new: &BfdSessionConfig) -> bool {
        old.same_endpoints(new) && old.authentication == new.authentication
    }

    fn correlate(
        &self,
        dumped: &DumpedInstance<BfdSessionKind, BfdSessionConfig>,
        desired: &BfdSessionConfig,
    ) -> Option<Match> {
        dumped.config.same_endpoints(desired).then_some(Match::Primary)
    }
}

/// Authentication key predicates. Keys have no dependencies and are never
/// modified in place.
#[derive(Debug, Default)]
pub struct BfdAuthKeySpec;

impl ResourceSpec for BfdAuthKeySpec {
    type Kind = BfdAuthKeyKind;
    type Config = BfdAuthKeyConfig;
    type Meta = BfdAuthKeyMeta;
    type Resolved = ();

    fn kind(&self) -> &'static str {
        BFD_AUTH_KEY
    }

    fn name(&self, config: &BfdAuthKeyConfig) -> String {
        config.id.to_string()
    }

    fn validate(&self, config: &BfdAuthKeyConfig) -> Result<(), String> {
        let len = config.secret.len();
        if len == 0 || len > BFD_AUTH_SECRET_MAX {
            return Err(format!(
                "secret must be 1 to {} bytes, got {}",
                BFD_AUTH_SECRET_MAX, len
            ));
        }
        Ok(())
    }

    fn resolve(&self, _config: &BfdAuthKeyConfig) -> Resolution<()> {
        Resolution::Ready(())
    }

    fn metadata(&self, config: &BfdAuthKeyConfig) -> BfdAuthKeyMeta {
        BfdAuthKeyMeta {
            auth_type: config.auth_type,
        }
    }

    fn is_modified(&self, old: &BfdAuthKeyConfig, new: &BfdAuthKeyConfig) -> bool {
        old.auth_type != new.auth_type || old.secret != new.secret
    }

    fn correlate(
        &self,
        dumped: &DumpedInstance<BfdAuthKeyKind, BfdAuthKeyConfig>,
        desired: &BfdAuthKeyConfig,
    ) -> Option<Match> {
        (dumped.config.id == desired.id).then_some(Match::Primary)
    }
}

/// Echo function predicates.
///
/// The device holds a single echo source, so a payload whose name differs
/// from the one already configured or pending is invalid.
pub struct BfdEchoSpec {
    interfaces: InterfaceRegistry,
    registry: BfdEchoRegistry,
    pending: Arc<PendingCache<BfdEchoConfig>>,
}

impl BfdEchoSpec {
    /// `registry` and `pending` must be the ones the echo configurator
    /// uses.
    pub fn new(
        interfaces: InterfaceRegistry,
        registry: BfdEchoRegistry,
        pending: Arc<PendingCache<BfdEchoConfig>>,
    ) -> Self {
        Self {
            interfaces,
            registry,
            pending,
        }
    }
}

impl ResourceSpec for BfdEchoSpec {
    type Kind = BfdEchoKind;
    type Config = BfdEchoConfig;
    type Meta = BfdEchoMeta;
    type Resolved = InterfaceHandle;

    fn kind(&self) -> &'static str {
        BFD_ECHO_FUNCTION
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[INTERFACE]
    }

    fn name(&self, config: &BfdEchoConfig) -> String {
        config.name.clone()
    }

    fn validate(&self, config: &BfdEchoConfig) -> Result<(), String> {
        if config.echo_source_interface.is_empty() {
            return Err("echo source interface is empty".into());
        }
        let configured = self
            .registry
            .names()
            .into_iter()
            .chain(self.pending.snapshot().into_iter().map(|entry| entry.name))
            .find(|name| *name != config.name);
        match configured {
            Some(other) => Err(format!(
                "only one echo function can be configured, '{}' already is",
                other
            )),
            None => Ok(()),
        }
    }

    fn dependencies(&self, config: &BfdEchoConfig) -> Vec<Dependency> {
        vec![Dependency::new(INTERFACE, &config.echo_source_interface)]
    }

    fn resolve(&self, config: &BfdEchoConfig) -> Resolution<InterfaceHandle> {
        match self.interfaces.lookup_by_name(&config.echo_source_interface) {
            Some(entry) => Resolution::Ready(entry.handle),
            None => Resolution::Blocked(Dependency::new(INTERFACE, &config.echo_source_interface)),
        }
    }

    fn metadata(&self, config: &BfdEchoConfig) -> BfdEchoMeta {
        BfdEchoMeta {
            echo_source_interface: config.echo_source_interface.clone(),
        }
    }

    fn is_modified(&self, old: &BfdEchoConfig, new: &BfdEchoConfig) -> bool {
        old.echo_source_interface != new.echo_source_interface
    }

    fn correlate(
        &self,
        dumped: &DumpedInstance<BfdEchoKind, BfdEchoConfig>,
        desired: &BfdEchoConfig,
    ) -> Option<Match> {
        (dumped.config.echo_source_interface == desired.echo_source_interface)
            .then_some(Match::Primary)
    }
}
