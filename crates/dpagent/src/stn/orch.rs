//! STN rule spec.

use dpagent_device::{DumpedInstance, InterfaceHandle, StnRuleKind};
use dpagent_orch_common::{Dependency, Match, Resolution, ResourceSpec};

use super::types::{StnRuleConfig, StnRuleMeta};
use crate::intfs::InterfaceRegistry;
use crate::resource::{INTERFACE, STN_RULE};

/// STN rule predicates. Rules cannot be modified in place.
pub struct StnRuleSpec {
    interfaces: InterfaceRegistry,
}

impl StnRuleSpec {
    pub fn new(interfaces: InterfaceRegistry) -> Self {
        Self { interfaces }
    }
}

impl ResourceSpec for StnRuleSpec {
    type Kind = StnRuleKind;
    type Config = StnRuleConfig;
    type Meta = StnRuleMeta;
    type Resolved = InterfaceHandle;

    fn kind(&self) -> &'static str {
        STN_RULE
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[INTERFACE]
    }

    fn name(&self, config: &StnRuleConfig) -> String {
        config.name.clone()
    }

    fn validate(&self, config: &StnRuleConfig) -> Result<(), String> {
        if config.interface.is_empty() {
            return Err("interface is empty".into());
        }
        if config.address().is_unspecified() {
            return Err("ip address must be specified".into());
        }
        Ok(())
    }

    fn dependencies(&self, config: &StnRuleConfig) -> Vec<Dependency> {
        vec![Dependency::new(INTERFACE, &config.interface)]
    }

    fn resolve(&self, config: &StnRuleConfig) -> Resolution<InterfaceHandle> {
        match self.interfaces.lookup_by_name(&config.interface) {
            Some(entry) => Resolution::Ready(entry.handle),
            None => Resolution::Blocked(Dependency::new(INTERFACE, &config.interface)),
        }
    }

    fn metadata(&self, config: &StnRuleConfig) -> StnRuleMeta {
        StnRuleMeta {
            ip_address: config.address(),
            interface: config.interface.clone(),
        }
    }

    fn is_modified(&self, old: &StnRuleConfig, new: &StnRuleConfig) -> bool {
        !old.same_rule(new)
    }

    fn correlate(
        &self,
        dumped: &DumpedInstance<StnRuleKind, StnRuleConfig>,
        desired: &StnRuleConfig,
    ) -> Option<Match> {
        dumped.config.same_rule(desired).then_some(Match::Primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intfs::{InterfaceMeta, InterfaceType};
    use dpagent_device::Handle;
    use dpagent_orch_common::Registry;
    use std::sync::Arc;

    #[test]
    fn test_rule_follows_interface() {
        let interfaces: InterfaceRegistry = Arc::new(Registry::new(INTERFACE));
        let spec = StnRuleSpec::new(interfaces.clone());
        let rule = StnRuleConfig::new("r1", "10.1.1.3".parse().unwrap(), "tap1");

        assert_eq!(
            spec.resolve(&rule),
            Resolution::Blocked(Dependency::new(INTERFACE, "tap1"))
        );
        interfaces
            .register(
                "tap1",
                Handle::new(5),
                InterfaceMeta {
                    link_type: InterfaceType::Tap,
                    ip_addresses: Vec::new(),
                },
            )
            .unwrap();
        assert_eq!(spec.resolve(&rule), Resolution::Ready(Handle::new(5)));
    }

    #[test]
    fn test_any_change_recreates() {
        let interfaces: InterfaceRegistry = Arc::new(Registry::new(INTERFACE));
        let spec = StnRuleSpec::new(interfaces);
        let old = StnRuleConfig::new("r1", "10.1.1.3".parse().unwrap(), "tap1");
        let new = StnRuleConfig::new("r1", "10.1.1.4".parse().unwrap(), "tap1");
        assert!(spec.is_modified(&old, &new));
        assert!(!spec.can_modify_in_place(&old, &new));
        assert!(!spec.is_modified(&old, &old.clone()));
    }
}
