//! Simulated device.
//!
//! One [`SimTable`] per resource kind. Interfaces keep tags and hand out
//! handles from 1; `local0` can be preinstalled at handle 0 and physical
//! ports are preinstalled untagged with locally administered MACs. BFD and
//! STN tables keep no tags, so resync must correlate them heuristically.

use std::sync::Arc;

use dpagent_device::{
    BfdAuthKeyKind, BfdEchoKind, BfdSessionKind, InterfaceKind, SimCounters, SimTable, StnRuleKind,
};
use dpagent_types::MacAddress;

use crate::bfd::{BfdAuthKeyConfig, BfdEchoConfig, BfdSessionConfig};
use crate::config::SimulationSection;
use crate::daemon::DeviceHandlers;
use crate::intfs::{InterfaceConfig, LOCAL0};
use crate::stn::StnRuleConfig;

/// In-memory device covering every resource kind.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub interfaces: Arc<SimTable<InterfaceKind, InterfaceConfig>>,
    pub bfd_auth_keys: Arc<SimTable<BfdAuthKeyKind, BfdAuthKeyConfig>>,
    pub bfd_sessions: Arc<SimTable<BfdSessionKind, BfdSessionConfig>>,
    pub bfd_echo: Arc<SimTable<BfdEchoKind, BfdEchoConfig>>,
    pub stn_rules: Arc<SimTable<StnRuleKind, StnRuleConfig>>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    /// Empty device; not even `local0`.
    pub fn new() -> Self {
        Self {
            interfaces: Arc::new(SimTable::new("interfaces")),
            bfd_auth_keys: Arc::new(SimTable::new("bfd_auth_keys").without_tags()),
            bfd_sessions: Arc::new(SimTable::new("bfd_sessions").without_tags()),
            bfd_echo: Arc::new(SimTable::new("bfd_echo").without_tags()),
            stn_rules: Arc::new(SimTable::new("stn_rules").without_tags()),
        }
    }

    /// Device as described by the `[simulation]` section.
    pub fn from_config(section: &SimulationSection) -> Self {
        let device = Self::new();
        if section.preinstall_local0 {
            device
                .interfaces
                .inject_at(0, None, InterfaceConfig::loopback(LOCAL0));
        }
        for (idx, port) in section.ethernet_ports.iter().enumerate() {
            let config = InterfaceConfig::ethernet(port.as_str()).with_phys_address(port_mac(idx));
            device.interfaces.inject(None, config);
        }
        device
    }

    /// Handlers the agent drives this device through.
    pub fn handlers(&self) -> DeviceHandlers {
        DeviceHandlers {
            interfaces: self.interfaces.clone(),
            bfd_auth_keys: self.bfd_auth_keys.clone(),
            bfd_sessions: self.bfd_sessions.clone(),
            bfd_echo: self.bfd_echo.clone(),
            stn_rules: self.stn_rules.clone(),
        }
    }

    /// Counters of every table, by table name.
    pub fn counters(&self) -> Vec<(&'static str, SimCounters)> {
        vec![
            (self.interfaces.name(), self.interfaces.counters()),
            (self.bfd_auth_keys.name(), self.bfd_auth_keys.counters()),
            (self.bfd_sessions.name(), self.bfd_sessions.counters()),
            (self.bfd_echo.name(), self.bfd_echo.counters()),
            (self.stn_rules.name(), self.stn_rules.counters()),
        ]
    }

    /// Adds, modifies and deletes across all tables.
    pub fn mutations(&self) -> u64 {
        self.counters()
            .iter()
            .map(|(_, counters)| counters.mutations())
            .sum()
    }

    pub fn reset_counters(&self) {
        self.interfaces.reset_counters();
        self.bfd_auth_keys.reset_counters();
        self.bfd_sessions.reset_counters();
        self.bfd_echo.reset_counters();
        self.stn_rules.reset_counters();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.interfaces.set_unreachable(unreachable);
        self.bfd_auth_keys.set_unreachable(unreachable);
        self.bfd_sessions.set_unreachable(unreachable);
        self.bfd_echo.set_unreachable(unreachable);
        self.stn_rules.set_unreachable(unreachable);
    }
}

/// Locally administered MAC for the `idx`-th preinstalled port.
fn port_mac(idx: usize) -> MacAddress {
    let idx = idx as u32;
    MacAddress::new([
        0x02,
        0x00,
        0x00,
        (idx >> 16) as u8,
        (idx >> 8) as u8,
        idx as u8 + 1,
    ])
}
