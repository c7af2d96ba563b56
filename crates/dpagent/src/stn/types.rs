//! STN rule types.

use std::net::IpAddr;

use dpagent_types::IpNetwork;
use serde::{Deserialize, Serialize};

/// Steal-the-NIC rule: traffic to `ip_address` that the device does not
/// handle itself is punted to `interface`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StnRuleConfig {
    pub name: String,
    /// A prefix length is accepted and ignored
    pub ip_address: IpNetwork,
    pub interface: String,
}

impl StnRuleConfig {
    pub fn new(name: impl Into<String>, ip_address: IpAddr, interface: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip_address: IpNetwork::host(ip_address),
            interface: interface.into(),
        }
    }

    /// The rule address with the mask stripped.
    pub fn address(&self) -> IpAddr {
        self.ip_address.addr()
    }

    pub fn same_rule(&self, other: &StnRuleConfig) -> bool {
        self.address() == other.address() && self.interface == other.interface
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StnRuleMeta {
    pub ip_address: IpAddr,
    pub interface: String,
}
