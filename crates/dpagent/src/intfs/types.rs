//! Interface configuration types.

use std::fmt;
use std::net::IpAddr;

use dpagent_device::{HostInterfaceHandle, InterfaceHandle};
use dpagent_types::{IpNetwork, MacAddress};
use serde::{Deserialize, Serialize};

/// Largest VxLAN network identifier (24 bits).
pub const VXLAN_VNI_MAX: u32 = (1 << 24) - 1;

/// Name the device's built-in interface at handle 0 is registered under.
pub const LOCAL0: &str = "local0";

/// Memif socket the device creates on its own, always socket ID 0.
pub const DEFAULT_MEMIF_SOCKET: &str = "/run/vpp/memif.sock";

/// Interface type, used for correlation and as registry metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    Loopback,
    Ethernet,
    Memif,
    Tap,
    Vxlan,
    AfPacket,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceType::Loopback => "loopback",
            InterfaceType::Ethernet => "ethernet",
            InterfaceType::Memif => "memif",
            InterfaceType::Tap => "tap",
            InterfaceType::Vxlan => "vxlan",
            InterfaceType::AfPacket => "af_packet",
        };
        write!(f, "{}", s)
    }
}

/// Memif role-specific mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemifMode {
    #[default]
    Ethernet,
    Ip,
    PuntInject,
}

/// Shared-memory interface parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemifLink {
    pub master: bool,
    pub mode: MemifMode,
    pub id: u32,
    pub socket_filename: String,
    pub secret: String,
    pub ring_size: u32,
    pub buffer_size: u32,
    pub rx_queues: u32,
    pub tx_queues: u32,
}

/// Tap interface parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapLink {
    /// 1 or 2; ring sizes and namespace only apply to version 2
    pub version: u8,
    pub host_if_name: String,
    pub namespace: String,
    pub rx_ring_size: u32,
    pub tx_ring_size: u32,
}

impl Default for TapLink {
    fn default() -> Self {
        Self {
            version: 1,
            host_if_name: String::new(),
            namespace: String::new(),
            rx_ring_size: 0,
            tx_ring_size: 0,
        }
    }
}

/// VxLAN tunnel parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VxlanLink {
    pub src_address: Option<IpAddr>,
    pub dst_address: Option<IpAddr>,
    pub vni: u32,
    /// Interface carrying the multicast group address; when set the tunnel
    /// destination is taken from it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multicast: Option<String>,
}

/// Af-packet parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AfPacketLink {
    pub host_if_name: String,
}

/// Link-type specific part of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterfaceLink {
    Loopback,
    Ethernet,
    Memif(MemifLink),
    Tap(TapLink),
    Vxlan(VxlanLink),
    AfPacket(AfPacketLink),
}

impl InterfaceLink {
    pub fn link_type(&self) -> InterfaceType {
        match self {
            InterfaceLink::Loopback => InterfaceType::Loopback,
            InterfaceLink::Ethernet => InterfaceType::Ethernet,
            InterfaceLink::Memif(_) => InterfaceType::Memif,
            InterfaceLink::Tap(_) => InterfaceType::Tap,
            InterfaceLink::Vxlan(_) => InterfaceType::Vxlan,
            InterfaceLink::AfPacket(_) => InterfaceType::AfPacket,
        }
    }
}

/// Unnumbered binding: borrow the addresses of another interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unnumbered {
    pub interface_with_ip: String,
}

/// Receive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RxMode {
    Polling,
    Interrupt,
    Adaptive,
}

/// Northbound interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub link: InterfaceLink,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phys_address: Option<MacAddress>,
    /// 0 keeps the device default
    #[serde(default)]
    pub mtu: u32,
    #[serde(default)]
    pub vrf: u32,
    #[serde(default)]
    pub ip_addresses: Vec<IpNetwork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unnumbered: Option<Unnumbered>,
    #[serde(default)]
    pub dhcp_client: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx_mode: Option<RxMode>,
}

impl InterfaceConfig {
    pub fn new(name: impl Into<String>, link: InterfaceLink) -> Self {
        Self {
            name: name.into(),
            link,
            enabled: false,
            phys_address: None,
            mtu: 0,
            vrf: 0,
            ip_addresses: Vec::new(),
            unnumbered: None,
            dhcp_client: false,
            rx_mode: None,
        }
    }

    pub fn loopback(name: impl Into<String>) -> Self {
        Self::new(name, InterfaceLink::Loopback)
    }

    pub fn ethernet(name: impl Into<String>) -> Self {
        Self::new(name, InterfaceLink::Ethernet)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_phys_address(mut self, mac: MacAddress) -> Self {
        self.phys_address = Some(mac);
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_vrf(mut self, vrf: u32) -> Self {
        self.vrf = vrf;
        self
    }

    pub fn with_ip(mut self, addr: IpNetwork) -> Self {
        self.ip_addresses.push(addr);
        self
    }

    pub fn with_unnumbered(mut self, interface_with_ip: impl Into<String>) -> Self {
        self.unnumbered = Some(Unnumbered {
            interface_with_ip: interface_with_ip.into(),
        });
        self
    }

    pub fn link_type(&self) -> InterfaceType {
        self.link.link_type()
    }

    /// Addresses that take part in comparisons; IPv6 link-local addresses
    /// are assigned by the device itself and are skipped.
    pub fn configured_ips(&self) -> impl Iterator<Item = &IpNetwork> {
        self.ip_addresses.iter().filter(|ip| !ip.is_link_local())
    }

    /// True if one of the addresses has the given host part.
    pub fn has_address(&self, addr: &IpAddr) -> bool {
        self.ip_addresses.iter().any(|ip| ip.has_addr(addr))
    }
}

/// Registry metadata for a realized interface.
///
/// Dependent kinds read it to evaluate their requirements: BFD sessions
/// need their source address, VxLAN tunnels a multicast address, and
/// unnumbered interfaces any address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceMeta {
    pub link_type: InterfaceType,
    pub ip_addresses: Vec<IpNetwork>,
}

impl InterfaceMeta {
    pub fn has_address(&self, addr: &IpAddr) -> bool {
        self.ip_addresses.iter().any(|ip| ip.has_addr(addr))
    }

    /// First multicast address, if any.
    pub fn multicast_address(&self) -> Option<IpAddr> {
        self.ip_addresses
            .iter()
            .find(|ip| ip.is_multicast())
            .map(|ip| ip.addr())
    }
}

/// What the device needs from other resources to create an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceResolved {
    /// Handle of the interface the VxLAN multicast group lives on
    pub multicast_interface: Option<InterfaceHandle>,
    /// Tunnel destination taken from the multicast interface
    pub multicast_address: Option<IpAddr>,
    /// Interface lending its addresses to an unnumbered interface
    pub unnumbered_with: Option<InterfaceHandle>,
    /// Host interface an af-packet interface attaches to
    pub host_interface: Option<HostInterfaceHandle>,
    /// Memif socket ID for the socket filename
    pub memif_socket_id: Option<u32>,
}
