//! Interface resource spec.

use std::collections::HashMap;
use std::sync::Arc;

use dpagent_device::{DumpedInstance, HostInterfaceKind, InterfaceKind};
use dpagent_orch_common::{Dependency, Match, Registry, Resolution, ResourceSpec};
use dpagent_types::IpNetwork;
use parking_lot::Mutex;
use tracing::debug;

use super::types::{
    InterfaceConfig, InterfaceLink, InterfaceMeta, InterfaceResolved, DEFAULT_MEMIF_SOCKET, LOCAL0,
    VXLAN_VNI_MAX,
};
use crate::resource::{HOST_INTERFACE, INTERFACE};

/// Registry of interfaces realized on the device.
pub type InterfaceRegistry = Arc<Registry<InterfaceKind, InterfaceMeta>>;

/// Registry of host (kernel) interfaces reported by the host-interface
/// watcher; keyed by name, handle is the host ifindex.
pub type HostInterfaceRegistry = Arc<Registry<HostInterfaceKind, ()>>;

/// Memif socket filename to socket ID.
///
/// The default socket always holds ID 0; a new filename gets the number of
/// filenames already known as its ID.
#[derive(Debug)]
struct MemifSockets {
    ids: HashMap<String, u32>,
}

impl Default for MemifSockets {
    fn default() -> Self {
        let mut ids = HashMap::new();
        ids.insert(DEFAULT_MEMIF_SOCKET.to_string(), 0);
        Self { ids }
    }
}

impl MemifSockets {
    fn id_for(&mut self, filename: &str) -> u32 {
        if let Some(id) = self.ids.get(filename) {
            return *id;
        }
        let id = self.ids.len() as u32;
        self.ids.insert(filename.to_string(), id);
        debug!(socket = filename, id, "registered memif socket");
        id
    }
}

/// Interface predicates.
pub struct InterfaceSpec {
    interfaces: InterfaceRegistry,
    host_interfaces: HostInterfaceRegistry,
    track_host_interfaces: bool,
    memif_sockets: Mutex<MemifSockets>,
}

impl InterfaceSpec {
    /// `interfaces` must be the registry the interface configurator
    /// registers into; it is read to resolve multicast and unnumbered
    /// references between interfaces.
    pub fn new(
        interfaces: InterfaceRegistry,
        host_interfaces: HostInterfaceRegistry,
        track_host_interfaces: bool,
    ) -> Self {
        Self {
            interfaces,
            host_interfaces,
            track_host_interfaces,
            memif_sockets: Mutex::new(MemifSockets::default()),
        }
    }

    /// Known memif sockets, ordered by ID.
    pub fn memif_sockets(&self) -> Vec<(String, u32)> {
        let mut sockets: Vec<_> = self
            .memif_sockets
            .lock()
            .ids
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect();
        sockets.sort_by_key(|(_, id)| *id);
        sockets
    }
}

/// Same address set, ignoring IPv6 link-local addresses. Every address in
/// `desired` must be present in `actual` with the same prefix length.
fn same_addresses(desired: &[IpNetwork], actual: &[IpNetwork]) -> bool {
    let desired: Vec<_> = desired.iter().filter(|ip| !ip.is_link_local()).collect();
    let actual: Vec<_> = actual.iter().filter(|ip| !ip.is_link_local()).collect();
    desired.len() == actual.len() && desired.iter().all(|ip| actual.contains(ip))
}

fn link_modified(old: &InterfaceLink, new: &InterfaceLink) -> bool {
    match (old, new) {
        (InterfaceLink::AfPacket(old), InterfaceLink::AfPacket(new)) => {
            old.host_if_name != new.host_if_name
        }
        // Secret, ring and buffer sizes cannot be read back from the device
        (InterfaceLink::Memif(old), InterfaceLink::Memif(new)) => {
            old.id != new.id
                || old.socket_filename != new.socket_filename
                || old.master != new.master
                || old.mode != new.mode
                || old.rx_queues != new.rx_queues
                || old.tx_queues != new.tx_queues
        }
        (InterfaceLink::Tap(old), InterfaceLink::Tap(new)) => {
            (new.version == 2
                && (old.version != 2
                    || old.rx_ring_size != new.rx_ring_size
                    || old.tx_ring_size != new.tx_ring_size))
                || old.namespace != new.namespace
                || old.host_if_name != new.host_if_name
        }
        (InterfaceLink::Vxlan(old), InterfaceLink::Vxlan(new)) => {
            old.vni != new.vni
                || old.src_address != new.src_address
                || old.dst_address != new.dst_address
                || old.multicast != new.multicast
        }
        _ => false,
    }
}

impl ResourceSpec for InterfaceSpec {
    type Kind = InterfaceKind;
    type Config = InterfaceConfig;
    type Meta = InterfaceMeta;
    type Resolved = InterfaceResolved;

    fn kind(&self) -> &'static str {
        INTERFACE
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[INTERFACE, HOST_INTERFACE]
    }

    fn name(&self, config: &InterfaceConfig) -> String {
        config.name.clone()
    }

    fn validate(&self, config: &InterfaceConfig) -> Result<(), String> {
        match &config.link {
            InterfaceLink::Vxlan(vxlan) => {
                let src = vxlan
                    .src_address
                    .ok_or_else(|| "vxlan source address is missing".to_string())?;
                match vxlan.dst_address {
                    Some(dst) if dst.is_ipv4() != src.is_ipv4() => {
                        return Err("vxlan source and destination address families differ".into())
                    }
                    None if vxlan.multicast.is_none() => {
                        return Err("vxlan destination address is missing".into())
                    }
                    _ => {}
                }
                if vxlan.vni > VXLAN_VNI_MAX {
                    return Err(format!("vxlan vni {} exceeds {}", vxlan.vni, VXLAN_VNI_MAX));
                }
            }
            InterfaceLink::Memif(memif) if memif.socket_filename.is_empty() => {
                return Err("memif socket filename is empty".into());
            }
            InterfaceLink::Tap(tap) if tap.version != 1 && tap.version != 2 => {
                return Err(format!("unsupported tap version {}", tap.version));
            }
            InterfaceLink::AfPacket(af) if af.host_if_name.is_empty() => {
                return Err("af-packet host interface name is empty".into());
            }
            _ => {}
        }

        if config.unnumbered.is_some() && !config.ip_addresses.is_empty() {
            return Err("an unnumbered interface cannot have IP addresses".into());
        }

        Ok(())
    }

    fn dependencies(&self, config: &InterfaceConfig) -> Vec<Dependency> {
        let mut deps = Vec::new();
        match &config.link {
            InterfaceLink::AfPacket(af) if self.track_host_interfaces => {
                deps.push(Dependency::new(HOST_INTERFACE, &af.host_if_name));
            }
            InterfaceLink::Vxlan(vxlan) => {
                if let Some(multicast) = &vxlan.multicast {
                    deps.push(Dependency::new(INTERFACE, multicast));
                }
            }
            _ => {}
        }
        if let Some(unnumbered) = &config.unnumbered {
            deps.push(Dependency::new(INTERFACE, &unnumbered.interface_with_ip));
        }
        deps
    }

    fn resolve(&self, config: &InterfaceConfig) -> Resolution<InterfaceResolved> {
        let mut resolved = InterfaceResolved::default();

        match &config.link {
            InterfaceLink::AfPacket(af) if self.track_host_interfaces => {
                match self.host_interfaces.lookup_by_name(&af.host_if_name) {
                    Some(host) => resolved.host_interface = Some(host.handle),
                    None => {
                        return Resolution::Blocked(Dependency::new(HOST_INTERFACE, &af.host_if_name))
                    }
                }
            }
            InterfaceLink::Vxlan(vxlan) => {
                if let Some(multicast) = &vxlan.multicast {
                    let found = self.interfaces.lookup_by_name(multicast).and_then(|entry| {
                        entry
                            .metadata
                            .multicast_address()
                            .map(|addr| (entry.handle, addr))
                    });
                    match found {
                        Some((handle, addr)) => {
                            resolved.multicast_interface = Some(handle);
                            resolved.multicast_address = Some(addr);
                        }
                        None => return Resolution::Blocked(Dependency::new(INTERFACE, multicast)),
                    }
                }
            }
            _ => {}
        }

        if let Some(unnumbered) = &config.unnumbered {
            let with_ip = self
                .interfaces
                .lookup_by_name(&unnumbered.interface_with_ip)
                .filter(|entry| !entry.metadata.ip_addresses.is_empty());
            match with_ip {
                Some(entry) => resolved.unnumbered_with = Some(entry.handle),
                None => {
                    return Resolution::Blocked(Dependency::new(
                        INTERFACE,
                        &unnumbered.interface_with_ip,
                    ))
                }
            }
        }

        if let InterfaceLink::Memif(memif) = &config.link {
            resolved.memif_socket_id = Some(self.memif_sockets.lock().id_for(&memif.socket_filename));
        }

        Resolution::Ready(resolved)
    }

    fn metadata(&self, config: &InterfaceConfig) -> InterfaceMeta {
        InterfaceMeta {
            link_type: config.link_type(),
            ip_addresses: config.ip_addresses.clone(),
        }
    }

    fn is_modified(&self, old: &InterfaceConfig, new: &InterfaceConfig) -> bool {
        let name = &new.name;
        if old.link_type() != new.link_type() {
            debug!(interface = %name, "type changed");
            return true;
        }
        if old.enabled != new.enabled {
            debug!(interface = %name, "enabled state changed");
            return true;
        }
        if old.vrf != new.vrf {
            debug!(interface = %name, "vrf changed");
            return true;
        }
        if old.dhcp_client != new.dhcp_client {
            debug!(interface = %name, "dhcp client changed");
            return true;
        }
        if !matches!(new.link, InterfaceLink::Vxlan(_)) && old.mtu != new.mtu {
            debug!(interface = %name, "mtu changed");
            return true;
        }
        if let Some(mac) = new.phys_address {
            if old.phys_address != Some(mac) {
                debug!(interface = %name, "physical address changed");
                return true;
            }
        }
        if new.unnumbered.is_none() && !same_addresses(&new.ip_addresses, &old.ip_addresses) {
            debug!(interface = %name, "ip addresses changed");
            return true;
        }
        if old.unnumbered != new.unnumbered {
            debug!(interface = %name, "unnumbered binding changed");
            return true;
        }
        if old.rx_mode != new.rx_mode {
            debug!(interface = %name, "rx mode changed");
            return true;
        }
        if link_modified(&old.link, &new.link) {
            debug!(interface = %name, "link parameters changed");
            return true;
        }
        false
    }

    fn can_modify_in_place(&self, old: &InterfaceConfig, new: &InterfaceConfig) -> bool {
        match (&old.link, &new.link) {
            (InterfaceLink::Loopback, InterfaceLink::Loopback)
            | (InterfaceLink::Ethernet, InterfaceLink::Ethernet) => true,
            (InterfaceLink::Memif(a), InterfaceLink::Memif(b)) => a == b,
            (InterfaceLink::Tap(a), InterfaceLink::Tap(b)) => a == b,
            (InterfaceLink::Vxlan(a), InterfaceLink::Vxlan(b)) => a == b && old.vrf == new.vrf,
            (InterfaceLink::AfPacket(a), InterfaceLink::AfPacket(b)) => {
                a.host_if_name == b.host_if_name
            }
            _ => false,
        }
    }

    fn correlate(
        &self,
        dumped: &DumpedInstance<InterfaceKind, InterfaceConfig>,
        desired: &InterfaceConfig,
    ) -> Option<Match> {
        if dumped.handle.as_raw() == 0 || dumped.config.link_type() != desired.link_type() {
            return None;
        }
        if let Some(mac) = desired.phys_address {
            if dumped.config.phys_address == Some(mac) {
                return Some(Match::Primary);
            }
        }
        let has_ips = desired.configured_ips().next().is_some();
        if has_ips && same_addresses(&desired.ip_addresses, &dumped.config.ip_addresses) {
            return Some(Match::Secondary);
        }
        None
    }

    fn is_builtin(&self, dumped: &DumpedInstance<InterfaceKind, InterfaceConfig>) -> bool {
        dumped.handle.as_raw() == 0 || dumped.config.link == InterfaceLink::Ethernet
    }

    /// `local0`, or the device's own name for a physical port.
    fn builtin_name(&self, dumped: &DumpedInstance<InterfaceKind, InterfaceConfig>) -> Option<String> {
        if dumped.handle.as_raw() == 0 {
            return Some(LOCAL0.to_string());
        }
        let port = dumped.config.link == InterfaceLink::Ethernet && !dumped.config.name.is_empty();
        port.then(|| dumped.config.name.clone())
    }

    /// Physical ports go back to down, unaddressed and in the default VRF;
    /// the MAC is the port's own.
    fn fixed_default(&self, config: &InterfaceConfig) -> Option<InterfaceConfig> {
        if config.link != InterfaceLink::Ethernet {
            return None;
        }
        let mut reset = InterfaceConfig::ethernet(config.name.as_str());
        reset.phys_address = config.phys_address;
        Some(reset)
    }

    /// Only `local0` and untouched physical ports: untagged, no addresses.
    fn is_factory_default(&self, dumped: &[DumpedInstance<InterfaceKind, InterfaceConfig>]) -> bool {
        dumped.iter().all(|instance| {
            instance.handle.as_raw() == 0
                || (instance.config.link == InterfaceLink::Ethernet
                    && instance.tag().is_none()
                    && instance.config.ip_addresses.is_empty())
        })
    }

    fn reset(&self) {
        *self.memif_sockets.lock() = MemifSockets::default();
    }

    fn observe_dump(&self, dumped: &[DumpedInstance<InterfaceKind, InterfaceConfig>]) {
        let mut sockets = self.memif_sockets.lock();
        for instance in dumped {
            if let InterfaceLink::Memif(memif) = &instance.config.link {
                sockets.id_for(&memif.socket_filename);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intfs::types::{AfPacketLink, MemifLink, TapLink, VxlanLink};
    use dpagent_device::Handle;
    use pretty_assertions::assert_eq;

    fn spec(track: bool) -> InterfaceSpec {
        InterfaceSpec::new(
            Arc::new(Registry::new(INTERFACE)),
            Arc::new(Registry::new(HOST_INTERFACE)),
            track,
        )
    }

    fn ip(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    fn memif(socket: &str) -> InterfaceConfig {
        InterfaceConfig::new(
            "memif1",
            InterfaceLink::Memif(MemifLink {
                socket_filename: socket.to_string(),
                id: 1,
                ..Default::default()
            }),
        )
    }

    fn dumped(raw: u32, config: InterfaceConfig) -> DumpedInstance<InterfaceKind, InterfaceConfig> {
        DumpedInstance::new(Handle::new(raw), None, config)
    }

    #[test]
    fn test_validate_rejects_bad_payloads() {
        let spec = spec(false);

        let unnumbered = InterfaceConfig::loopback("loop2")
            .with_unnumbered("loop1")
            .with_ip(ip("10.0.0.1/24"));
        assert!(spec.validate(&unnumbered).is_err());

        let vxlan = InterfaceConfig::new(
            "vx1",
            InterfaceLink::Vxlan(VxlanLink {
                src_address: Some("10.0.0.1".parse().unwrap()),
                dst_address: Some("2001:db8::1".parse().unwrap()),
                vni: 10,
                multicast: None,
            }),
        );
        assert!(spec.validate(&vxlan).is_err());

        let tap = InterfaceConfig::new(
            "tap1",
            InterfaceLink::Tap(TapLink {
                version: 3,
                ..Default::default()
            }),
        );
        assert!(spec.validate(&tap).is_err());

        assert!(spec.validate(&memif("")).is_err());
        assert!(spec.validate(&memif("/run/vpp/memif.sock")).is_ok());
    }

    #[test]
    fn test_vxlan_vni_limit() {
        let spec = spec(false);
        let mut link = VxlanLink {
            src_address: Some("10.0.0.1".parse().unwrap()),
            dst_address: Some("10.0.0.2".parse().unwrap()),
            vni: VXLAN_VNI_MAX,
            multicast: None,
        };
        assert!(spec
            .validate(&InterfaceConfig::new("vx1", InterfaceLink::Vxlan(link.clone())))
            .is_ok());
        link.vni = VXLAN_VNI_MAX + 1;
        assert!(spec
            .validate(&InterfaceConfig::new("vx1", InterfaceLink::Vxlan(link)))
            .is_err());
    }

    #[test]
    fn test_memif_socket_ids_follow_first_use() {
        let spec = spec(false);
        let resolve_id = |socket: &str| match spec.resolve(&memif(socket)) {
            Resolution::Ready(resolved) => resolved.memif_socket_id,
            Resolution::Blocked(dep) => panic!("blocked on {}", dep),
        };

        assert_eq!(resolve_id("/run/a.sock"), Some(1));
        assert_eq!(resolve_id("/run/b.sock"), Some(2));
        assert_eq!(resolve_id("/run/a.sock"), Some(1));
        assert_eq!(resolve_id(DEFAULT_MEMIF_SOCKET), Some(0));

        spec.reset();
        spec.observe_dump(&[dumped(3, memif("/run/b.sock"))]);
        assert_eq!(resolve_id("/run/a.sock"), Some(2));
        assert_eq!(
            spec.memif_sockets(),
            vec![
                (DEFAULT_MEMIF_SOCKET.to_string(), 0),
                ("/run/b.sock".to_string(), 1),
                ("/run/a.sock".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_unnumbered_waits_for_addresses() {
        let spec = spec(false);
        let config = InterfaceConfig::loopback("loop2").with_unnumbered("loop1");
        assert_eq!(
            spec.resolve(&config),
            Resolution::Blocked(Dependency::new(INTERFACE, "loop1"))
        );

        spec.interfaces
            .register(
                "loop1",
                Handle::new(1),
                spec.metadata(&InterfaceConfig::loopback("loop1")),
            )
            .unwrap();
        assert!(matches!(spec.resolve(&config), Resolution::Blocked(_)));

        spec.interfaces.update_metadata(
            "loop1",
            spec.metadata(&InterfaceConfig::loopback("loop1").with_ip(ip("10.0.0.1/24"))),
        );
        match spec.resolve(&config) {
            Resolution::Ready(resolved) => assert_eq!(resolved.unnumbered_with, Some(Handle::new(1))),
            Resolution::Blocked(dep) => panic!("blocked on {}", dep),
        }
    }

    #[test]
    fn test_af_packet_tracks_host_interface_only_when_enabled() {
        let config = InterfaceConfig::new(
            "afp1",
            InterfaceLink::AfPacket(AfPacketLink {
                host_if_name: "veth1".to_string(),
            }),
        );
        assert!(matches!(spec(false).resolve(&config), Resolution::Ready(_)));
        assert!(spec(false).dependencies(&config).is_empty());

        let tracking = spec(true);
        assert_eq!(
            tracking.resolve(&config),
            Resolution::Blocked(Dependency::new(HOST_INTERFACE, "veth1"))
        );
        tracking
            .host_interfaces
            .register("veth1", Handle::new(12), ())
            .unwrap();
        match tracking.resolve(&config) {
            Resolution::Ready(resolved) => assert_eq!(resolved.host_interface, Some(Handle::new(12))),
            Resolution::Blocked(dep) => panic!("blocked on {}", dep),
        }
    }

    #[test]
    fn test_is_modified_ignores_link_local_and_absent_mac() {
        let spec = spec(false);
        let device = InterfaceConfig::loopback("loop1")
            .with_phys_address("02:00:00:00:00:01".parse().unwrap())
            .with_ip(ip("10.0.0.1/24"))
            .with_ip(ip("fe80::1/64"));
        let desired = InterfaceConfig::loopback("loop1").with_ip(ip("10.0.0.1/24"));
        assert!(!spec.is_modified(&device, &desired));

        let other_mask = InterfaceConfig::loopback("loop1").with_ip(ip("10.0.0.1/16"));
        assert!(spec.is_modified(&device, &other_mask));

        let enabled = desired.clone().with_enabled(true);
        assert!(spec.is_modified(&device, &enabled));
    }

    #[test]
    fn test_is_modified_skips_mtu_for_vxlan() {
        let spec = spec(false);
        let vxlan = InterfaceConfig::new(
            "vx1",
            InterfaceLink::Vxlan(VxlanLink {
                src_address: Some("10.0.0.1".parse().unwrap()),
                dst_address: Some("10.0.0.2".parse().unwrap()),
                vni: 5,
                multicast: None,
            }),
        );
        assert!(!spec.is_modified(&vxlan.clone().with_mtu(1450), &vxlan.clone().with_mtu(9000)));
        assert!(spec.is_modified(
            &InterfaceConfig::loopback("l").with_mtu(1500),
            &InterfaceConfig::loopback("l").with_mtu(9000)
        ));
    }

    #[test]
    fn test_in_place_rules() {
        let spec = spec(false);
        let a = memif("/run/a.sock");
        let mut b = memif("/run/a.sock");
        assert!(spec.can_modify_in_place(&a, &b.clone().with_enabled(true)));
        if let InterfaceLink::Memif(link) = &mut b.link {
            link.rx_queues = 4;
        }
        assert!(!spec.can_modify_in_place(&a, &b));
        assert!(!spec.can_modify_in_place(&InterfaceConfig::loopback("x"), &InterfaceConfig::ethernet("x")));
        assert!(spec.can_modify_in_place(
            &InterfaceConfig::loopback("x"),
            &InterfaceConfig::loopback("x").with_vrf(3)
        ));
    }

    #[test]
    fn test_correlate() {
        let spec = spec(false);
        let mac = "02:aa:bb:cc:dd:06".parse().unwrap();
        let tap = |name: &str| {
            InterfaceConfig::new(
                name,
                InterfaceLink::Tap(TapLink {
                    host_if_name: "tap-host".to_string(),
                    ..Default::default()
                }),
            )
        };

        let on_device = dumped(6, tap("").with_phys_address(mac).with_ip(ip("10.1.1.1/24")));
        assert_eq!(spec.correlate(&on_device, &tap("tap1").with_phys_address(mac)), Some(Match::Primary));
        assert_eq!(
            spec.correlate(&on_device, &tap("tap1").with_ip(ip("10.1.1.1/24"))),
            Some(Match::Secondary)
        );
        assert_eq!(spec.correlate(&on_device, &tap("tap1")), None);
        assert_eq!(
            spec.correlate(&on_device, &InterfaceConfig::loopback("loop1").with_phys_address(mac)),
            None
        );

        let local0 = dumped(0, InterfaceConfig::loopback(""));
        assert_eq!(spec.correlate(&local0, &InterfaceConfig::loopback("loop1")), None);
        assert!(spec.is_builtin(&local0));
        assert_eq!(spec.builtin_name(&local0), Some(LOCAL0.to_string()));
    }

    #[test]
    fn test_physical_ports_are_device_owned() {
        let spec = spec(false);
        let mac = "02:00:00:00:00:01".parse().unwrap();
        let port = InterfaceConfig::ethernet("GigabitEthernet0/8/0")
            .with_phys_address(mac)
            .with_enabled(true)
            .with_mtu(9000)
            .with_ip(ip("10.0.0.1/24"));

        let reset = spec.fixed_default(&port).unwrap();
        assert_eq!(
            reset,
            InterfaceConfig::ethernet("GigabitEthernet0/8/0").with_phys_address(mac)
        );
        assert!(spec.is_modified(&port, &reset));
        assert_eq!(spec.fixed_default(&InterfaceConfig::loopback("loop1")), None);

        let dumped_port = dumped(1, port);
        assert!(spec.is_builtin(&dumped_port));
        assert_eq!(
            spec.builtin_name(&dumped_port),
            Some("GigabitEthernet0/8/0".to_string())
        );
        assert_eq!(spec.builtin_name(&dumped(2, InterfaceConfig::ethernet(""))), None);
    }

    #[test]
    fn test_factory_default() {
        let spec = spec(false);
        assert!(spec.is_factory_default(&[]));
        assert!(spec.is_factory_default(&[dumped(0, InterfaceConfig::loopback(""))]));
        assert!(!spec.is_factory_default(&[
            dumped(0, InterfaceConfig::loopback("")),
            dumped(1, InterfaceConfig::loopback("loop1")),
        ]));
        assert!(spec.is_factory_default(&[
            dumped(0, InterfaceConfig::loopback("")),
            dumped(1, InterfaceConfig::ethernet("")),
        ]));
        assert!(!spec.is_factory_default(&[dumped(
            1,
            InterfaceConfig::ethernet("").with_ip("10.0.0.1/24".parse().unwrap())
        )]));
    }
}
