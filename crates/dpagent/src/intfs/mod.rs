//! Interfaces - loopback, physical, memif, tap, VxLAN and af-packet.
//!
//! Interfaces are the root of the dependency graph: BFD sessions, the BFD
//! echo function and STN rules all reference an interface by name, and
//! interfaces can reference each other:
//!
//! ```text
//! host_interface ──> af_packet
//! interface (multicast IP) ──> vxlan
//! interface (any IP) ──> unnumbered interface
//! interface (session source IP) ──> bfd_session
//! ```
//!
//! The device keeps the logical name as a tag on each interface, so resync
//! can correlate by tag; untagged interfaces are matched on MAC address,
//! then on their IP address list.

mod orch;
mod types;

pub use orch::{HostInterfaceRegistry, InterfaceRegistry, InterfaceSpec};
pub use types::{
    AfPacketLink, InterfaceConfig, InterfaceLink, InterfaceMeta, InterfaceResolved, InterfaceType,
    MemifLink, MemifMode, RxMode, TapLink, Unnumbered, VxlanLink, DEFAULT_MEMIF_SOCKET, LOCAL0,
    VXLAN_VNI_MAX,
};
