//! Interface address type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IP address together with the prefix length it is configured with.
///
/// `10.0.0.1/24` keeps the host bits: two networks are equal only when both
/// the address bytes and the prefix length match. A bare address parses as a
/// host network (`/32` or `/128`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpNetwork {
    addr: IpAddr,
    prefix_len: u8,
}

impl IpNetwork {
    /// Creates a network, rejecting prefix lengths longer than the family allows.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > max_prefix_len(&addr) {
            return Err(ParseError::InvalidPrefixLength {
                addr: addr.to_string(),
                len: prefix_len.to_string(),
            });
        }
        Ok(IpNetwork { addr, prefix_len })
    }

    /// Host network for `addr`.
    pub fn host(addr: IpAddr) -> Self {
        IpNetwork {
            addr,
            prefix_len: max_prefix_len(&addr),
        }
    }

    pub const fn addr(&self) -> IpAddr {
        self.addr
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub const fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    /// IPv6 link-local (`fe80::/10`). These are assigned by the device on its
    /// own and never appear in desired state.
    pub fn is_link_local(&self) -> bool {
        match self.addr {
            IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
            IpAddr::V4(_) => false,
        }
    }

    pub fn is_multicast(&self) -> bool {
        self.addr.is_multicast()
    }

    /// True when both carry byte-identical addresses, whatever the masks.
    pub fn same_host(&self, other: &IpNetwork) -> bool {
        self.addr == other.addr
    }

    /// True when `addr` equals this network's address.
    pub fn has_addr(&self, addr: &IpAddr) -> bool {
        &self.addr == addr
    }
}

fn max_prefix_len(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for IpNetwork {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, len_part) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };

        let addr = if addr_part.contains(':') {
            addr_part.parse::<Ipv6Addr>().map(IpAddr::V6)
        } else {
            addr_part.parse::<Ipv4Addr>().map(IpAddr::V4)
        }
        .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))?;

        match len_part {
            None => Ok(IpNetwork::host(addr)),
            Some(len) => {
                let prefix_len = len.parse::<u8>().map_err(|_| ParseError::InvalidPrefixLength {
                    addr: addr.to_string(),
                    len: len.to_string(),
                })?;
                IpNetwork::new(addr, prefix_len)
            }
        }
    }
}

impl From<IpAddr> for IpNetwork {
    fn from(addr: IpAddr) -> Self {
        IpNetwork::host(addr)
    }
}

impl TryFrom<String> for IpNetwork {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpNetwork> for String {
    fn from(net: IpNetwork) -> Self {
        net.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_keeps_host_bits() {
        let net: IpNetwork = "192.168.1.10/24".parse().unwrap();
        assert_eq!(net.addr(), "192.168.1.10".parse::<IpAddr>().unwrap());
        assert_eq!(net.prefix_len(), 24);
        assert_eq!(net.to_string(), "192.168.1.10/24");
    }

    #[test]
    fn test_bare_address_is_host() {
        let v4: IpNetwork = "10.1.1.1".parse().unwrap();
        assert_eq!(v4.prefix_len(), 32);
        let v6: IpNetwork = "2001:db8::1".parse().unwrap();
        assert_eq!(v6.prefix_len(), 128);
    }

    #[test]
    fn test_invalid_input() {
        assert!("10.0.0.1/33".parse::<IpNetwork>().is_err());
        assert!("2001:db8::1/129".parse::<IpNetwork>().is_err());
        assert!("10.0.0/24".parse::<IpNetwork>().is_err());
        assert!("10.0.0.1/x".parse::<IpNetwork>().is_err());
    }

    #[test]
    fn test_link_local_and_multicast() {
        let ll: IpNetwork = "fe80::1ff:fe23:4567:890a/64".parse().unwrap();
        assert!(ll.is_link_local());
        let global: IpNetwork = "2001:db8::1/64".parse().unwrap();
        assert!(!global.is_link_local());

        let mcast: IpNetwork = "239.0.0.1/32".parse().unwrap();
        assert!(mcast.is_multicast());
        assert!(!global.is_multicast());
    }

    #[test]
    fn test_equality_includes_mask() {
        let a: IpNetwork = "10.0.0.1/24".parse().unwrap();
        let b: IpNetwork = "10.0.0.1/16".parse().unwrap();
        assert_ne!(a, b);
        assert!(a.same_host(&b));
    }
}
