//! Hardware address type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// Parsing accepts `:` or `-` separators and either letter case, so two
/// spellings of the same address compare equal.
///
/// ```
/// use dpagent_types::MacAddress;
///
/// let a: MacAddress = "AA:BB:CC:00:11:22".parse().unwrap();
/// let b: MacAddress = "aa-bb-cc-00-11-22".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "aa:bb:cc:00:11:22");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// All-zero address, reported by devices for interfaces without L2.
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    /// Group bit set in the first octet.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMacAddress(s.to_string());
        let sep = if s.contains('-') { '-' } else { ':' };

        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(sep) {
            if count == 6 || part.len() != 2 {
                return Err(invalid());
            }
            octets[count] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
            count += 1;
        }
        if count != 6 {
            return Err(invalid());
        }
        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_is_case_insensitive() {
        let upper: MacAddress = "02:FE:AB:00:00:01".parse().unwrap();
        let lower: MacAddress = "02:fe:ab:00:00:01".parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.octets(), [0x02, 0xfe, 0xab, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("02:fe:ab:00:00".parse::<MacAddress>().is_err());
        assert!("02:fe:ab:00:00:01:02".parse::<MacAddress>().is_err());
        assert!("02:fe:ab:00:00:zz".parse::<MacAddress>().is_err());
        assert!("2:fe:ab:00:00:01".parse::<MacAddress>().is_err());
        assert!("".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(MacAddress::ZERO.is_zero());
        let mcast: MacAddress = "01:00:5e:00:00:fb".parse().unwrap();
        assert!(mcast.is_multicast());
        let ucast: MacAddress = "02:00:00:00:00:01".parse().unwrap();
        assert!(!ucast.is_multicast());
    }

    #[test]
    fn test_serde_as_string() {
        let mac: MacAddress = "02:00:00:aa:bb:cc".parse().unwrap();
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"02:00:00:aa:bb:cc\"");
        let back: MacAddress = serde_json::from_str("\"02-00-00-AA-BB-CC\"").unwrap();
        assert_eq!(back, mac);
    }
}
