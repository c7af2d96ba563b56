//! Network primitives shared by the dataplane agent crates.
//!
//! - [`MacAddress`]: 48-bit hardware address, parsed case-insensitively
//! - [`IpNetwork`]: an address as configured on an interface, with its
//!   prefix length (host bits are kept, unlike a route prefix)

mod ip;
mod mac;

pub use ip::IpNetwork;
pub use mac::MacAddress;

/// Error returned when a textual network primitive cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("invalid prefix length {len} for {addr}")]
    InvalidPrefixLength { addr: String, len: String },
}
