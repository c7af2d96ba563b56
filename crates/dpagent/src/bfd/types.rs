//! BFD types and data structures.

use std::fmt;
use std::net::IpAddr;

use dpagent_device::{BfdAuthKeyHandle, InterfaceHandle};
use dpagent_types::IpNetwork;
use serde::{Deserialize, Serialize};

/// Default BFD TX interval in microseconds.
pub const BFD_DEFAULT_TX_INTERVAL: u32 = 1_000_000;

/// Default BFD RX interval in microseconds.
pub const BFD_DEFAULT_RX_INTERVAL: u32 = 1_000_000;

/// Default BFD detect multiplier.
pub const BFD_DEFAULT_DETECT_MULTIPLIER: u8 = 3;

/// Longest authentication secret accepted by the device.
pub const BFD_AUTH_SECRET_MAX: usize = 20;

fn default_tx_interval() -> u32 {
    BFD_DEFAULT_TX_INTERVAL
}

fn default_rx_interval() -> u32 {
    BFD_DEFAULT_RX_INTERVAL
}

fn default_detect_multiplier() -> u8 {
    BFD_DEFAULT_DETECT_MULTIPLIER
}

fn default_enabled() -> bool {
    true
}

/// Authentication used by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfdAuthentication {
    pub key_id: u32,
    pub advertised_key_id: u8,
}

/// Single-hop BFD session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfdSessionConfig {
    pub name: String,
    pub interface: String,
    /// Must be one of the interface's addresses; a prefix length is
    /// accepted and ignored
    pub source_address: IpNetwork,
    pub destination_address: IpNetwork,
    #[serde(default = "default_tx_interval")]
    pub desired_min_tx_interval: u32,
    #[serde(default = "default_rx_interval")]
    pub required_min_rx_interval: u32,
    #[serde(default = "default_detect_multiplier")]
    pub detect_multiplier: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<BfdAuthentication>,
}

impl BfdSessionConfig {
    pub fn new(
        name: impl Into<String>,
        interface: impl Into<String>,
        source_address: IpAddr,
        destination_address: IpAddr,
    ) -> Self {
        Self {
            name: name.into(),
            interface: interface.into(),
            source_address: IpNetwork::host(source_address),
            destination_address: IpNetwork::host(destination_address),
            desired_min_tx_interval: BFD_DEFAULT_TX_INTERVAL,
            required_min_rx_interval: BFD_DEFAULT_RX_INTERVAL,
            detect_multiplier: BFD_DEFAULT_DETECT_MULTIPLIER,
            enabled: true,
            authentication: None,
        }
    }

    pub fn with_authentication(mut self, key_id: u32, advertised_key_id: u8) -> Self {
        self.authentication = Some(BfdAuthentication {
            key_id,
            advertised_key_id,
        });
        self
    }

    pub fn with_timers(mut self, tx: u32, rx: u32, multiplier: u8) -> Self {
        self.desired_min_tx_interval = tx;
        self.required_min_rx_interval = rx;
        self.detect_multiplier = multiplier;
        self
    }

    pub fn source(&self) -> IpAddr {
        self.source_address.addr()
    }

    pub fn destination(&self) -> IpAddr {
        self.destination_address.addr()
    }

    /// Interface, source and destination: what identifies a session on
    /// the device.
    pub fn same_endpoints(&self, other: &BfdSessionConfig) -> bool {
        self.interface == other.interface
            && self.source() == other.source()
            && self.destination() == other.destination()
    }
}

/// Registry metadata for a realized session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BfdSessionMeta {
    pub interface: String,
    pub source_address: IpAddr,
    pub destination_address: IpAddr,
}

/// Handles a session add needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BfdSessionResolved {
    pub interface: InterfaceHandle,
    pub auth_key: Option<BfdAuthKeyHandle>,
}

/// BFD authentication type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BfdAuthType {
    KeyedSha1,
    MeticulousKeyedSha1,
}

impl fmt::Display for BfdAuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BfdAuthType::KeyedSha1 => write!(f, "keyed_sha1"),
            BfdAuthType::MeticulousKeyedSha1 => write!(f, "meticulous_keyed_sha1"),
        }
    }
}

/// BFD authentication key. Registered under its decimal id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfdAuthKeyConfig {
    pub id: u32,
    pub auth_type: BfdAuthType,
    pub secret: String,
}

impl BfdAuthKeyConfig {
    pub fn new(id: u32, auth_type: BfdAuthType, secret: impl Into<String>) -> Self {
        Self {
            id,
            auth_type,
            secret: secret.into(),
        }
    }
}

// Keep the secret out of logs.
impl fmt::Debug for BfdAuthKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BfdAuthKeyConfig")
            .field("id", &self.id)
            .field("auth_type", &self.auth_type)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BfdAuthKeyMeta {
    pub auth_type: BfdAuthType,
}

/// BFD echo function. At most one may be configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfdEchoConfig {
    pub name: String,
    pub echo_source_interface: String,
}

impl BfdEchoConfig {
    pub fn new(name: impl Into<String>, echo_source_interface: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            echo_source_interface: echo_source_interface.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BfdEchoMeta {
    pub echo_source_interface: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults_from_json() {
        let session: BfdSessionConfig = serde_json::from_str(
            r#"{
                "name": "s1",
                "interface": "loop1",
                "source_address": "192.168.1.10/24",
                "destination_address": "192.168.1.20"
            }"#,
        )
        .unwrap();
        assert_eq!(session.desired_min_tx_interval, BFD_DEFAULT_TX_INTERVAL);
        assert_eq!(session.detect_multiplier, BFD_DEFAULT_DETECT_MULTIPLIER);
        assert!(session.enabled);
        assert_eq!(session.source(), "192.168.1.10".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_same_endpoints_ignores_mask_and_timers() {
        let a = BfdSessionConfig::new(
            "s1",
            "loop1",
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        );
        let mut b = a.clone().with_timers(500, 500, 5);
        b.name = "other".to_string();
        b.source_address = "10.0.0.1/24".parse().unwrap();
        assert!(a.same_endpoints(&b));

        b.interface = "loop2".to_string();
        assert!(!a.same_endpoints(&b));
    }

    #[test]
    fn test_auth_key_debug_redacts_secret() {
        let key = BfdAuthKeyConfig::new(1, BfdAuthType::KeyedSha1, "hunter2");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_auth_type_serde() {
        let key: BfdAuthKeyConfig = serde_json::from_str(
            r#"{"id": 7, "auth_type": "meticulous_keyed_sha1", "secret": "abc"}"#,
        )
        .unwrap();
        assert_eq!(key.auth_type, BfdAuthType::MeticulousKeyedSha1);
        assert_eq!(key.auth_type.to_string(), "meticulous_keyed_sha1");
    }
}
