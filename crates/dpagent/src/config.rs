//! Agent configuration file.
//!
//! Loaded from TOML. Every field has a default, so a missing file or a
//! partial file is valid. Default location: /etc/dpagent/dpagent.toml

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigFileError;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dpagent/dpagent.toml";

/// How the startup resync treats a device that already has state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResyncStrategy {
    /// Dump, correlate and converge every kind
    #[default]
    Full,
    /// Like `full`, but a factory-default device skips cleanup
    OptimizeColdStart,
    /// No resync; the registries start empty
    Skip,
}

impl fmt::Display for ResyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncStrategy::Full => write!(f, "full"),
            ResyncStrategy::OptimizeColdStart => write!(f, "optimize-cold-start"),
            ResyncStrategy::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for ResyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "optimize-cold-start" | "optimize_cold_start" => Ok(Self::OptimizeColdStart),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("Unknown resync strategy: {}", s)),
        }
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSection {
    /// Startup resync strategy
    #[serde(default)]
    pub resync_strategy: ResyncStrategy,

    /// Timeout applied to every device call, in milliseconds (0 = none)
    #[serde(default = "default_device_timeout")]
    pub device_timeout_ms: u64,

    /// Upper bound on dependency-resolution rounds after one operation
    #[serde(default = "default_max_resolution_rounds")]
    pub max_resolution_rounds: usize,

    /// Make af-packet interfaces wait for their host interface
    #[serde(default = "default_track_host_interfaces")]
    pub track_host_interfaces: bool,
}

/// Simulated device contents at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Put the built-in `local0` interface at handle 0
    #[serde(default = "default_preinstall_local0")]
    pub preinstall_local0: bool,

    /// Physical ports present on the device, untagged
    #[serde(default)]
    pub ethernet_ports: Vec<String>,
}

/// Complete agent configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub simulation: SimulationSection,
}

fn default_device_timeout() -> u64 {
    5000
}

fn default_max_resolution_rounds() -> usize {
    64
}

fn default_track_host_interfaces() -> bool {
    false
}

fn default_preinstall_local0() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            resync_strategy: ResyncStrategy::default(),
            device_timeout_ms: default_device_timeout(),
            max_resolution_rounds: default_max_resolution_rounds(),
            track_host_interfaces: default_track_host_interfaces(),
        }
    }
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            preinstall_local0: default_preinstall_local0(),
            ethernet_ports: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Loads configuration from file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigFileError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigFileError::Io(e)),
        }
    }

    /// Loads from the default location or defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigFileError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigFileError::Invalid(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Per-call device timeout, `None` when disabled.
    pub fn device_timeout(&self) -> Option<Duration> {
        match self.agent.device_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigFileError> {
        if self.agent.max_resolution_rounds == 0 {
            return Err(ConfigFileError::Invalid(
                "max_resolution_rounds must be > 0".to_string(),
            ));
        }

        if self.agent.device_timeout_ms > 600_000 {
            return Err(ConfigFileError::Invalid(
                "device_timeout_ms must be at most 600000".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for port in &self.simulation.ethernet_ports {
            if port.is_empty() {
                return Err(ConfigFileError::Invalid(
                    "ethernet_ports entries must not be empty".to_string(),
                ));
            }
            if port == "local0" || !seen.insert(port.as_str()) {
                return Err(ConfigFileError::Invalid(format!(
                    "duplicate ethernet port {}",
                    port
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.agent.resync_strategy, ResyncStrategy::Full);
        assert_eq!(config.agent.device_timeout_ms, 5000);
        assert_eq!(config.agent.max_resolution_rounds, 64);
        assert!(!config.agent.track_host_interfaces);
        assert!(config.simulation.preinstall_local0);
        assert!(config.simulation.ethernet_ports.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_rounds() {
        let mut config = AgentConfig::default();
        config.agent.max_resolution_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_port() {
        let mut config = AgentConfig::default();
        config.simulation.ethernet_ports = vec!["eth0".to_string(), "eth0".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_timeout() {
        let mut config = AgentConfig::default();
        assert_eq!(config.device_timeout(), Some(Duration::from_millis(5000)));
        config.agent.device_timeout_ms = 0;
        assert_eq!(config.device_timeout(), None);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "optimize-cold-start".parse::<ResyncStrategy>().unwrap(),
            ResyncStrategy::OptimizeColdStart
        );
        assert_eq!("SKIP".parse::<ResyncStrategy>().unwrap(), ResyncStrategy::Skip);
        assert!("warm".parse::<ResyncStrategy>().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[agent]
resync_strategy = "optimize-cold-start"
max_resolution_rounds = 8

[simulation]
ethernet_ports = ["GigabitEthernet0/8/0"]
"#;
        let config: AgentConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent.resync_strategy, ResyncStrategy::OptimizeColdStart);
        assert_eq!(config.agent.max_resolution_rounds, 8);
        assert_eq!(config.simulation.ethernet_ports, vec!["GigabitEthernet0/8/0"]);
        // Unspecified values should use defaults
        assert_eq!(config.agent.device_timeout_ms, 5000);
        assert!(config.simulation.preinstall_local0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dpagent.toml");

        let mut config = AgentConfig::default();
        config.agent.track_host_interfaces = true;
        config.simulation.ethernet_ports = vec!["eth0".to_string()];
        config.save(&path).unwrap();

        let loaded = AgentConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[agent\nresync_strategy = 3").unwrap();

        let err = AgentConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, ConfigFileError::Parse { .. }));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = AgentConfig::load_or_default("/nonexistent/dpagent.toml").unwrap();
        assert_eq!(config, AgentConfig::default());
    }
}
