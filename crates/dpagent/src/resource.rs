//! The closed set of resource kinds and the northbound request types.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bfd::{BfdAuthKeyConfig, BfdEchoConfig, BfdSessionConfig};
use crate::error::ConfigFileError;
use crate::intfs::InterfaceConfig;
use crate::stn::StnRuleConfig;

pub const INTERFACE: &str = "interface";
pub const BFD_AUTH_KEY: &str = "bfd_auth_key";
pub const BFD_SESSION: &str = "bfd_session";
pub const BFD_ECHO_FUNCTION: &str = "bfd_echo_function";
pub const STN_RULE: &str = "stn_rule";

/// Externally fed dependency source; not configurable northbound.
pub const HOST_INTERFACE: &str = "host_interface";

/// Configurable resource kinds, in resync order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Interface,
    BfdAuthKey,
    BfdSession,
    BfdEchoFunction,
    StnRule,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Interface,
        ResourceKind::BfdAuthKey,
        ResourceKind::BfdSession,
        ResourceKind::BfdEchoFunction,
        ResourceKind::StnRule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Interface => INTERFACE,
            ResourceKind::BfdAuthKey => BFD_AUTH_KEY,
            ResourceKind::BfdSession => BFD_SESSION,
            ResourceKind::BfdEchoFunction => BFD_ECHO_FUNCTION,
            ResourceKind::StnRule => STN_RULE,
        }
    }

    /// Resync priority; lower runs first.
    pub fn priority(&self) -> i32 {
        match self {
            ResourceKind::Interface => 0,
            ResourceKind::BfdAuthKey => 10,
            ResourceKind::BfdSession | ResourceKind::BfdEchoFunction => 20,
            ResourceKind::StnRule => 30,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown resource kind: {}", s))
    }
}

/// One northbound payload of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceConfig {
    Interface(InterfaceConfig),
    BfdAuthKey(BfdAuthKeyConfig),
    BfdSession(BfdSessionConfig),
    BfdEchoFunction(BfdEchoConfig),
    StnRule(StnRuleConfig),
}

impl ResourceConfig {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceConfig::Interface(_) => ResourceKind::Interface,
            ResourceConfig::BfdAuthKey(_) => ResourceKind::BfdAuthKey,
            ResourceConfig::BfdSession(_) => ResourceKind::BfdSession,
            ResourceConfig::BfdEchoFunction(_) => ResourceKind::BfdEchoFunction,
            ResourceConfig::StnRule(_) => ResourceKind::StnRule,
        }
    }

    /// Registry name of the payload.
    pub fn name(&self) -> String {
        match self {
            ResourceConfig::Interface(c) => c.name.clone(),
            ResourceConfig::BfdAuthKey(c) => c.id.to_string(),
            ResourceConfig::BfdSession(c) => c.name.clone(),
            ResourceConfig::BfdEchoFunction(c) => c.name.clone(),
            ResourceConfig::StnRule(c) => c.name.clone(),
        }
    }
}

/// Conversion between a kind's payload type and [`ResourceConfig`].
pub trait KindConfig: Sized {
    const KIND: ResourceKind;

    fn from_resource(config: ResourceConfig) -> Option<Self>;

    fn into_resource(self) -> ResourceConfig;
}

macro_rules! kind_config {
    ($ty:ty, $variant:ident) => {
        impl KindConfig for $ty {
            const KIND: ResourceKind = ResourceKind::$variant;

            fn from_resource(config: ResourceConfig) -> Option<Self> {
                match config {
                    ResourceConfig::$variant(c) => Some(c),
                    _ => None,
                }
            }

            fn into_resource(self) -> ResourceConfig {
                ResourceConfig::$variant(self)
            }
        }

        impl From<$ty> for ResourceConfig {
            fn from(config: $ty) -> Self {
                config.into_resource()
            }
        }
    };
}

kind_config!(InterfaceConfig, Interface);
kind_config!(BfdAuthKeyConfig, BfdAuthKey);
kind_config!(BfdSessionConfig, BfdSession);
kind_config!(BfdEchoConfig, BfdEchoFunction);
kind_config!(StnRuleConfig, StnRule);

/// Northbound operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Modify,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Modify => write!(f, "modify"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// One northbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub op: Operation,
    pub config: ResourceConfig,
}

impl Request {
    pub fn create(config: impl Into<ResourceConfig>) -> Self {
        Self {
            op: Operation::Create,
            config: config.into(),
        }
    }

    pub fn modify(config: impl Into<ResourceConfig>) -> Self {
        Self {
            op: Operation::Modify,
            config: config.into(),
        }
    }

    pub fn delete(config: impl Into<ResourceConfig>) -> Self {
        Self {
            op: Operation::Delete,
            config: config.into(),
        }
    }
}

/// Full desired state, one list per kind; the resync input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub bfd_auth_keys: Vec<BfdAuthKeyConfig>,
    #[serde(default)]
    pub bfd_sessions: Vec<BfdSessionConfig>,
    #[serde(default)]
    pub bfd_echo_functions: Vec<BfdEchoConfig>,
    #[serde(default)]
    pub stn_rules: Vec<StnRuleConfig>,
}

impl DesiredState {
    /// Reads a JSON document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ConfigFileError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
            + self.bfd_auth_keys.len()
            + self.bfd_sessions.len()
            + self.bfd_echo_functions.len()
            + self.stn_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the document by kind. Every kind is present, possibly with an
    /// empty list, so a resync also clears kinds with no desired objects.
    pub fn into_kinds(self) -> BTreeMap<ResourceKind, Vec<ResourceConfig>> {
        fn wrap<C: KindConfig>(items: Vec<C>) -> Vec<ResourceConfig> {
            items.into_iter().map(KindConfig::into_resource).collect()
        }

        let mut kinds = BTreeMap::new();
        kinds.insert(ResourceKind::Interface, wrap(self.interfaces));
        kinds.insert(ResourceKind::BfdAuthKey, wrap(self.bfd_auth_keys));
        kinds.insert(ResourceKind::BfdSession, wrap(self.bfd_sessions));
        kinds.insert(ResourceKind::BfdEchoFunction, wrap(self.bfd_echo_functions));
        kinds.insert(ResourceKind::StnRule, wrap(self.stn_rules));
        kinds
    }
}
