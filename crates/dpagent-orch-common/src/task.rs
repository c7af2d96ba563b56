//! Per-object outcome and error taxonomy.

use dpagent_device::DeviceError;
use serde::Serialize;
use thiserror::Error;

use crate::registry::RegistryError;

/// Status of one configuration request, as reported northbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Realized on the device
    Configured,
    /// Valid, waiting on a dependency
    Pending,
    /// Nothing to do
    Unchanged,
    /// Removed from the device or from the pending cache
    Removed,
    /// Payload failed validation
    InvalidEntry,
    /// Device refused the request
    Rejected,
    /// Device could not be reached
    Unreachable,
}

impl TaskStatus {
    /// Returns true for outcomes the northbound layer reports as configured.
    ///
    /// A pending object counts as configured: it realizes on its own once
    /// its dependency appears.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TaskStatus::Configured | TaskStatus::Pending | TaskStatus::Unchanged | TaskStatus::Removed
        )
    }

    /// Returns true if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::Rejected | TaskStatus::Unreachable)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

/// Error raised while configuring one resource.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Structurally invalid payload; nothing was touched
    #[error("invalid {kind} '{name}': {reason}")]
    Validation {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// Create for a name that is already realized
    #[error("{kind} '{name}' is already configured")]
    AlreadyConfigured { kind: &'static str, name: String },

    /// Device refused a valid request
    #[error("{kind} '{name}': {source}")]
    DeviceRejected {
        kind: &'static str,
        name: String,
        #[source]
        source: DeviceError,
    },

    /// Device-owned instance missing from the device; it cannot be added
    #[error("{kind} '{name}' is not present on the device and cannot be added")]
    NotPresent { kind: &'static str, name: String },

    /// Transport failure; aborts the batch
    #[error("{kind}: {source}")]
    DeviceUnreachable {
        kind: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ConfigError {
    pub fn validation(kind: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Validation {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Classifies a device failure as rejected or unreachable.
    pub fn from_device(kind: &'static str, name: impl Into<String>, error: DeviceError) -> Self {
        if error.is_unreachable() {
            ConfigError::DeviceUnreachable { kind, source: error }
        } else {
            ConfigError::DeviceRejected {
                kind,
                name: name.into(),
                source: error,
            }
        }
    }

    /// Returns true if processing of the current batch must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConfigError::DeviceUnreachable { .. })
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            ConfigError::Validation { .. } | ConfigError::AlreadyConfigured { .. } => {
                TaskStatus::InvalidEntry
            }
            ConfigError::DeviceRejected { .. }
            | ConfigError::NotPresent { .. }
            | ConfigError::Registry(_) => TaskStatus::Rejected,
            ConfigError::DeviceUnreachable { .. } => TaskStatus::Unreachable,
        }
    }
}

/// Result type for configurator operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
