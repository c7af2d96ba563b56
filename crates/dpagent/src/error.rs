//! Agent-level errors.

use dpagent_orch_common::{ConfigError, RegistryError};
use thiserror::Error;

use crate::resource::ResourceKind;

/// Errors that stop an agent operation as a whole.
///
/// Per-object failures (validation, device rejection) are reported in
/// [`ObjectOutcome`](crate::daemon::ObjectOutcome)s instead.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// The device stopped answering; the registries need a resync.
    #[error("aborted: {0}")]
    Aborted(ConfigError),

    #[error("resource kind {0} is not enabled in this build")]
    KindDisabled(ResourceKind),

    #[error("host interface registry: {0}")]
    HostInterface(#[from] RegistryError),
}

impl From<ConfigError> for AgentError {
    fn from(err: ConfigError) -> Self {
        AgentError::Aborted(err)
    }
}

impl AgentError {
    /// True if the device is unreachable or the operation was cancelled.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Aborted(err) if err.is_fatal())
    }
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
