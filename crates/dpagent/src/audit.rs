//! Audit trail of what the agent did to the device.
//!
//! Realized creates, modifies, recreates and deletes, transitions into the
//! pending cache, resync passes and host-interface notifications each
//! produce an [`AuditRecord`]. Records go out through
//! [`audit_log!`](crate::audit_log) on the `audit` tracing target, so an
//! `EnvFilter` directive such as `audit=info` splits them from operational
//! logs.
//!
//! | Outcome | Level |
//! |---------|-------|
//! | Success | info |
//! | InProgress | debug |
//! | Failure | warn |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Resource realized on the device
    ResourceCreate,
    /// Resource modified in place or recreated
    ResourceModify,
    /// Resource removed from the device
    ResourceDelete,
    /// Resource parked until a dependency appears
    DependencyPending,
    Resync,
    /// Orch registration and shutdown
    SystemLifecycle,
    HostInterface,
    ErrorCondition,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::ResourceCreate => "RESOURCE_CREATE",
            AuditCategory::ResourceModify => "RESOURCE_MODIFY",
            AuditCategory::ResourceDelete => "RESOURCE_DELETE",
            AuditCategory::DependencyPending => "DEPENDENCY_PENDING",
            AuditCategory::Resync => "RESYNC",
            AuditCategory::SystemLifecycle => "SYSTEM_LIFECYCLE",
            AuditCategory::HostInterface => "HOST_INTERFACE",
            AuditCategory::ErrorCondition => "ERROR_CONDITION",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    /// Waiting on a dependency, or a pass that has only started
    InProgress,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
            AuditOutcome::InProgress => "in_progress",
        })
    }
}

/// One audited action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Kind name, or `Agent` for agent-wide actions
    pub source: String,
    /// `create`, `modify`, `delete`, `resolve`, `resync_start`, ...
    pub action: String,
    pub outcome: AuditOutcome,
    /// Object name, e.g. `loop1`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Record stamped now; the outcome stays `InProgress` until set.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Also marks the record as failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }

    /// Logs the record on the `audit` target at its outcome's level.
    pub fn emit(&self) {
        let object = self.object_id.as_deref().unwrap_or("-");
        match self.outcome {
            AuditOutcome::Success => info!(
                target: "audit",
                category = self.category.as_str(),
                source = %self.source,
                audit_json = %self.to_json(),
                "AUDIT: {} {} {}",
                self.category,
                self.action,
                object
            ),
            AuditOutcome::InProgress => debug!(
                target: "audit",
                category = self.category.as_str(),
                source = %self.source,
                audit_json = %self.to_json(),
                "AUDIT: {} {} {}",
                self.category,
                self.action,
                object
            ),
            AuditOutcome::Failure => warn!(
                target: "audit",
                category = self.category.as_str(),
                source = %self.source,
                error = self.error.as_deref().unwrap_or(""),
                audit_json = %self.to_json(),
                "AUDIT: {} {} {}",
                self.category,
                self.action,
                object
            ),
        }
    }
}

/// Emits an [`AuditRecord`].
///
/// ```ignore
/// audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, "interface", "create")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id("loop1"));
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        $crate::audit::AuditRecord::emit(&$record)
    };
}

/// Installs the global tracing subscriber, JSON or pretty.
///
/// `RUST_LOG` takes precedence over `log_level`. Records logged through the
/// `log` facade by the engine crates are captured as well.
pub fn init_logging(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_thread_ids(true).json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.pretty())
            .init();
    }
}
