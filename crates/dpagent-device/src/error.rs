//! Device status codes and errors.
//!
//! Control replies carry a numeric return value. [`DeviceStatus`] names the
//! values the agent distinguishes; [`DeviceError`] is what a
//! [`DeviceHandler`](crate::DeviceHandler) returns. The important split is
//! between a request the device *rejected* (the object stays unapplied, the
//! caller decides what to do) and a device that could not be *reached*
//! (the whole batch stops).

use std::fmt;
use thiserror::Error;

/// Return values of the device control API.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Ok = 0,
    Unspecified = -1,
    InvalidHandle = -2,
    NoSuchEntry = -3,
    InvalidValue = -4,
    EntryExists = -5,
    ResourceExhausted = -6,
    InUse = -7,
    Unsupported = -8,
    SyscallFailed = -9,
}

impl DeviceStatus {
    /// Maps a raw return value; unknown values become `Unspecified`.
    pub fn from_raw(retval: i32) -> Self {
        match retval {
            0 => DeviceStatus::Ok,
            -2 => DeviceStatus::InvalidHandle,
            -3 => DeviceStatus::NoSuchEntry,
            -4 => DeviceStatus::InvalidValue,
            -5 => DeviceStatus::EntryExists,
            -6 => DeviceStatus::ResourceExhausted,
            -7 => DeviceStatus::InUse,
            -8 => DeviceStatus::Unsupported,
            -9 => DeviceStatus::SyscallFailed,
            _ => DeviceStatus::Unspecified,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == DeviceStatus::Ok
    }

    /// Converts to a result, naming the operation on failure.
    pub fn into_result(self, operation: &str) -> DeviceResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(DeviceError::rejected(self, operation))
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Ok => "OK",
            DeviceStatus::Unspecified => "UNSPECIFIED",
            DeviceStatus::InvalidHandle => "INVALID_HANDLE",
            DeviceStatus::NoSuchEntry => "NO_SUCH_ENTRY",
            DeviceStatus::InvalidValue => "INVALID_VALUE",
            DeviceStatus::EntryExists => "ENTRY_EXISTS",
            DeviceStatus::ResourceExhausted => "RESOURCE_EXHAUSTED",
            DeviceStatus::InUse => "IN_USE",
            DeviceStatus::Unsupported => "UNSUPPORTED",
            DeviceStatus::SyscallFailed => "SYSCALL_FAILED",
        };
        write!(f, "{} ({})", s, *self as i32)
    }
}

/// Error returned by a device handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device answered and refused the request.
    #[error("{operation} rejected by device: {status}")]
    Rejected {
        status: DeviceStatus,
        operation: String,
    },

    /// The transport to the device failed.
    #[error("device unreachable: {reason}")]
    Unreachable { reason: String },

    /// The caller cancelled the operation.
    #[error("device call cancelled")]
    Cancelled,

    /// The caller's deadline passed before the call completed.
    #[error("device call deadline exceeded")]
    DeadlineExceeded,

    /// The handler has no implementation for this operation.
    #[error("operation not supported by device handler: {operation}")]
    NotSupported { operation: String },
}

impl DeviceError {
    pub fn rejected(status: DeviceStatus, operation: impl Into<String>) -> Self {
        DeviceError::Rejected {
            status,
            operation: operation.into(),
        }
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        DeviceError::Unreachable {
            reason: reason.into(),
        }
    }

    pub fn not_supported(operation: impl Into<String>) -> Self {
        DeviceError::NotSupported {
            operation: operation.into(),
        }
    }

    /// True for transport-level failures, including cancellation and
    /// deadline expiry. These abort the current batch.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            DeviceError::Unreachable { .. } | DeviceError::Cancelled | DeviceError::DeadlineExceeded
        )
    }

    /// Status code for rejected requests.
    pub fn status(&self) -> Option<DeviceStatus> {
        match self {
            DeviceError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeviceError::Rejected { status, .. } => {
                matches!(status, DeviceStatus::ResourceExhausted | DeviceStatus::InUse)
            }
            DeviceError::Unreachable { .. } | DeviceError::DeadlineExceeded => true,
            DeviceError::Cancelled | DeviceError::NotSupported { .. } => false,
        }
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Converts raw control-API return values.
pub trait DeviceStatusExt {
    fn into_device_result(self, operation: &str) -> DeviceResult<()>;
}

impl DeviceStatusExt for i32 {
    fn into_device_result(self, operation: &str) -> DeviceResult<()> {
        DeviceStatus::from_raw(self).into_result(operation)
    }
}
