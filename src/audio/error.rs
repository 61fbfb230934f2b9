//! Errors surfaced by volume operations

use super::hardware::{DeviceId, OsStatus};

/// Errors that can occur while reading or changing output volume
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    #[error("no output device available")]
    DeviceUnavailable,

    #[error("failed to get {op} (status: {status})")]
    QueryFailed { op: &'static str, status: OsStatus },

    #[error("failed to set {op} (status: {status})")]
    WriteFailed { op: &'static str, status: OsStatus },

    #[error("volume is not settable on device {0}")]
    NotSettable(DeviceId),

    #[error("no saved volume state available")]
    NoSavedState,
}

impl VolumeError {
    /// Stable code reported to IPC clients
    pub fn code(&self) -> &'static str {
        match self {
            VolumeError::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            VolumeError::QueryFailed { .. } => "QUERY_FAILED",
            VolumeError::WriteFailed { .. } => "WRITE_FAILED",
            VolumeError::NotSettable(_) => "NOT_SETTABLE",
            VolumeError::NoSavedState => "NO_SAVED_STATE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_carries_operation_and_status() {
        let err = VolumeError::WriteFailed { op: "volume", status: -50 };
        assert_eq!(err.to_string(), "failed to set volume (status: -50)");
        assert_eq!(err.code(), "WRITE_FAILED");
    }
}
