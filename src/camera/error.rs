use thiserror::Error;

use crate::camera::types::{Eye, SessionState};

/// Camera subsystem errors.
#[derive(Debug, Clone, Error)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device already claimed: {0}")]
    DeviceClaimed(String),

    #[error("control channel failed: {0}")]
    Connection(String),

    #[error("invalid capture configuration: {0}")]
    Configuration(String),

    #[error("{eye} camera is not calibrated")]
    NotCalibrated { eye: Eye },

    #[error("'{operation}' is not allowed while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("driver error: {0}")]
    Sdk(String),

    #[error("no stereo driver available: {0}")]
    DriverUnavailable(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CameraError>;
