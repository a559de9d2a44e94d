// ABOUTME: Workload error types, with the SNAFU connect error for the container runtime.
// ABOUTME: Unifies detection and connection errors for programmatic handling.

use snafu::Snafu;
use std::time::Duration;

use super::detection::DetectionError;

/// Failure of a workload controller operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    #[error("environment {0} is not provisioned")]
    NotProvisioned(String),

    #[error("workload backend unreachable: {0}")]
    Unavailable(String),

    #[error("image {image} could not be pulled: {message}")]
    ImagePull { image: String, message: String },

    #[error("rollout of {target} did not converge within {} seconds", .timeout.as_secs())]
    RolloutTimeout { target: String, timeout: Duration },

    #[error("container {container} failed: {message}")]
    Container { container: String, message: String },

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<bollard::errors::Error> for WorkloadError {
    fn from(err: bollard::errors::Error) -> Self {
        WorkloadError::Runtime(err.to_string())
    }
}

/// Unified error for detecting and connecting to the container runtime.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectError {
    #[snafu(display("runtime detection failed: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("runtime connection failed: {source}"))]
    Connection { source: bollard::errors::Error },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    /// No container runtime found on the system.
    NoRuntimeFound,
    /// Failed to connect to or ping the runtime socket.
    ConnectionFailed,
}

impl ConnectError {
    pub fn kind(&self) -> ConnectErrorKind {
        match self {
            ConnectError::Detection {
                source: DetectionError::NoRuntimeFound,
            } => ConnectErrorKind::NoRuntimeFound,
            ConnectError::Connection { .. } => ConnectErrorKind::ConnectionFailed,
        }
    }
}

impl From<DetectionError> for ConnectError {
    fn from(source: DetectionError) -> Self {
        ConnectError::Detection { source }
    }
}
