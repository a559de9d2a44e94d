// ABOUTME: Application-wide error types for switchyard.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::{DeployError, DeploymentStatus};
use crate::types::{DeploymentId, EnvironmentName, TrafficSplitError};
use crate::workload::ConnectError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no recorded deployment for environment {0}")]
    NoRecord(EnvironmentName),

    #[error(
        "deployment {id} in {environment} was interrupted; run `switchyard recover --environment {environment}` first"
    )]
    Interrupted {
        id: DeploymentId,
        environment: EnvironmentName,
    },

    #[error("rollback of deployment {0} was refused")]
    RollbackRefused(DeploymentId),

    #[error("traffic switch for deployment {0} was refused")]
    SwitchRefused(DeploymentId),

    #[error(transparent)]
    Split(#[from] TrafficSplitError),

    #[error("deployment {id} ended with status {status}")]
    Unsuccessful {
        id: DeploymentId,
        status: DeploymentStatus,
    },

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Workload(#[from] ConnectError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
