// ABOUTME: Error types for deployment orchestration.
// ABOUTME: Classifies failures into the taxonomy that drives phase transitions.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::types::{DeploymentId, EnvironmentName};

/// Who holds an environment when a new deployment is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolderInfo {
    pub deployment_id: DeploymentId,
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Errors raised by orchestrator operations and deployment phases.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another deployment is in flight for the environment.
    #[error("environment {environment} already has deployment {} in progress (since {})", .holder.deployment_id, .holder.started_at)]
    Conflict {
        environment: EnvironmentName,
        holder: Box<LockHolderInfo>,
    },

    /// No deployment with this id.
    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),

    /// Malformed request (bad version, percent or environment).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Environment prerequisites are missing or unreachable.
    #[error("prerequisite check failed: {0}")]
    Prerequisite(String),

    /// Image update or rolling update failed.
    #[error("rollout failed: {0}")]
    Rollout(String),

    /// Rolling update did not finish in time.
    #[error("rollout timed out after {} seconds", .0.as_secs())]
    RolloutTimeout(Duration),

    /// Probe success rate below the required threshold.
    #[error("health gate failed: success rate {actual:.2} below threshold {required:.2}")]
    HealthGate { required: f64, actual: f64 },

    /// A validation signal reported the candidate unhealthy.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The traffic splitter rejected or failed a weight change.
    #[error("traffic switch failed: {0}")]
    TrafficPlane(String),

    /// Scaling down the old color failed.
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    /// Traffic could not be reverted to the original color.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// A collaborator call exceeded its deadline.
    #[error("{operation} timed out after {} seconds", .timeout.as_secs())]
    CallTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The orchestrator no longer accepts work.
    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Conflict,
    NotFound,
    InvalidRequest,
    Prerequisite,
    Rollout,
    Gating,
    TrafficPlane,
    Cleanup,
    Rollback,
    Timeout,
    Shutdown,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Conflict { .. } => DeployErrorKind::Conflict,
            DeployError::NotFound(_) => DeployErrorKind::NotFound,
            DeployError::InvalidRequest(_) => DeployErrorKind::InvalidRequest,
            DeployError::Prerequisite(_) => DeployErrorKind::Prerequisite,
            DeployError::Rollout(_) | DeployError::RolloutTimeout(_) => DeployErrorKind::Rollout,
            DeployError::HealthGate { .. } | DeployError::Validation(_) => {
                DeployErrorKind::Gating
            }
            DeployError::TrafficPlane(_) => DeployErrorKind::TrafficPlane,
            DeployError::Cleanup(_) => DeployErrorKind::Cleanup,
            DeployError::RollbackFailed(_) => DeployErrorKind::Rollback,
            DeployError::CallTimeout { .. } => DeployErrorKind::Timeout,
            DeployError::ShuttingDown => DeployErrorKind::Shutdown,
        }
    }

    /// Holder details when this is a conflict error.
    pub fn lock_holder_info(&self) -> Option<&LockHolderInfo> {
        match self {
            DeployError::Conflict { holder, .. } => Some(holder),
            _ => None,
        }
    }

    pub(crate) fn conflict(environment: EnvironmentName, holder: LockHolderInfo) -> Self {
        DeployError::Conflict {
            environment,
            holder: Box::new(holder),
        }
    }
}
