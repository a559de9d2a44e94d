// ABOUTME: Workload controller seam: scaling, image updates and rollouts per color.
// ABOUTME: DockerWorkload drives a local Docker or Podman socket through bollard.

mod detection;
mod docker;
mod error;

pub use detection::{DetectionError, RuntimeInfo, RuntimeType, detect};
pub use docker::{DockerWorkload, WorkloadSettings};
pub use error::{ConnectError, ConnectErrorKind, WorkloadError};

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{Color, EnvironmentName, ImageRef};

/// Compute backend hosting the blue and green workloads of each environment.
#[async_trait]
pub trait WorkloadController: Send + Sync {
    /// Verify the environment's resources exist and the backend is reachable.
    async fn check_environment(&self, environment: &EnvironmentName) -> Result<(), WorkloadError>;

    async fn scale_to(
        &self,
        environment: &EnvironmentName,
        color: Color,
        replicas: u32,
    ) -> Result<(), WorkloadError>;

    async fn set_image(
        &self,
        environment: &EnvironmentName,
        color: Color,
        image: &ImageRef,
    ) -> Result<(), WorkloadError>;

    async fn trigger_rollout(
        &self,
        environment: &EnvironmentName,
        color: Color,
    ) -> Result<(), WorkloadError>;

    /// Block until the color's rollout has converged or `timeout` elapses.
    async fn wait_for_rollout(
        &self,
        environment: &EnvironmentName,
        color: Color,
        timeout: Duration,
    ) -> Result<(), WorkloadError>;
}
