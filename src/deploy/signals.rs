// ABOUTME: Validation signals consulted after the ramp reaches full traffic.
// ABOUTME: Error-rate and latency verdicts come from an external backend; the default reports healthy.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Color, EnvironmentName};

#[derive(Debug, Error)]
#[error("validation signal backend unavailable: {0}")]
pub struct SignalsError(pub String);

/// A signal that reported the color unhealthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailingSignal {
    pub name: String,
    pub detail: String,
}

impl std::fmt::Display for FailingSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.detail)
    }
}

#[async_trait]
pub trait ValidationSignals: Send + Sync {
    /// Signals currently failing for `color`; empty when healthy.
    async fn evaluate(
        &self,
        environment: &EnvironmentName,
        color: Color,
    ) -> Result<Vec<FailingSignal>, SignalsError>;
}

/// Reports every color healthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeHealthy;

#[async_trait]
impl ValidationSignals for AssumeHealthy {
    async fn evaluate(
        &self,
        _environment: &EnvironmentName,
        _color: Color,
    ) -> Result<Vec<FailingSignal>, SignalsError> {
        Ok(Vec::new())
    }
}
