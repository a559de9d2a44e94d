// ABOUTME: Traffic splitter seam: applies blue/green weight pairs to the routing layer.
// ABOUTME: HttpTrafficSplitter talks to a router admin endpoint over plain HTTP.

mod http_splitter;

pub use http_splitter::HttpTrafficSplitter;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{EnvironmentName, TrafficSplit};

#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("router rejected weights with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("router unreachable: {0}")]
    Transport(String),

    #[error("unexpected router response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait TrafficSplitter: Send + Sync {
    async fn set_weights(
        &self,
        environment: &EnvironmentName,
        split: TrafficSplit,
    ) -> Result<(), TrafficError>;

    /// Split currently enforced by the routing layer, if it can report one.
    async fn current_weights(
        &self,
        _environment: &EnvironmentName,
    ) -> Result<Option<TrafficSplit>, TrafficError> {
        Ok(None)
    }
}
