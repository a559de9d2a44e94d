// ABOUTME: HTTP client for a router admin API exposing per-environment weights.
// ABOUTME: PUT sets {"blue":b,"green":g}; GET on the same path reads it back.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Method, StatusCode};

use crate::http;
use crate::types::{EnvironmentName, TrafficSplit};

use super::{TrafficError, TrafficSplitter};

#[derive(Debug, Clone)]
pub struct HttpTrafficSplitter {
    admin_url: String,
}

impl HttpTrafficSplitter {
    pub fn new(admin_url: impl Into<String>) -> Self {
        let admin_url = admin_url.into();
        Self {
            admin_url: admin_url.trim_end_matches('/').to_string(),
        }
    }

    fn weights_url(&self, environment: &EnvironmentName) -> String {
        format!(
            "{}/environments/{}/weights",
            self.admin_url,
            urlencoding::encode(environment.as_str())
        )
    }
}

#[async_trait]
impl TrafficSplitter for HttpTrafficSplitter {
    async fn set_weights(
        &self,
        environment: &EnvironmentName,
        split: TrafficSplit,
    ) -> Result<(), TrafficError> {
        let body = serde_json::to_vec(&split)
            .map_err(|e| TrafficError::InvalidResponse(e.to_string()))?;
        let response = http::send(
            Method::PUT,
            &self.weights_url(environment),
            Some(Bytes::from(body)),
        )
        .await
        .map_err(|e| TrafficError::Transport(e.to_string()))?;

        if !response.status.is_success() {
            return Err(TrafficError::Rejected {
                status: response.status.as_u16(),
                message: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        tracing::debug!(%environment, %split, "weights applied");
        Ok(())
    }

    async fn current_weights(
        &self,
        environment: &EnvironmentName,
    ) -> Result<Option<TrafficSplit>, TrafficError> {
        let response = http::send(Method::GET, &self.weights_url(environment), None)
            .await
            .map_err(|e| TrafficError::Transport(e.to_string()))?;

        match response.status {
            StatusCode::NOT_FOUND | StatusCode::NOT_IMPLEMENTED => Ok(None),
            status if status.is_success() => serde_json::from_slice(&response.body)
                .map(Some)
                .map_err(|e| TrafficError::InvalidResponse(e.to_string())),
            status => Err(TrafficError::Rejected {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_url_trims_trailing_slash() {
        let splitter = HttpTrafficSplitter::new("http://router:9000/");
        let env = EnvironmentName::new("prod").unwrap();
        assert_eq!(
            splitter.weights_url(&env),
            "http://router:9000/environments/prod/weights"
        );
    }
}
