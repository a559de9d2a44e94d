// ABOUTME: Health gate configuration for candidate environments.
// ABOUTME: Defines HTTP probe endpoints, retry policy and the success threshold.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::time::Duration;

use super::deserialize::deserialize_endpoints;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Paths probed on the candidate's base URL.
    #[serde(
        default = "default_endpoints",
        deserialize_with = "deserialize_endpoints"
    )]
    pub endpoints: NonEmpty<String>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Minimum healthy/total ratio required to advance.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            timeout: default_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_endpoints() -> NonEmpty<String> {
    NonEmpty::new("/health".to_string())
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_success_threshold() -> f64 {
    0.95
}
