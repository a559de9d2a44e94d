// ABOUTME: HealthProbe: concurrent HTTP checks of a color's endpoints with retry and timeout.
// ABOUTME: The transport sits behind EndpointProber; HttpProber is the hyper-backed implementation.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use hyper::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::HealthConfig;
use crate::http;

use super::model::{HealthCheckResult, HealthCheckSummary, HealthStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("unexpected status {0}")]
    Status(u16),

    #[error("{0}")]
    Transport(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Issues a single GET against a full URL.
#[async_trait]
pub trait EndpointProber: Send + Sync {
    /// `Ok(())` for a 2xx response.
    async fn probe(&self, url: &str, timeout: Duration) -> Result<(), ProbeError>;
}

/// Plain HTTP/1.1 prober.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProber;

#[async_trait]
impl EndpointProber for HttpProber {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<(), ProbeError> {
        let response = tokio::time::timeout(timeout, http::send(Method::GET, url, None))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        if response.status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(response.status.as_u16()))
        }
    }
}

/// Retry and timeout policy for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub timeout: Duration,
    /// Attempts after the first one.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl From<&HealthConfig> for ProbePolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            timeout: config.timeout,
            retries: config.retries,
            retry_delay: config.retry_delay,
        }
    }
}

/// Outcome of probing every endpoint of one color.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub results: Vec<HealthCheckResult>,
    pub summary: HealthCheckSummary,
}

impl ProbeReport {
    pub fn success_rate(&self) -> f64 {
        self.summary.success_rate
    }
}

#[derive(Clone)]
pub struct HealthProbe {
    prober: Arc<dyn EndpointProber>,
    policy: ProbePolicy,
}

impl std::fmt::Debug for HealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProbe")
            .field("policy", &self.policy)
            .finish()
    }
}

impl HealthProbe {
    pub fn new(prober: Arc<dyn EndpointProber>, policy: ProbePolicy) -> Self {
        Self { prober, policy }
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    /// Probe every endpoint under `base_url` concurrently.
    pub async fn check(
        &self,
        service_name: &str,
        base_url: &str,
        endpoints: &[String],
    ) -> ProbeReport {
        let base = base_url.trim_end_matches('/');
        let results = join_all(
            endpoints
                .iter()
                .map(|endpoint| self.check_endpoint(service_name, base, endpoint)),
        )
        .await;

        let summary = HealthCheckSummary::from_results(&results);
        tracing::debug!(
            service = service_name,
            total = summary.total,
            successful = summary.successful,
            "probe pass finished"
        );
        ProbeReport { results, summary }
    }

    async fn check_endpoint(
        &self,
        service_name: &str,
        base: &str,
        endpoint: &str,
    ) -> HealthCheckResult {
        let url = format!("{base}{endpoint}");
        let attempts = self.policy.retries.saturating_add(1);
        let mut last_error = None;
        let mut elapsed = Duration::ZERO;

        for attempt in 1..=attempts {
            let started = Instant::now();
            let outcome = self.prober.probe(&url, self.policy.timeout).await;
            elapsed = started.elapsed();

            match outcome {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    tracing::debug!(%url, attempt, error = %e, "probe attempt failed");
                    last_error = Some(e.to_string());
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        HealthCheckResult {
            service_name: service_name.to_string(),
            endpoint: endpoint.to_string(),
            status: if last_error.is_none() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error_message: last_error,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Fails each URL a fixed number of times before succeeding.
    struct Flaky {
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<u32>,
    }

    impl Flaky {
        fn new(failures: &[(&str, u32)]) -> Self {
            Self {
                failures: Mutex::new(
                    failures
                        .iter()
                        .map(|(u, n)| (u.to_string(), *n))
                        .collect(),
                ),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl EndpointProber for Flaky {
        async fn probe(&self, url: &str, _timeout: Duration) -> Result<(), ProbeError> {
            *self.calls.lock() += 1;
            let mut failures = self.failures.lock();
            match failures.get_mut(url) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    Err(ProbeError::Status(503))
                }
                _ => Ok(()),
            }
        }
    }

    fn policy(retries: u32) -> ProbePolicy {
        ProbePolicy {
            timeout: Duration::from_millis(50),
            retries,
            retry_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let prober = Arc::new(Flaky::new(&[("http://green/health", 2)]));
        let probe = HealthProbe::new(prober.clone(), policy(3));

        let report = probe
            .check("prod-green", "http://green/", &["/health".to_string()])
            .await;

        assert_eq!(report.summary.successful, 1);
        assert_eq!(report.success_rate(), 1.0);
        assert_eq!(*prober.calls.lock(), 3);
        assert_eq!(report.results[0].service_name, "prod-green");
    }

    #[tokio::test]
    async fn exhausted_retries_record_last_error() {
        let prober = Arc::new(Flaky::new(&[("http://green/ready", 10)]));
        let probe = HealthProbe::new(prober.clone(), policy(2));

        let report = probe
            .check(
                "prod-green",
                "http://green",
                &["/health".to_string(), "/ready".to_string()],
            )
            .await;

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.successful, 1);
        assert_eq!(report.success_rate(), 0.5);
        let ready = &report.results[1];
        assert_eq!(ready.status, HealthStatus::Unhealthy);
        assert_eq!(ready.error_message.as_deref(), Some("unexpected status 503"));
        // one success plus three attempts on the failing endpoint
        assert_eq!(*prober.calls.lock(), 4);
    }

    #[tokio::test]
    async fn no_endpoints_means_zero_rate() {
        let probe = HealthProbe::new(Arc::new(Flaky::new(&[])), policy(0));
        let report = probe.check("prod-green", "http://green", &[]).await;
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.success_rate(), 0.0);
    }
}
