// ABOUTME: Deployment record, phases, statuses and the probe/switch history values.
// ABOUTME: Snapshots of these types are what callers read; only a deployment's run task mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::diagnostics::{Diagnostics, Warning};
use crate::types::{Color, DeploymentId, EnvironmentName, ImageRef, TrafficSplit};

/// State of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Preparation,
    Deployment,
    HealthChecks,
    TrafficSwitching,
    Validation,
    FullTraffic,
    Cleanup,
    Completed,
    Rollback,
    RolledBack,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::RolledBack | Phase::Failed)
    }

    /// Status reported while in this phase.
    pub fn status(&self) -> DeploymentStatus {
        match self {
            Phase::Preparation => DeploymentStatus::Preparing,
            Phase::Deployment => DeploymentStatus::Deploying,
            Phase::HealthChecks => DeploymentStatus::HealthChecking,
            Phase::TrafficSwitching => DeploymentStatus::SwitchingTraffic,
            Phase::Validation => DeploymentStatus::Validating,
            Phase::FullTraffic | Phase::Cleanup => DeploymentStatus::Completing,
            Phase::Completed => DeploymentStatus::Completed,
            Phase::Rollback => DeploymentStatus::RollingBack,
            Phase::RolledBack => DeploymentStatus::RolledBack,
            Phase::Failed => DeploymentStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preparation => "PREPARATION",
            Phase::Deployment => "DEPLOYMENT",
            Phase::HealthChecks => "HEALTH_CHECKS",
            Phase::TrafficSwitching => "TRAFFIC_SWITCHING",
            Phase::Validation => "VALIDATION",
            Phase::FullTraffic => "FULL_TRAFFIC",
            Phase::Cleanup => "CLEANUP",
            Phase::Completed => "COMPLETED",
            Phase::Rollback => "ROLLBACK",
            Phase::RolledBack => "ROLLED_BACK",
            Phase::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally reported mirror of [`Phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Starting,
    Preparing,
    Deploying,
    HealthChecking,
    SwitchingTraffic,
    Validating,
    Completing,
    Completed,
    RollingBack,
    RolledBack,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed | DeploymentStatus::RolledBack | DeploymentStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Starting => "starting",
            DeploymentStatus::Preparing => "preparing",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::HealthChecking => "health_checking",
            DeploymentStatus::SwitchingTraffic => "switching_traffic",
            DeploymentStatus::Validating => "validating",
            DeploymentStatus::Completing => "completing",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::RollingBack => "rolling_back",
            DeploymentStatus::RolledBack => "rolled_back",
            DeploymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate of the most recent probe pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSummary {
    pub total: usize,
    pub successful: usize,
    pub success_rate: f64,
}

impl HealthCheckSummary {
    pub fn from_results(results: &[HealthCheckResult]) -> Self {
        let total = results.len();
        let successful = results
            .iter()
            .filter(|r| r.status == HealthStatus::Healthy)
            .count();
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };
        Self {
            total,
            successful,
            success_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Outcome of probing one endpoint, after retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// `<environment>-<color>`.
    pub service_name: String,
    pub endpoint: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Audit entry for one traffic-splitter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSwitchResult {
    pub from: TrafficSplit,
    pub to: TrafficSplit,
    pub success: bool,
    pub traffic_shifted_percent: u8,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A blue/green release attempt for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub version: String,
    pub environment: EnvironmentName,
    pub image: ImageRef,
    pub active_color: Color,
    pub inactive_color: Color,
    /// Color that served traffic before this deployment started.
    pub original_color: Color,
    pub current_traffic: TrafficSplit,
    pub initial_traffic_percent: u8,
    pub phase: Phase,
    pub phases_completed: Vec<Phase>,
    pub health_check_summary: Option<HealthCheckSummary>,
    pub status: DeploymentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub rollback_available: bool,
    /// Set once cleanup has scaled the original color to zero.
    #[serde(default)]
    pub original_released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Diagnostics,
}

impl Deployment {
    pub(crate) fn new(
        version: String,
        environment: EnvironmentName,
        image: ImageRef,
        active: Color,
        initial_traffic_percent: u8,
    ) -> Self {
        Self {
            id: DeploymentId::generate(),
            version,
            environment,
            image,
            active_color: active,
            inactive_color: active.other(),
            original_color: active,
            current_traffic: TrafficSplit::all_on(active),
            initial_traffic_percent,
            phase: Phase::Preparation,
            phases_completed: vec![Phase::Preparation],
            health_check_summary: None,
            status: DeploymentStatus::Starting,
            start_time: Utc::now(),
            end_time: None,
            rollback_available: false,
            original_released: false,
            error: None,
            warnings: Diagnostics::default(),
        }
    }

    /// Color receiving the new version.
    pub fn candidate_color(&self) -> Color {
        self.original_color.other()
    }

    /// Whether active and inactive have been swapped by the cutover.
    pub fn is_swapped(&self) -> bool {
        self.active_color != self.original_color
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Enter `phase`, logging it in `phases_completed` and mirroring `status`.
    pub(crate) fn enter(&mut self, phase: Phase) {
        tracing::info!(
            deployment = %self.id,
            environment = %self.environment,
            from = %self.phase,
            to = %phase,
            "phase transition"
        );
        self.phase = phase;
        self.phases_completed.push(phase);
        self.status = phase.status();
        if phase.is_terminal() {
            self.end_time = Some(Utc::now());
        }
    }

    /// Enter a terminal failure, keeping `reason` on the record.
    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.rollback_available = false;
        self.enter(Phase::Failed);
    }

    pub(crate) fn swap_colors(&mut self) {
        std::mem::swap(&mut self.active_color, &mut self.inactive_color);
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        self.warnings.warn(warning);
    }
}

/// Aggregated view of a deployment and its histories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentMetrics {
    pub duration_minutes: f64,
    pub health_checks_total: usize,
    pub health_success_rate: f64,
    pub average_response_time_ms: f64,
    pub traffic_switches_total: usize,
    pub traffic_switches_successful: usize,
    pub average_switch_time_ms: f64,
    pub current_traffic_distribution: TrafficSplit,
    pub rollback_available: bool,
}

impl DeploymentMetrics {
    pub fn compute(
        deployment: &Deployment,
        health: &[HealthCheckResult],
        switches: &[TrafficSwitchResult],
        now: DateTime<Utc>,
    ) -> Self {
        let end = deployment.end_time.unwrap_or(now);
        let elapsed = end - deployment.start_time;
        let duration_minutes = elapsed.num_milliseconds().max(0) as f64 / 60_000.0;

        let summary = HealthCheckSummary::from_results(health);

        Self {
            duration_minutes,
            health_checks_total: summary.total,
            health_success_rate: summary.success_rate,
            average_response_time_ms: mean(health.iter().map(|r| r.response_time_ms)),
            traffic_switches_total: switches.len(),
            traffic_switches_successful: switches.iter().filter(|s| s.success).count(),
            average_switch_time_ms: mean(switches.iter().map(|s| s.duration_ms)),
            current_traffic_distribution: deployment.current_traffic,
            rollback_available: deployment.rollback_available,
        }
    }
}

fn mean(values: impl Iterator<Item = u64>) -> f64 {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s.saturating_add(v), c + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> Deployment {
        Deployment::new(
            "1.2.0".to_string(),
            EnvironmentName::new("prod").unwrap(),
            ImageRef::parse("registry.example.com/app:1.2.0").unwrap(),
            Color::Blue,
            10,
        )
    }

    fn probe(status: HealthStatus, ms: u64) -> HealthCheckResult {
        HealthCheckResult {
            service_name: "prod-green".to_string(),
            endpoint: "/health".to_string(),
            status,
            response_time_ms: ms,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_deployment_starts_in_preparation() {
        let d = deployment();
        assert_eq!(d.phase, Phase::Preparation);
        assert_eq!(d.phases_completed, vec![Phase::Preparation]);
        assert_eq!(d.status, DeploymentStatus::Starting);
        assert_eq!(d.current_traffic, TrafficSplit::all_on(Color::Blue));
        assert_eq!(d.candidate_color(), Color::Green);
        assert!(d.end_time.is_none());
        assert!(!d.rollback_available);
    }

    #[test]
    fn entering_terminal_phase_sets_end_time() {
        let mut d = deployment();
        d.enter(Phase::Deployment);
        assert!(d.end_time.is_none());
        assert_eq!(d.status, DeploymentStatus::Deploying);

        d.fail("rollout timed out");
        assert_eq!(d.status, DeploymentStatus::Failed);
        assert!(d.end_time.is_some());
        assert_eq!(d.error.as_deref(), Some("rollout timed out"));
        assert_eq!(
            d.phases_completed,
            vec![Phase::Preparation, Phase::Deployment, Phase::Failed]
        );
    }

    #[test]
    fn swap_keeps_candidate_stable() {
        let mut d = deployment();
        d.swap_colors();
        assert_eq!(d.active_color, Color::Green);
        assert_eq!(d.inactive_color, Color::Blue);
        assert!(d.is_swapped());
        assert_eq!(d.candidate_color(), Color::Green);
    }

    #[test]
    fn phases_serialize_screaming_and_statuses_snake() {
        assert_eq!(
            serde_json::to_string(&Phase::HealthChecks).unwrap(),
            "\"HEALTH_CHECKS\""
        );
        assert_eq!(
            serde_json::to_string(&DeploymentStatus::RolledBack).unwrap(),
            "\"rolled_back\""
        );
        assert_eq!(Phase::Cleanup.status(), DeploymentStatus::Completing);
    }

    #[test]
    fn summary_rate_is_zero_without_results() {
        let summary = HealthCheckSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[test]
    fn metrics_aggregate_histories() {
        let mut d = deployment();
        d.end_time = Some(d.start_time + chrono::Duration::minutes(3));
        let health = vec![
            probe(HealthStatus::Healthy, 10),
            probe(HealthStatus::Healthy, 20),
            probe(HealthStatus::Unhealthy, 30),
            probe(HealthStatus::Healthy, 40),
        ];
        let switches = vec![TrafficSwitchResult {
            from: TrafficSplit::all_on(Color::Blue),
            to: TrafficSplit::toward(Color::Green, 10),
            success: true,
            traffic_shifted_percent: 10,
            duration_ms: 8,
            timestamp: Utc::now(),
            error: None,
        }];

        let metrics = DeploymentMetrics::compute(&d, &health, &switches, Utc::now());
        assert_eq!(metrics.duration_minutes, 3.0);
        assert_eq!(metrics.health_checks_total, 4);
        assert_eq!(metrics.health_success_rate, 0.75);
        assert_eq!(metrics.average_response_time_ms, 25.0);
        assert_eq!(metrics.traffic_switches_total, 1);
        assert_eq!(metrics.traffic_switches_successful, 1);
        assert_eq!(metrics.average_switch_time_ms, 8.0);
    }
}
