// ABOUTME: Orchestrator handle: starts deployments, answers queries and applies operator intents.
// ABOUTME: Each deployment runs on its own task; this handle only validates and dispatches.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, EnvironmentConfig};
use crate::traffic::TrafficSplitter;
use crate::types::{Color, DeploymentId, EnvironmentName, TrafficSplit};
use crate::workload::WorkloadController;

use super::error::DeployError;
use super::lock::{EnvironmentLease, EnvironmentLocks};
use super::model::{
    Deployment, DeploymentMetrics, DeploymentStatus, HealthCheckResult, Phase,
    TrafficSwitchResult,
};
use super::probe::{EndpointProber, HealthProbe, ProbePolicy};
use super::registry::{DeploymentRegistry, ListFilter};
use super::run::{Run, Start};
use super::signals::ValidationSignals;

/// External systems the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub workload: Arc<dyn WorkloadController>,
    pub traffic: Arc<dyn TrafficSplitter>,
    pub signals: Arc<dyn ValidationSignals>,
    pub prober: Arc<dyn EndpointProber>,
}

/// Bookkeeping for a deployment whose task has not closed yet.
pub(super) struct TaskHandle {
    /// Cancelled to move the run to ROLLBACK at its next checkpoint.
    pub(super) cancel: CancellationToken,
    /// Cancelled once the task has released its lease.
    pub(super) done: CancellationToken,
}

pub(super) struct Inner {
    pub(super) config: Config,
    pub(super) collaborators: Collaborators,
    pub(super) probe: HealthProbe,
    pub(super) registry: DeploymentRegistry,
    pub(super) locks: EnvironmentLocks,
    pub(super) active_colors: Mutex<HashMap<EnvironmentName, Color>>,
    /// Environments left on a mixed split by a manual traffic switch.
    pub(super) unpinned: Mutex<HashMap<EnvironmentName, TrafficSplit>>,
    pub(super) tasks: Mutex<HashMap<DeploymentId, TaskHandle>>,
    pub(super) shutdown: CancellationToken,
}

impl Inner {
    pub(super) fn set_active(&self, environment: &EnvironmentName, color: Color) {
        self.unpinned.lock().remove(environment);
        self.active_colors.lock().insert(environment.clone(), color);
    }

    /// Track a split applied outside a deployment run. A split pinned to one
    /// color makes that color active; any other split blocks new deployments.
    pub(super) fn settle_traffic(&self, environment: &EnvironmentName, split: TrafficSplit) {
        match [Color::Blue, Color::Green]
            .into_iter()
            .find(|&color| split == TrafficSplit::all_on(color))
        {
            Some(color) => self.set_active(environment, color),
            None => {
                self.unpinned.lock().insert(environment.clone(), split);
            }
        }
    }
}

/// Cheaply cloneable handle to the deployment state machine.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("environments", &self.inner.config.environments.len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let probe = HealthProbe::new(
            collaborators.prober.clone(),
            ProbePolicy::from(&config.health),
        );
        Self {
            inner: Arc::new(Inner {
                config,
                collaborators,
                probe,
                registry: DeploymentRegistry::new(),
                locks: EnvironmentLocks::new(),
                active_colors: Mutex::new(HashMap::new()),
                unpinned: Mutex::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Color currently serving the environment, as far as this process knows.
    pub fn active_color(&self, environment: &EnvironmentName) -> Option<Color> {
        let configured = self.inner.config.environment(environment)?.active;
        Some(
            self.inner
                .active_colors
                .lock()
                .get(environment)
                .copied()
                .unwrap_or(configured),
        )
    }

    /// Create a deployment and launch its run; returns the initial snapshot.
    pub fn start_deployment(
        &self,
        version: &str,
        environment: &EnvironmentName,
        initial_traffic_percent: u8,
    ) -> Result<Deployment, DeployError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(DeployError::ShuttingDown);
        }
        let env_config = self
            .inner
            .config
            .environment(environment)
            .cloned()
            .ok_or_else(|| {
                DeployError::InvalidRequest(format!("unknown environment {environment}"))
            })?;
        let active = self
            .inner
            .active_colors
            .lock()
            .get(environment)
            .copied()
            .unwrap_or(env_config.active);
        if let Some(split) = self.inner.unpinned.lock().get(environment).copied() {
            return Err(DeployError::InvalidRequest(format!(
                "traffic for {environment} is split {split}; pin it to one color with a manual switch first"
            )));
        }
        if initial_traffic_percent > 100 {
            return Err(DeployError::InvalidRequest(format!(
                "initial traffic percent must be at most 100, got {initial_traffic_percent}"
            )));
        }
        let image = self
            .inner
            .config
            .image
            .with_tag(version)
            .map_err(|e| DeployError::InvalidRequest(format!("version {version:?}: {e}")))?;

        let deployment = Deployment::new(
            version.to_string(),
            environment.clone(),
            image,
            active,
            initial_traffic_percent,
        );
        let lease = self.inner.locks.acquire(environment, &deployment.id)?;

        tracing::info!(
            deployment = %deployment.id,
            %environment,
            version,
            active = %active,
            "starting deployment"
        );
        self.inner.registry.insert(deployment.clone());
        self.spawn(&deployment, env_config, lease, Start::Fresh);
        Ok(deployment)
    }

    fn spawn(
        &self,
        deployment: &Deployment,
        env_config: EnvironmentConfig,
        lease: EnvironmentLease,
        start: Start,
    ) {
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let run = Run::new(
            self.inner.clone(),
            deployment,
            env_config,
            lease,
            cancel.clone(),
            done.clone(),
        );

        let mut tasks = self.inner.tasks.lock();
        tokio::spawn(run.execute(start));
        tasks.insert(deployment.id.clone(), TaskHandle { cancel, done });
    }

    pub fn get_deployment(&self, id: &DeploymentId) -> Result<Deployment, DeployError> {
        self.inner
            .registry
            .get(id)
            .ok_or_else(|| DeployError::NotFound(id.clone()))
    }

    pub fn list_deployments(&self, filter: &ListFilter) -> Vec<Deployment> {
        self.inner.registry.list(filter)
    }

    pub fn health_history(&self, id: &DeploymentId) -> Result<Vec<HealthCheckResult>, DeployError> {
        self.inner
            .registry
            .health_history(id)
            .ok_or_else(|| DeployError::NotFound(id.clone()))
    }

    pub fn switch_history(
        &self,
        id: &DeploymentId,
    ) -> Result<Vec<TrafficSwitchResult>, DeployError> {
        self.inner
            .registry
            .switch_history(id)
            .ok_or_else(|| DeployError::NotFound(id.clone()))
    }

    pub fn get_deployment_metrics(&self, id: &DeploymentId) -> Result<DeploymentMetrics, DeployError> {
        let (deployment, health, switches) = self
            .inner
            .registry
            .entry(id)
            .ok_or_else(|| DeployError::NotFound(id.clone()))?;
        Ok(DeploymentMetrics::compute(
            &deployment,
            &health,
            &switches,
            Utc::now(),
        ))
    }

    /// Every known record, oldest first.
    pub fn export(&self) -> Vec<Deployment> {
        self.inner.registry.export()
    }

    /// Wait until the deployment's task has closed, then return its record.
    pub async fn wait(&self, id: &DeploymentId) -> Result<Deployment, DeployError> {
        let done = self
            .inner
            .tasks
            .lock()
            .get(id)
            .map(|handle| handle.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
        self.get_deployment(id)
    }

    /// Ask an in-flight deployment to roll back at its next checkpoint.
    pub fn cancel_deployment(&self, id: &DeploymentId) -> bool {
        let tasks = self.inner.tasks.lock();
        let Some(handle) = tasks.get(id) else {
            return false;
        };
        let in_flight = self
            .inner
            .registry
            .get(id)
            .is_some_and(|d| !d.is_terminal());
        if in_flight {
            tracing::info!(deployment = %id, "cancellation requested");
            handle.cancel.cancel();
        }
        in_flight
    }

    /// Roll back a deployment whose cutover has completed.
    ///
    /// Returns `false` without side effects unless `rollback_available` is set.
    pub fn trigger_rollback(&self, id: &DeploymentId) -> bool {
        let tasks = self.inner.tasks.lock();
        let Some(deployment) = self.inner.registry.get(id) else {
            return false;
        };
        if !deployment.rollback_available || self.inner.shutdown.is_cancelled() {
            return false;
        }

        if let Some(handle) = tasks.get(id) {
            tracing::info!(deployment = %id, "rollback requested for running deployment");
            handle.cancel.cancel();
            return true;
        }
        drop(tasks);

        if deployment.status != DeploymentStatus::Completed {
            return false;
        }
        let Some(env_config) = self
            .inner
            .config
            .environment(&deployment.environment)
            .cloned()
        else {
            return false;
        };
        let lease = match self.inner.locks.acquire(&deployment.environment, id) {
            Ok(lease) => lease,
            Err(e) => {
                tracing::warn!(deployment = %id, error = %e, "rollback refused");
                return false;
            }
        };
        tracing::info!(deployment = %id, environment = %deployment.environment, "manual rollback requested");
        self.spawn(
            &deployment,
            env_config,
            lease,
            Start::Rollback("manual rollback requested".to_string()),
        );
        true
    }

    /// Apply an operator-chosen split to a completed deployment's environment.
    pub async fn manual_traffic_switch(&self, id: &DeploymentId, target: TrafficSplit) -> bool {
        let Some(deployment) = self.inner.registry.get(id) else {
            return false;
        };
        if deployment.status != DeploymentStatus::Completed
            || self.inner.tasks.lock().contains_key(id)
        {
            return false;
        }
        let _lease = match self.inner.locks.acquire(&deployment.environment, id) {
            Ok(lease) => lease,
            Err(e) => {
                tracing::warn!(deployment = %id, error = %e, "manual traffic switch refused");
                return false;
            }
        };

        let from = deployment.current_traffic;
        let started = Instant::now();
        let limit = self.inner.config.rollout.call_timeout;
        let outcome = tokio::time::timeout(
            limit,
            self.inner
                .collaborators
                .traffic
                .set_weights(&deployment.environment, target),
        )
        .await;
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(
                DeployError::CallTimeout {
                    operation: "set_weights",
                    timeout: limit,
                }
                .to_string(),
            ),
        };
        let success = error.is_none();

        self.inner.registry.append_switch(
            id,
            TrafficSwitchResult {
                from,
                to: target,
                success,
                traffic_shifted_percent: target.shifted_from(&from),
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                timestamp: Utc::now(),
                error: error.clone(),
            },
        );
        match error {
            None => {
                self.inner
                    .registry
                    .update(id, |d| d.current_traffic = target);
                self.inner.settle_traffic(&deployment.environment, target);
                tracing::info!(deployment = %id, split = %target, "manual traffic switch applied");
            }
            Some(e) => {
                tracing::warn!(deployment = %id, split = %target, error = %e, "manual traffic switch failed")
            }
        }
        success
    }

    /// Re-evaluate a record persisted by an earlier process.
    ///
    /// Terminal records become history. Interrupted ones are driven to a safe
    /// terminal state based on the phase they stopped in.
    pub fn recover(&self, record: Deployment) -> Result<Deployment, DeployError> {
        self.recover_with_history(record, Vec::new(), Vec::new())
    }

    /// [`recover`](Self::recover), seeding the registry with histories saved
    /// alongside the record.
    pub fn recover_with_history(
        &self,
        record: Deployment,
        health_history: Vec<HealthCheckResult>,
        switch_history: Vec<TrafficSwitchResult>,
    ) -> Result<Deployment, DeployError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(DeployError::ShuttingDown);
        }
        let env_config = self
            .inner
            .config
            .environment(&record.environment)
            .cloned()
            .ok_or_else(|| {
                DeployError::InvalidRequest(format!("unknown environment {}", record.environment))
            })?;
        if self.inner.tasks.lock().contains_key(&record.id) {
            return Err(DeployError::InvalidRequest(format!(
                "deployment {} is already running",
                record.id
            )));
        }

        if record.is_terminal() {
            if record.status != DeploymentStatus::Failed {
                self.inner
                    .settle_traffic(&record.environment, record.current_traffic);
            }
            self.inner
                .registry
                .insert_with_history(record.clone(), health_history, switch_history);
            return Ok(record);
        }

        let lease = self.inner.locks.acquire(&record.environment, &record.id)?;
        let start = match record.phase {
            Phase::Preparation | Phase::Deployment => Start::Abort,
            Phase::FullTraffic | Phase::Cleanup => Start::Finish,
            phase => Start::Rollback(format!("recovered after interruption during {phase}")),
        };
        tracing::info!(
            deployment = %record.id,
            environment = %record.environment,
            phase = %record.phase,
            "recovering interrupted deployment"
        );
        self.inner
            .set_active(&record.environment, record.original_color);
        self.inner
            .registry
            .insert_with_history(record.clone(), health_history, switch_history);
        self.spawn(&record, env_config, lease, start);
        Ok(record)
    }

    /// Stop accepting work and abandon in-flight runs where they stand.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let pending: Vec<CancellationToken> = self
            .inner
            .tasks
            .lock()
            .values()
            .map(|handle| handle.done.clone())
            .collect();
        tracing::info!(in_flight = pending.len(), "orchestrator shutting down");
        for done in pending {
            done.cancelled().await;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}
