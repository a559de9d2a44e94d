// ABOUTME: The per-deployment run loop that walks a record through its phases.
// ABOUTME: Phase steps return Result<(), Halt>; the halt reason picks rollback, failure or abandonment.

use chrono::Utc;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::EnvironmentConfig;
use crate::diagnostics::Warning;
use crate::types::{Color, DeploymentId, EnvironmentName, ImageRef, TrafficSplit};

use super::error::DeployError;
use super::lock::EnvironmentLease;
use super::model::{Deployment, DeploymentStatus, Phase, TrafficSwitchResult};
use super::orchestrator::Inner;
use super::registry::ListFilter;

/// Why the forward path stopped.
#[derive(Debug)]
pub(super) enum Halt {
    /// Gating or traffic-plane failure; revert to the original color.
    Rollback(String),
    /// Unrecoverable before any traffic moved.
    Fail(DeployError),
    /// Process shutdown; leave the record where it stands.
    Abandon,
}

/// Where a run begins.
#[derive(Debug)]
pub(super) enum Start {
    /// New deployment from PREPARATION.
    Fresh,
    /// Straight to the rollback path.
    Rollback(String),
    /// Re-assert full traffic on the candidate and finish cleanup.
    Finish,
    /// Scale the candidate down and mark the deployment failed.
    Abort,
}

/// Failure of one collaborator call.
#[derive(Debug)]
enum CallError {
    Failed(String),
    TimedOut(DeployError),
    Shutdown,
}

impl CallError {
    fn message(self) -> Result<String, Halt> {
        match self {
            CallError::Failed(message) => Ok(message),
            CallError::TimedOut(err) => Ok(err.to_string()),
            CallError::Shutdown => Err(Halt::Abandon),
        }
    }
}

trait CallResultExt<T> {
    /// Classify a failure as fatal with `kind`.
    fn or_fail(self, kind: fn(String) -> DeployError) -> Result<T, Halt>;
    /// Classify a failure as a reason to roll back.
    fn or_rollback(self) -> Result<T, Halt>;
}

impl<T> CallResultExt<T> for Result<T, CallError> {
    fn or_fail(self, kind: fn(String) -> DeployError) -> Result<T, Halt> {
        self.map_err(|e| match e {
            CallError::Failed(message) => Halt::Fail(kind(message)),
            CallError::TimedOut(err) => Halt::Fail(err),
            CallError::Shutdown => Halt::Abandon,
        })
    }

    fn or_rollback(self) -> Result<T, Halt> {
        self.map_err(|e| match e.message() {
            Ok(message) => Halt::Rollback(message),
            Err(halt) => halt,
        })
    }
}

pub(super) struct Run {
    inner: Arc<Inner>,
    id: DeploymentId,
    environment: EnvironmentName,
    env_config: EnvironmentConfig,
    image: ImageRef,
    original: Color,
    candidate: Color,
    initial_traffic_percent: u8,
    lease: Option<EnvironmentLease>,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl Run {
    pub(super) fn new(
        inner: Arc<Inner>,
        deployment: &Deployment,
        env_config: EnvironmentConfig,
        lease: EnvironmentLease,
        cancel: CancellationToken,
        done: CancellationToken,
    ) -> Self {
        Self {
            id: deployment.id.clone(),
            environment: deployment.environment.clone(),
            env_config,
            image: deployment.image.clone(),
            original: deployment.original_color,
            candidate: deployment.candidate_color(),
            initial_traffic_percent: deployment.initial_traffic_percent,
            lease: Some(lease),
            cancel,
            done,
            inner,
        }
    }

    pub(super) async fn execute(mut self, start: Start) {
        let mut outcome = match start {
            Start::Fresh => self.advance().await,
            Start::Finish => self.finish_cutover().await,
            Start::Rollback(reason) => Err(Halt::Rollback(reason)),
            Start::Abort => self.abort().await,
        };

        loop {
            match outcome {
                Ok(()) => {}
                Err(Halt::Rollback(reason)) => self.rollback(reason).await,
                Err(Halt::Fail(err)) => {
                    tracing::error!(deployment = %self.id, error = %err, "deployment failed");
                    self.update(|d| d.fail(err.to_string()));
                }
                Err(Halt::Abandon) => self.abandon(),
            }

            if !self.close() {
                break;
            }
            // Rollback requested after the last checkpoint of a completed run.
            outcome = Err(Halt::Rollback("manual rollback requested".to_string()));
        }
        self.done.cancel();
    }

    /// Release the lease and deregister, unless a rollback is still owed.
    fn close(&mut self) -> bool {
        let mut tasks = self.inner.tasks.lock();
        let owed = self.cancel.is_cancelled()
            && !self.inner.shutdown.is_cancelled()
            && self
                .inner
                .registry
                .get(&self.id)
                .is_some_and(|d| d.status == DeploymentStatus::Completed && d.rollback_available);
        if !owed {
            drop(self.lease.take());
            tasks.remove(&self.id);
        }
        owed
    }

    fn update<R>(&self, f: impl FnOnce(&mut Deployment) -> R) -> Option<R> {
        self.inner.registry.update(&self.id, f)
    }

    fn enter(&self, phase: Phase) {
        self.update(|d| d.enter(phase));
    }

    /// Observe shutdown and cancellation between blocking steps.
    fn checkpoint(&self) -> Result<(), Halt> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Halt::Abandon);
        }
        if self.cancel.is_cancelled() {
            return Err(Halt::Rollback("cancelled by operator".to_string()));
        }
        Ok(())
    }

    /// Run a collaborator call bounded by `limit`, abandoning on shutdown.
    async fn call<T, E: Display>(
        &self,
        operation: &'static str,
        limit: Duration,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, CallError> {
        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => Err(CallError::Shutdown),
            res = tokio::time::timeout(limit, fut) => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(CallError::Failed(format!("{operation}: {e}"))),
                Err(_) => Err(CallError::TimedOut(DeployError::CallTimeout {
                    operation,
                    timeout: limit,
                })),
            },
        }
    }

    fn call_timeout(&self) -> Duration {
        self.inner.config.rollout.call_timeout
    }

    /// Cancellable sleep.
    async fn hold(&self, duration: Duration) -> Result<(), Halt> {
        if duration.is_zero() {
            return self.checkpoint();
        }
        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => Err(Halt::Abandon),
            _ = self.cancel.cancelled() => Err(Halt::Rollback("cancelled by operator".to_string())),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn advance(&self) -> Result<(), Halt> {
        let workload = self.inner.collaborators.workload.clone();
        let env = &self.environment;
        let limit = self.call_timeout();

        self.update(|d| d.status = DeploymentStatus::Preparing);
        self.checkpoint()?;
        self.call("check_environment", limit, workload.check_environment(env))
            .await
            .or_fail(DeployError::Prerequisite)?;
        self.checkpoint()?;

        self.enter(Phase::Deployment);
        self.retire_previous_releases();
        let candidate = self.candidate;
        self.call(
            "scale_to",
            limit,
            workload.scale_to(env, candidate, self.env_config.replicas),
        )
        .await
        .or_fail(DeployError::Rollout)?;
        self.checkpoint()?;
        self.call("set_image", limit, workload.set_image(env, candidate, &self.image))
            .await
            .or_fail(DeployError::Rollout)?;
        self.checkpoint()?;
        self.call("trigger_rollout", limit, workload.trigger_rollout(env, candidate))
            .await
            .or_fail(DeployError::Rollout)?;
        self.checkpoint()?;
        self.wait_for_rollout(candidate)
            .await
            .or_fail(DeployError::Rollout)?;
        self.checkpoint()?;

        self.enter(Phase::HealthChecks);
        self.health_gate(candidate).await?;
        self.checkpoint()?;

        self.enter(Phase::TrafficSwitching);
        self.walk_ramp().await?;

        self.enter(Phase::Validation);
        self.health_gate(candidate).await?;
        self.validation_signals().await?;
        self.checkpoint()?;

        self.finish_cutover().await
    }

    /// Earlier releases lose their rollback once the candidate color is reused.
    fn retire_previous_releases(&self) {
        for previous in self
            .inner
            .registry
            .list(&ListFilter::environment(self.environment.clone()))
            .into_iter()
            .filter(|d| d.id != self.id && d.rollback_available)
        {
            tracing::debug!(deployment = %self.id, previous = %previous.id, "previous release retired");
            self.inner
                .registry
                .update(&previous.id, |d| d.rollback_available = false);
        }
    }

    async fn wait_for_rollout(&self, color: Color) -> Result<(), CallError> {
        let timeout = self.inner.config.rollout.timeout;
        self.call(
            "wait_for_rollout",
            timeout,
            self.inner
                .collaborators
                .workload
                .wait_for_rollout(&self.environment, color, timeout),
        )
        .await
        .map_err(|e| match e {
            CallError::TimedOut(_) => CallError::TimedOut(DeployError::RolloutTimeout(timeout)),
            other => other,
        })
    }

    /// Probe `color` and roll back when the success rate is under threshold.
    async fn health_gate(&self, color: Color) -> Result<(), Halt> {
        let service = format!("{}-{}", self.environment, color);
        let endpoints: Vec<String> = self.inner.config.health.endpoints.iter().cloned().collect();
        let report = tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => return Err(Halt::Abandon),
            _ = self.cancel.cancelled() => {
                return Err(Halt::Rollback("cancelled by operator".to_string()))
            }
            report = self.inner.probe.check(&service, self.env_config.base_url(color), &endpoints) => report,
        };

        self.inner.registry.append_health(&self.id, &report.results);
        let summary = report.summary;
        self.update(|d| d.health_check_summary = Some(summary));

        let required = self.inner.config.health.success_threshold;
        if summary.success_rate < required {
            let err = DeployError::HealthGate {
                required,
                actual: summary.success_rate,
            };
            tracing::warn!(deployment = %self.id, %service, error = %err, "health gate failed");
            return Err(Halt::Rollback(err.to_string()));
        }
        tracing::info!(
            deployment = %self.id,
            %service,
            successful = summary.successful,
            total = summary.total,
            "health gate passed"
        );
        Ok(())
    }

    async fn validation_signals(&self) -> Result<(), Halt> {
        let failing = self
            .call(
                "evaluate_signals",
                self.call_timeout(),
                self.inner
                    .collaborators
                    .signals
                    .evaluate(&self.environment, self.candidate),
            )
            .await
            .or_rollback()?;

        if !failing.is_empty() {
            let detail = failing
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Halt::Rollback(DeployError::Validation(detail).to_string()));
        }
        Ok(())
    }

    async fn walk_ramp(&self) -> Result<(), Halt> {
        let ramp = &self.inner.config.ramp;
        let start = ramp.start_index(self.initial_traffic_percent);
        let mut next = ramp.step(start).map(|(step, is_last)| (start, step, is_last));

        while let Some((index, step, is_last)) = next {
            self.checkpoint()?;
            let target = TrafficSplit::toward(self.candidate, step.percent);
            self.switch(target).await?;
            self.validation_hold(target, step.validation_duration)
                .await?;
            if is_last {
                break;
            }
            self.hold(step.settle_duration()).await?;
            next = ramp.next_step(index);
        }
        Ok(())
    }

    /// Apply `target` via the splitter and record the attempt.
    async fn switch(&self, target: TrafficSplit) -> Result<(), Halt> {
        let from = self
            .inner
            .registry
            .get(&self.id)
            .map(|d| d.current_traffic)
            .unwrap_or(target);
        let started = Instant::now();
        let outcome = self
            .call(
                "set_weights",
                self.call_timeout(),
                self.inner
                    .collaborators
                    .traffic
                    .set_weights(&self.environment, target),
            )
            .await;
        let error = match outcome {
            Ok(()) => None,
            Err(e) => Some(e.message()?),
        };

        self.inner.registry.append_switch(
            &self.id,
            TrafficSwitchResult {
                from,
                to: target,
                success: error.is_none(),
                traffic_shifted_percent: target.shifted_from(&from),
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                timestamp: Utc::now(),
                error: error.clone(),
            },
        );

        match error {
            None => {
                self.update(|d| d.current_traffic = target);
                tracing::info!(deployment = %self.id, %from, to = %target, "traffic switched");
                Ok(())
            }
            Some(message) => {
                let err = DeployError::TrafficPlane(message);
                tracing::warn!(deployment = %self.id, %from, to = %target, error = %err, "traffic switch failed");
                Err(Halt::Rollback(err.to_string()))
            }
        }
    }

    /// Hold on `expected` for `duration`, reading the split back when supported.
    async fn validation_hold(&self, expected: TrafficSplit, duration: Duration) -> Result<(), Halt> {
        if !self.read_back(expected).await? {
            return self.hold(duration).await;
        }

        let period = self
            .inner
            .config
            .rollout
            .readback_interval
            .max(Duration::from_millis(1));
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => return Err(Halt::Abandon),
                _ = self.cancel.cancelled() => {
                    return Err(Halt::Rollback("cancelled by operator".to_string()))
                }
                _ = &mut deadline => return Ok(()),
                _ = ticker.tick() => {
                    self.read_back(expected).await?;
                }
            }
        }
    }

    /// Compare the enforced split with `expected`; `false` when unsupported.
    async fn read_back(&self, expected: TrafficSplit) -> Result<bool, Halt> {
        let observed = self
            .call(
                "current_weights",
                self.call_timeout(),
                self.inner
                    .collaborators
                    .traffic
                    .current_weights(&self.environment),
            )
            .await
            .map_err(|e| match e.message() {
                Ok(message) => Halt::Rollback(DeployError::TrafficPlane(message).to_string()),
                Err(halt) => halt,
            })?;

        match observed {
            None => Ok(false),
            Some(observed) if observed == expected => Ok(true),
            Some(observed) => Err(Halt::Rollback(format!(
                "traffic read-back mismatch: expected {expected}, observed {observed}"
            ))),
        }
    }

    /// FULL_TRAFFIC and CLEANUP, ending COMPLETED.
    async fn finish_cutover(&self) -> Result<(), Halt> {
        self.enter(Phase::FullTraffic);
        self.switch(TrafficSplit::all_on(self.candidate)).await?;
        self.update(|d| {
            if !d.is_swapped() {
                d.swap_colors();
            }
            d.rollback_available = true;
        });
        self.inner.set_active(&self.environment, self.candidate);
        self.checkpoint()?;

        self.enter(Phase::Cleanup);
        let outcome = self
            .call(
                "scale_to",
                self.call_timeout(),
                self.inner
                    .collaborators
                    .workload
                    .scale_to(&self.environment, self.original, 0),
            )
            .await;
        match outcome {
            Ok(()) => {
                self.update(|d| d.original_released = true);
            }
            Err(e) => {
                let message = e.message()?;
                self.update(|d| {
                    d.warn(Warning::cleanup_failed(format!(
                        "scaling {} to zero failed: {message}",
                        self.original
                    )))
                });
            }
        }
        self.checkpoint()?;

        self.enter(Phase::Completed);
        tracing::info!(
            deployment = %self.id,
            environment = %self.environment,
            active = %self.candidate,
            "deployment completed"
        );
        Ok(())
    }

    /// Recovery of a run interrupted before any traffic moved.
    async fn abort(&self) -> Result<(), Halt> {
        let outcome = self
            .call(
                "scale_to",
                self.call_timeout(),
                self.inner
                    .collaborators
                    .workload
                    .scale_to(&self.environment, self.candidate, 0),
            )
            .await;
        if let Err(e) = outcome {
            let message = e.message()?;
            self.update(|d| d.warn(Warning::scale_down_failed(message)));
        }
        Err(Halt::Fail(DeployError::Rollout(
            "interrupted before traffic moved; candidate scaled down".to_string(),
        )))
    }

    async fn rollback(&self, reason: String) {
        if let Err(Halt::Abandon) = self.try_rollback(reason).await {
            self.abandon();
        }
    }

    async fn try_rollback(&self, reason: String) -> Result<(), Halt> {
        tracing::warn!(deployment = %self.id, reason = %reason, "rolling back");
        self.update(|d| {
            d.error = Some(reason);
            d.rollback_available = false;
        });
        self.enter(Phase::Rollback);

        let released = self.update(|d| d.original_released).unwrap_or(false);
        if released {
            let restored = match self
                .call(
                    "scale_to",
                    self.call_timeout(),
                    self.inner.collaborators.workload.scale_to(
                        &self.environment,
                        self.original,
                        self.env_config.replicas,
                    ),
                )
                .await
            {
                Ok(()) => self.wait_for_rollout(self.original).await,
                Err(e) => Err(e),
            };
            if let Err(e) = restored {
                let message = e.message()?;
                self.critical(DeployError::RollbackFailed(format!(
                    "could not restore {}: {message}",
                    self.original
                )));
                return Ok(());
            }
            self.update(|d| d.original_released = false);
        }

        let target = TrafficSplit::all_on(self.original);
        let attempts = self.inner.config.rollout.rollback_retries.saturating_add(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.switch(target).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(Halt::Rollback(message)) => {
                    tracing::warn!(deployment = %self.id, attempt, attempts, error = %message, "traffic revert failed");
                    last_error = Some(message);
                }
                Err(halt) => return Err(halt),
            }
        }
        if let Some(message) = last_error {
            self.critical(DeployError::RollbackFailed(message));
            return Ok(());
        }

        self.update(|d| {
            if d.is_swapped() {
                d.swap_colors();
            }
        });
        self.inner.set_active(&self.environment, self.original);

        let scaled = self
            .call(
                "scale_to",
                self.call_timeout(),
                self.inner
                    .collaborators
                    .workload
                    .scale_to(&self.environment, self.candidate, 0),
            )
            .await;
        if let Err(e) = scaled {
            let message = e.message()?;
            self.update(|d| {
                d.warn(Warning::scale_down_failed(format!(
                    "scaling {} to zero failed: {message}",
                    self.candidate
                )))
            });
        }

        self.enter(Phase::RolledBack);
        tracing::info!(deployment = %self.id, environment = %self.environment, "deployment rolled back");
        Ok(())
    }

    /// Terminal failure that leaves traffic needing an operator.
    fn critical(&self, err: DeployError) {
        self.update(|d| {
            let message = format!(
                "{} requires manual intervention: {err}; traffic left at {}",
                d.environment, d.current_traffic
            );
            d.warn(Warning::critical(message));
            d.fail(err.to_string());
        });
    }

    fn abandon(&self) {
        self.update(|d| {
            let message = format!("abandoned during {} by shutdown", d.phase);
            d.warn(Warning::abandoned(message));
        });
    }
}
