// ABOUTME: Test support utilities.
// ABOUTME: In-memory workload, splitter, prober and signal fakes plus an orchestrator harness.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use switchyard::config::Config;
use switchyard::deploy::{
    Collaborators, Deployment, EndpointProber, FailingSignal, Orchestrator, ProbeError, RampStep,
    SignalsError, TrafficRamp, ValidationSignals,
};
use switchyard::traffic::{TrafficError, TrafficSplitter};
use switchyard::types::{Color, DeploymentId, EnvironmentName, ImageRef, TrafficSplit};
use switchyard::workload::{WorkloadController, WorkloadError};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::from_default_env().add_directive("switchyard=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn env(name: &str) -> EnvironmentName {
    EnvironmentName::new(name).unwrap()
}

pub fn split(blue: u8, green: u8) -> TrafficSplit {
    TrafficSplit::new(blue, green).unwrap()
}

/// Standard ramp percentages with the given hold on every step.
pub fn ramp(validation: Duration) -> TrafficRamp {
    let steps = TrafficRamp::STANDARD_PERCENTAGES
        .iter()
        .map(|&p| RampStep::new(p, validation, validation))
        .collect();
    TrafficRamp::new(steps).unwrap()
}

/// Template config with every wait shrunk to zero and a second environment.
pub fn test_config() -> Config {
    let mut config = Config::template();
    config.health.endpoints = nonempty::NonEmpty::new("/health".to_string());
    config.health.retries = 0;
    config.health.retry_delay = Duration::ZERO;
    config.health.timeout = Duration::from_secs(1);
    config.rollout.timeout = Duration::from_secs(5);
    config.rollout.call_timeout = Duration::from_secs(5);
    config.rollout.readback_interval = Duration::from_millis(5);
    config.ramp = ramp(Duration::ZERO);

    let production = config.environments.values().next().cloned().unwrap();
    let mut staging = production;
    staging.replicas = 1;
    staging.base_urls.blue = "http://staging-blue.internal:8080".to_string();
    staging.base_urls.green = "http://staging-green.internal:8080".to_string();
    config.environments.insert(env("staging"), staging);
    config
}

/// A call observed by [`FakeWorkload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadCall {
    CheckEnvironment(String),
    ScaleTo(String, Color, u32),
    SetImage(String, Color, String),
    TriggerRollout(String, Color),
    WaitForRollout(String, Color),
}

#[derive(Default)]
pub struct FakeWorkload {
    calls: Mutex<Vec<WorkloadCall>>,
    unprovisioned: Mutex<bool>,
    rollout_delay: Mutex<Option<Duration>>,
    failing_scale_down: Mutex<bool>,
    failing_scale_up: Mutex<bool>,
}

impl FakeWorkload {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<WorkloadCall> {
        self.calls.lock().clone()
    }

    /// `check_environment` reports the environment missing.
    pub fn unprovisioned(&self) {
        *self.unprovisioned.lock() = true;
    }

    /// `wait_for_rollout` sleeps this long before converging.
    pub fn slow_rollout(&self, delay: Duration) {
        *self.rollout_delay.lock() = Some(delay);
    }

    /// Every `scale_to(.., 0)` fails.
    pub fn fail_scale_down(&self) {
        *self.failing_scale_down.lock() = true;
    }

    /// Every `scale_to` with a non-zero replica count fails.
    pub fn fail_scale_up(&self) {
        *self.failing_scale_up.lock() = true;
    }

    fn record(&self, call: WorkloadCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl WorkloadController for FakeWorkload {
    async fn check_environment(&self, environment: &EnvironmentName) -> Result<(), WorkloadError> {
        self.record(WorkloadCall::CheckEnvironment(environment.to_string()));
        if *self.unprovisioned.lock() {
            return Err(WorkloadError::NotProvisioned(environment.to_string()));
        }
        Ok(())
    }

    async fn scale_to(
        &self,
        environment: &EnvironmentName,
        color: Color,
        replicas: u32,
    ) -> Result<(), WorkloadError> {
        self.record(WorkloadCall::ScaleTo(
            environment.to_string(),
            color,
            replicas,
        ));
        let failing = if replicas == 0 {
            *self.failing_scale_down.lock()
        } else {
            *self.failing_scale_up.lock()
        };
        if failing {
            return Err(WorkloadError::Unavailable("scale refused".to_string()));
        }
        Ok(())
    }

    async fn set_image(
        &self,
        environment: &EnvironmentName,
        color: Color,
        image: &ImageRef,
    ) -> Result<(), WorkloadError> {
        self.record(WorkloadCall::SetImage(
            environment.to_string(),
            color,
            image.to_string(),
        ));
        Ok(())
    }

    async fn trigger_rollout(
        &self,
        environment: &EnvironmentName,
        color: Color,
    ) -> Result<(), WorkloadError> {
        self.record(WorkloadCall::TriggerRollout(environment.to_string(), color));
        Ok(())
    }

    async fn wait_for_rollout(
        &self,
        environment: &EnvironmentName,
        color: Color,
        _timeout: Duration,
    ) -> Result<(), WorkloadError> {
        self.record(WorkloadCall::WaitForRollout(environment.to_string(), color));
        let delay = *self.rollout_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// How [`FakeSplitter`] answers `current_weights`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readback {
    Unsupported,
    /// Report the last applied split.
    Echo,
    /// Always report this split.
    Fixed(TrafficSplit),
}

pub struct FakeSplitter {
    applied: Mutex<Vec<TrafficSplit>>,
    calls: Mutex<usize>,
    failing_calls: Mutex<HashSet<usize>>,
    readback: Mutex<Readback>,
    readbacks: Mutex<usize>,
}

impl FakeSplitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            applied: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
            failing_calls: Mutex::new(HashSet::new()),
            readback: Mutex::new(Readback::Unsupported),
            readbacks: Mutex::new(0),
        })
    }

    /// Splits accepted so far, in order.
    pub fn applied(&self) -> Vec<TrafficSplit> {
        self.applied.lock().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    /// Reject the given 1-based `set_weights` calls.
    pub fn fail_calls(&self, calls: impl IntoIterator<Item = usize>) {
        self.failing_calls.lock().extend(calls);
    }

    pub fn set_readback(&self, readback: Readback) {
        *self.readback.lock() = readback;
    }

    pub fn readbacks(&self) -> usize {
        *self.readbacks.lock()
    }
}

#[async_trait]
impl TrafficSplitter for FakeSplitter {
    async fn set_weights(
        &self,
        _environment: &EnvironmentName,
        split: TrafficSplit,
    ) -> Result<(), TrafficError> {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        if self.failing_calls.lock().contains(&call) {
            return Err(TrafficError::Rejected {
                status: 503,
                message: format!("call {call} rejected"),
            });
        }
        self.applied.lock().push(split);
        Ok(())
    }

    async fn current_weights(
        &self,
        _environment: &EnvironmentName,
    ) -> Result<Option<TrafficSplit>, TrafficError> {
        *self.readbacks.lock() += 1;
        let readback = *self.readback.lock();
        Ok(match readback {
            Readback::Unsupported => None,
            Readback::Echo => self.applied.lock().last().copied(),
            Readback::Fixed(split) => Some(split),
        })
    }
}

/// Prober failing every URL that ends with one of `failing` suffixes.
#[derive(Default)]
pub struct FakeProber {
    failing: Mutex<Vec<String>>,
    probes: Mutex<Vec<String>>,
}

impl FakeProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_suffix(&self, suffix: &str) {
        self.failing.lock().push(suffix.to_string());
    }

    pub fn probed(&self) -> Vec<String> {
        self.probes.lock().clone()
    }
}

#[async_trait]
impl EndpointProber for FakeProber {
    async fn probe(&self, url: &str, _timeout: Duration) -> Result<(), ProbeError> {
        self.probes.lock().push(url.to_string());
        if self.failing.lock().iter().any(|s| url.ends_with(s.as_str())) {
            return Err(ProbeError::Status(503));
        }
        Ok(())
    }
}

/// Signals backend that reports a fixed set of failures.
#[derive(Default)]
pub struct FakeSignals {
    failing: Mutex<Vec<FailingSignal>>,
}

impl FakeSignals {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, name: &str, detail: &str) {
        self.failing.lock().push(FailingSignal {
            name: name.to_string(),
            detail: detail.to_string(),
        });
    }
}

#[async_trait]
impl ValidationSignals for FakeSignals {
    async fn evaluate(
        &self,
        _environment: &EnvironmentName,
        _color: Color,
    ) -> Result<Vec<FailingSignal>, SignalsError> {
        Ok(self.failing.lock().clone())
    }
}

/// Orchestrator wired to fresh fakes.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub workload: Arc<FakeWorkload>,
    pub splitter: Arc<FakeSplitter>,
    pub prober: Arc<FakeProber>,
    pub signals: Arc<FakeSignals>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        init_tracing();
        let workload = FakeWorkload::new();
        let splitter = FakeSplitter::new();
        let prober = FakeProber::new();
        let signals = FakeSignals::new();
        let collaborators = Collaborators {
            workload: workload.clone(),
            traffic: splitter.clone(),
            signals: signals.clone(),
            prober: prober.clone(),
        };
        Self {
            orchestrator: Orchestrator::new(config, collaborators),
            workload,
            splitter,
            prober,
            signals,
        }
    }

    /// Start a deployment on `production` and wait for its task to close.
    pub async fn deploy(&self, version: &str) -> Deployment {
        let started = self
            .orchestrator
            .start_deployment(version, &env("production"), 0)
            .unwrap();
        self.finish(&started.id).await
    }

    /// Wait (bounded) for the deployment's task to close.
    pub async fn finish(&self, id: &DeploymentId) -> Deployment {
        tokio::time::timeout(Duration::from_secs(10), self.orchestrator.wait(id))
            .await
            .expect("deployment did not finish in time")
            .unwrap()
    }

    /// Poll until `predicate` holds for the deployment's record.
    pub async fn wait_until(
        &self,
        id: &DeploymentId,
        predicate: impl Fn(&Deployment) -> bool,
    ) -> Deployment {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let deployment = self.orchestrator.get_deployment(id).unwrap();
            if predicate(&deployment) {
                return deployment;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached; last phase {}",
                deployment.phase
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}
