// ABOUTME: Blue/green deployment orchestration: state machine, probes, ramp and registry.
// ABOUTME: Exports the Orchestrator handle and the record types callers read.

mod error;
mod lock;
mod model;
mod orchestrator;
mod probe;
mod ramp;
mod registry;
mod run;
mod signals;

pub use error::{DeployError, DeployErrorKind, LockHolderInfo};
pub use lock::{EnvironmentLease, EnvironmentLocks};
pub use model::{
    Deployment, DeploymentMetrics, DeploymentStatus, HealthCheckResult, HealthCheckSummary,
    HealthStatus, Phase, TrafficSwitchResult,
};
pub use orchestrator::{Collaborators, Orchestrator};
pub use probe::{EndpointProber, HealthProbe, HttpProber, ProbeError, ProbePolicy, ProbeReport};
pub use ramp::{RampError, RampStep, TrafficRamp};
pub use registry::{DeploymentRegistry, ListFilter};
pub use signals::{AssumeHealthy, FailingSignal, SignalsError, ValidationSignals};
