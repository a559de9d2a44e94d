// ABOUTME: Shared helper wiring the production collaborators into an orchestrator.
// ABOUTME: Connects to Docker/Podman and the router admin API named in the config.

use std::sync::Arc;

use switchyard::config::Config;
use switchyard::deploy::{AssumeHealthy, Collaborators, HttpProber, Orchestrator};
use switchyard::error::{Error, Result};
use switchyard::output::Output;
use switchyard::traffic::HttpTrafficSplitter;
use switchyard::workload::DockerWorkload;

/// Build an orchestrator backed by the container runtime and router from `config`.
pub async fn connect_orchestrator(config: &Config, output: &Output) -> Result<Orchestrator> {
    let admin_url = config.traffic.admin_url.as_deref().ok_or_else(|| {
        Error::InvalidConfig("traffic.admin_url is required to steer traffic".to_string())
    })?;

    output.progress("  → Detecting runtime...");
    let workload = DockerWorkload::from_config(&config.workload).await?;
    output.progress(&format!("  → Connected to {}", workload.runtime_type()));

    let collaborators = Collaborators {
        workload: Arc::new(workload),
        traffic: Arc::new(HttpTrafficSplitter::new(admin_url)),
        signals: Arc::new(AssumeHealthy),
        prober: Arc::new(HttpProber),
    };
    Ok(Orchestrator::new(config.clone(), collaborators))
}
