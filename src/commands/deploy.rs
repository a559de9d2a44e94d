// ABOUTME: Deploy command implementation.
// ABOUTME: Starts one deployment in-process and follows it to a terminal state.

use super::connection::connect_orchestrator;
use super::watch::{conclude, follow, settled_record};
use switchyard::config::Config;
use switchyard::deploy::DeploymentStatus;
use switchyard::error::Result;
use switchyard::output::Output;
use switchyard::state::{StateRecord, StateStore};
use switchyard::types::EnvironmentName;

/// Release `version` to `environment` through the configured ramp.
pub async fn deploy(
    config: Config,
    environment: EnvironmentName,
    version: String,
    initial_traffic: u8,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let store = StateStore::from_config(&config);
    let previous = settled_record(&store, &environment)?;

    output.progress(&format!(
        "Deploying {} ({}) to {}",
        version, config.image, environment
    ));
    let orchestrator = connect_orchestrator(&config, &output).await?;

    // Carry the active color forward from the last release.
    if let Some(previous) = previous {
        previous.recover_into(&orchestrator)?;
    }

    let deployment = orchestrator.start_deployment(&version, &environment, initial_traffic)?;
    output.progress(&format!(
        "  → Deployment {} targets {}",
        deployment.id,
        deployment.candidate_color()
    ));
    store.save(&StateRecord::new(deployment.clone()))?;

    let deployment = follow(&orchestrator, &store, &deployment.id, &output).await?;
    conclude(
        &orchestrator,
        &store,
        &deployment,
        |status| status == DeploymentStatus::Completed,
        &output,
    )?;

    output.success("Deployment complete!");
    Ok(())
}
