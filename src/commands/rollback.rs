// ABOUTME: Rollback command implementation.
// ABOUTME: Reverts the last completed deployment to the color it replaced.

use super::connection::connect_orchestrator;
use super::watch::{conclude, follow, settled_record};
use switchyard::config::Config;
use switchyard::deploy::DeploymentStatus;
use switchyard::error::{Error, Result};
use switchyard::output::Output;
use switchyard::state::StateStore;
use switchyard::types::EnvironmentName;

pub async fn rollback(config: Config, environment: EnvironmentName, mut output: Output) -> Result<()> {
    output.start_timer();
    let store = StateStore::from_config(&config);
    let record =
        settled_record(&store, &environment)?.ok_or_else(|| Error::NoRecord(environment.clone()))?;
    let id = record.deployment.id.clone();

    output.progress(&format!(
        "Rolling back deployment {} ({}) in {}",
        id, record.deployment.version, environment
    ));
    let orchestrator = connect_orchestrator(&config, &output).await?;
    record.recover_into(&orchestrator)?;

    if !orchestrator.trigger_rollback(&id) {
        return Err(Error::RollbackRefused(id));
    }

    let deployment = follow(&orchestrator, &store, &id, &output).await?;
    conclude(
        &orchestrator,
        &store,
        &deployment,
        |status| status == DeploymentStatus::RolledBack,
        &output,
    )?;

    output.success("Rollback complete!");
    Ok(())
}
