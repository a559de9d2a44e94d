// ABOUTME: Recover command implementation.
// ABOUTME: Re-evaluates a saved record after the process that ran it went away.

use chrono::Utc;

use super::connection::connect_orchestrator;
use super::watch::{conclude, follow};
use switchyard::config::Config;
use switchyard::error::{Error, Result};
use switchyard::output::Output;
use switchyard::state::StateStore;
use switchyard::types::EnvironmentName;

pub async fn recover(config: Config, environment: EnvironmentName, mut output: Output) -> Result<()> {
    output.start_timer();
    let store = StateStore::from_config(&config);
    let record = store
        .load(&environment)?
        .ok_or_else(|| Error::NoRecord(environment.clone()))?;

    if record.deployment.is_terminal() {
        output.record(&record.deployment, Some(&record.metrics(Utc::now())));
        output.success("Nothing to recover");
        return Ok(());
    }

    output.progress(&format!(
        "Recovering deployment {} (stopped in {})",
        record.deployment.id, record.deployment.phase
    ));
    let orchestrator = connect_orchestrator(&config, &output).await?;
    let id = record.deployment.id.clone();
    record.recover_into(&orchestrator)?;

    let deployment = follow(&orchestrator, &store, &id, &output).await?;
    conclude(
        &orchestrator,
        &store,
        &deployment,
        |status| status.is_terminal(),
        &output,
    )?;

    output.success(&format!("Recovered: {}", deployment.status));
    Ok(())
}
