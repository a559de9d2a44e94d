// ABOUTME: Switch command implementation.
// ABOUTME: Applies an operator-chosen blue/green split to the last completed deployment.

use super::connection::connect_orchestrator;
use super::watch::settled_record;
use switchyard::config::Config;
use switchyard::error::{Error, Result};
use switchyard::output::Output;
use switchyard::state::{StateRecord, StateStore};
use switchyard::types::{EnvironmentName, TrafficSplit};

pub async fn switch(
    config: Config,
    environment: EnvironmentName,
    blue: u8,
    green: u8,
    mut output: Output,
) -> Result<()> {
    let split = TrafficSplit::new(blue, green)?;
    output.start_timer();
    let store = StateStore::from_config(&config);
    let record =
        settled_record(&store, &environment)?.ok_or_else(|| Error::NoRecord(environment.clone()))?;
    let id = record.deployment.id.clone();

    output.progress(&format!("Switching {environment} traffic to {split}"));
    let orchestrator = connect_orchestrator(&config, &output).await?;
    record.recover_into(&orchestrator)?;

    let applied = orchestrator.manual_traffic_switch(&id, split).await;
    if let Some(record) = StateRecord::capture(&orchestrator, &id) {
        store.save(&record)?;
    }
    if !applied {
        return Err(Error::SwitchRefused(id));
    }

    output.success(&format!("Traffic for {environment} set to {split}"));
    Ok(())
}
