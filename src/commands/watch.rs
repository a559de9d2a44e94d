// ABOUTME: Follows a running deployment until its task closes.
// ABOUTME: Reports phase transitions, keeps the state file current and maps Ctrl-C to cancel/shutdown.

use chrono::Utc;
use std::time::Duration;

use switchyard::deploy::{Deployment, DeploymentStatus, Orchestrator};
use switchyard::error::{Error, Result};
use switchyard::output::Output;
use switchyard::state::{StateRecord, StateStore};
use switchyard::types::{DeploymentId, EnvironmentName};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Wait for deployment `id` to close, printing each phase it enters.
///
/// The first Ctrl-C cancels the deployment (it rolls back); the second shuts
/// the orchestrator down and leaves the record for `recover`.
pub async fn follow(
    orchestrator: &Orchestrator,
    store: &StateStore,
    id: &DeploymentId,
    output: &Output,
) -> Result<Deployment> {
    let mut seen = orchestrator.get_deployment(id)?.phases_completed.len();
    let mut interrupts = 0u32;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    let finished = orchestrator.wait(id);
    tokio::pin!(finished);

    loop {
        tokio::select! {
            result = &mut finished => {
                result?;
                report(orchestrator, store, id, &mut seen, output)?;
                break;
            }
            _ = ticker.tick() => {
                report(orchestrator, store, id, &mut seen, output)?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                interrupts += 1;
                if interrupts == 1 {
                    output.warning("Interrupted: rolling back (press Ctrl-C again to abandon)");
                    orchestrator.cancel_deployment(id);
                } else {
                    output.warning("Interrupted again: abandoning; run `switchyard recover` later");
                    orchestrator.shutdown().await;
                }
            }
        }
    }

    Ok(orchestrator.get_deployment(id)?)
}

/// Print phases entered since the last call and persist the record if it moved.
fn report(
    orchestrator: &Orchestrator,
    store: &StateStore,
    id: &DeploymentId,
    seen: &mut usize,
    output: &Output,
) -> Result<()> {
    let Some(record) = StateRecord::capture(orchestrator, id) else {
        return Ok(());
    };
    let phases = &record.deployment.phases_completed;
    if phases.len() == *seen {
        return Ok(());
    }
    for phase in phases.iter().skip(*seen) {
        output.phase(&record.deployment, *phase);
    }
    *seen = phases.len();
    store.save(&record)
}

/// Print the final record and turn any status `accept` rejects into an error.
pub fn conclude(
    orchestrator: &Orchestrator,
    store: &StateStore,
    deployment: &Deployment,
    accept: impl Fn(DeploymentStatus) -> bool,
    output: &Output,
) -> Result<()> {
    let record = StateRecord::capture(orchestrator, &deployment.id)
        .unwrap_or_else(|| StateRecord::new(deployment.clone()));
    store.save(&record)?;
    output.record(&record.deployment, Some(&record.metrics(Utc::now())));

    if !accept(record.deployment.status) {
        return Err(Error::Unsuccessful {
            id: record.deployment.id.clone(),
            status: record.deployment.status,
        });
    }
    Ok(())
}

/// Last saved record for the environment, refusing ones left mid-flight.
pub fn settled_record(
    store: &StateStore,
    environment: &EnvironmentName,
) -> Result<Option<StateRecord>> {
    match store.load(environment)? {
        Some(record) if !record.deployment.is_terminal() => Err(Error::Interrupted {
            id: record.deployment.id,
            environment: environment.clone(),
        }),
        other => Ok(other),
    }
}
