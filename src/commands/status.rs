// ABOUTME: Status command implementation.
// ABOUTME: Prints the last recorded deployment for an environment with its metrics.

use chrono::Utc;

use switchyard::config::Config;
use switchyard::error::{Error, Result};
use switchyard::output::Output;
use switchyard::state::StateStore;
use switchyard::types::EnvironmentName;

pub fn status(config: &Config, environment: EnvironmentName, output: &Output) -> Result<()> {
    if config.environment(&environment).is_none() {
        return Err(Error::InvalidConfig(format!(
            "environment {environment} is not configured"
        )));
    }
    let record = StateStore::from_config(config)
        .load(&environment)?
        .ok_or(Error::NoRecord(environment))?;
    output.record(&record.deployment, Some(&record.metrics(Utc::now())));
    Ok(())
}
