// ABOUTME: Per-environment state file holding the latest deployment record and its histories.
// ABOUTME: Writes go to a temp file first and are renamed into place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::deploy::{
    DeployError, Deployment, DeploymentMetrics, HealthCheckResult, Orchestrator,
    TrafficSwitchResult,
};
use crate::error::Result;
use crate::types::{DeploymentId, EnvironmentName};

/// Contents of one state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub deployment: Deployment,
    #[serde(default)]
    pub health_history: Vec<HealthCheckResult>,
    #[serde(default)]
    pub switch_history: Vec<TrafficSwitchResult>,
}

impl StateRecord {
    pub fn new(deployment: Deployment) -> Self {
        Self {
            deployment,
            health_history: Vec::new(),
            switch_history: Vec::new(),
        }
    }

    /// Capture a deployment and its histories from the orchestrator.
    pub fn capture(orchestrator: &Orchestrator, id: &DeploymentId) -> Option<Self> {
        Some(Self {
            deployment: orchestrator.get_deployment(id).ok()?,
            health_history: orchestrator.health_history(id).ok()?,
            switch_history: orchestrator.switch_history(id).ok()?,
        })
    }

    pub fn metrics(&self, now: DateTime<Utc>) -> DeploymentMetrics {
        DeploymentMetrics::compute(
            &self.deployment,
            &self.health_history,
            &self.switch_history,
            now,
        )
    }

    /// Hand the record back to an orchestrator for re-evaluation.
    pub fn recover_into(
        self,
        orchestrator: &Orchestrator,
    ) -> std::result::Result<Deployment, DeployError> {
        orchestrator.recover_with_history(self.deployment, self.health_history, self.switch_history)
    }
}

/// Directory of `<environment>.json` files, one record each.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.state_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, environment: &EnvironmentName) -> PathBuf {
        self.dir.join(format!("{environment}.json"))
    }

    /// Latest record for `environment`, or `None` if nothing was saved yet.
    pub fn load(&self, environment: &EnvironmentName) -> Result<Option<StateRecord>> {
        let path = self.path(environment);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, record: &StateRecord) -> Result<()> {
        let deployment = &record.deployment;
        fs::create_dir_all(&self.dir)?;
        let path = self.path(&deployment.environment);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            deployment = %deployment.id,
            path = %path.display(),
            status = %deployment.status,
            "state saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, ImageRef};

    fn record(env: &str) -> StateRecord {
        StateRecord::new(Deployment::new(
            "1.2.0".to_string(),
            EnvironmentName::new(env).unwrap(),
            ImageRef::parse("registry.example.com/app:1.2.0").unwrap(),
            Color::Blue,
            0,
        ))
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let env = EnvironmentName::new("staging").unwrap();
        assert!(store.load(&env).unwrap().is_none());
    }

    #[test]
    fn save_creates_directory_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state"));
        let record = record("production");

        store.save(&record).unwrap();

        let loaded = store.load(&record.deployment.environment).unwrap().unwrap();
        assert_eq!(loaded.deployment.id, record.deployment.id);
        assert_eq!(loaded.deployment.phase, record.deployment.phase);
        assert!(loaded.health_history.is_empty());
        assert!(!store.dir().join("production.json.tmp").exists());
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let first = record("production");
        let second = record("production");

        store.save(&first).unwrap();
        store.save(&second).unwrap();

        let loaded = store.load(&first.deployment.environment).unwrap().unwrap();
        assert_eq!(loaded.deployment.id, second.deployment.id);
    }

    #[test]
    fn histories_default_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let record = record("production");
        let json = serde_json::json!({ "deployment": record.deployment });
        fs::write(
            store.path(&record.deployment.environment),
            json.to_string(),
        )
        .unwrap();

        let loaded = store.load(&record.deployment.environment).unwrap().unwrap();
        assert!(loaded.switch_history.is_empty());
        assert_eq!(loaded.metrics(Utc::now()).traffic_switches_total, 0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let env = EnvironmentName::new("production").unwrap();
        fs::write(store.path(&env), "{not json").unwrap();
        assert!(store.load(&env).is_err());
    }
}
