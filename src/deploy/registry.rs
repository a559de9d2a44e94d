// ABOUTME: In-memory store of deployment records and their probe/switch histories.
// ABOUTME: Readers take a short read lock and clone; only a deployment's own task writes.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::{DeploymentId, EnvironmentName};

use super::model::{
    Deployment, DeploymentStatus, HealthCheckResult, TrafficSwitchResult,
};

#[derive(Debug, Clone)]
struct Entry {
    deployment: Deployment,
    health_history: Vec<HealthCheckResult>,
    switch_history: Vec<TrafficSwitchResult>,
}

/// Filter for [`DeploymentRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub environment: Option<EnvironmentName>,
    pub status: Option<DeploymentStatus>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn environment(environment: EnvironmentName) -> Self {
        Self {
            environment: Some(environment),
            ..Self::default()
        }
    }

    fn matches(&self, deployment: &Deployment) -> bool {
        self.environment
            .as_ref()
            .is_none_or(|env| &deployment.environment == env)
            && self.status.is_none_or(|status| deployment.status == status)
    }
}

#[derive(Debug, Default)]
pub struct DeploymentRegistry {
    entries: RwLock<HashMap<DeploymentId, Entry>>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, deployment: Deployment) {
        self.insert_with_history(deployment, Vec::new(), Vec::new());
    }

    pub(crate) fn insert_with_history(
        &self,
        deployment: Deployment,
        health_history: Vec<HealthCheckResult>,
        switch_history: Vec<TrafficSwitchResult>,
    ) {
        self.entries.write().insert(
            deployment.id.clone(),
            Entry {
                deployment,
                health_history,
                switch_history,
            },
        );
    }

    pub fn get(&self, id: &DeploymentId) -> Option<Deployment> {
        self.entries.read().get(id).map(|e| e.deployment.clone())
    }

    pub fn contains(&self, id: &DeploymentId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Matching deployments, newest first.
    pub fn list(&self, filter: &ListFilter) -> Vec<Deployment> {
        let mut matched: Vec<Deployment> = self
            .entries
            .read()
            .values()
            .filter(|e| filter.matches(&e.deployment))
            .map(|e| e.deployment.clone())
            .collect();
        matched.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    pub fn health_history(&self, id: &DeploymentId) -> Option<Vec<HealthCheckResult>> {
        self.entries.read().get(id).map(|e| e.health_history.clone())
    }

    pub fn switch_history(&self, id: &DeploymentId) -> Option<Vec<TrafficSwitchResult>> {
        self.entries.read().get(id).map(|e| e.switch_history.clone())
    }

    /// Record plus both histories, taken under one lock.
    pub(crate) fn entry(
        &self,
        id: &DeploymentId,
    ) -> Option<(Deployment, Vec<HealthCheckResult>, Vec<TrafficSwitchResult>)> {
        self.entries.read().get(id).map(|e| {
            (
                e.deployment.clone(),
                e.health_history.clone(),
                e.switch_history.clone(),
            )
        })
    }

    /// Apply `f` to the record and return the updated snapshot.
    pub(crate) fn update<R>(
        &self,
        id: &DeploymentId,
        f: impl FnOnce(&mut Deployment) -> R,
    ) -> Option<R> {
        self.entries.write().get_mut(id).map(|e| f(&mut e.deployment))
    }

    pub(crate) fn append_health(&self, id: &DeploymentId, results: &[HealthCheckResult]) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.health_history.extend_from_slice(results);
        }
    }

    pub(crate) fn append_switch(&self, id: &DeploymentId, result: TrafficSwitchResult) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.switch_history.push(result);
        }
    }

    /// Every record, oldest first.
    pub fn export(&self) -> Vec<Deployment> {
        let mut all: Vec<Deployment> = self
            .entries
            .read()
            .values()
            .map(|e| e.deployment.clone())
            .collect();
        all.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        all
    }
}
