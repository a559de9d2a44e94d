// ABOUTME: Per-environment leases preventing concurrent deployments to the same environment.
// ABOUTME: Check-and-set under one mutex; the lease releases itself on drop.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{DeploymentId, EnvironmentName};

use super::error::{DeployError, LockHolderInfo};

impl LockHolderInfo {
    /// Holder info for the current process.
    pub fn current(deployment_id: DeploymentId) -> Self {
        Self {
            deployment_id,
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }
}

/// Lease table keyed by environment.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentLocks {
    held: Arc<Mutex<HashMap<EnvironmentName, LockHolderInfo>>>,
}

impl EnvironmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `environment` for `deployment_id`.
    ///
    /// Fails with [`DeployError::Conflict`] carrying the current holder when the
    /// environment is already leased.
    pub fn acquire(
        &self,
        environment: &EnvironmentName,
        deployment_id: &DeploymentId,
    ) -> Result<EnvironmentLease, DeployError> {
        let mut held = self.held.lock();
        if let Some(existing) = held.get(environment) {
            return Err(DeployError::conflict(environment.clone(), existing.clone()));
        }

        held.insert(
            environment.clone(),
            LockHolderInfo::current(deployment_id.clone()),
        );
        tracing::debug!(%environment, deployment = %deployment_id, "environment lease acquired");

        Ok(EnvironmentLease {
            locks: self.clone(),
            environment: environment.clone(),
            deployment_id: deployment_id.clone(),
        })
    }

    pub fn holder(&self, environment: &EnvironmentName) -> Option<LockHolderInfo> {
        self.held.lock().get(environment).cloned()
    }

    fn release(&self, environment: &EnvironmentName, deployment_id: &DeploymentId) {
        let mut held = self.held.lock();
        if held
            .get(environment)
            .is_some_and(|info| &info.deployment_id == deployment_id)
        {
            held.remove(environment);
            tracing::debug!(%environment, deployment = %deployment_id, "environment lease released");
        }
    }
}

/// A held environment lease that releases on drop.
pub struct EnvironmentLease {
    locks: EnvironmentLocks,
    environment: EnvironmentName,
    deployment_id: DeploymentId,
}

impl std::fmt::Debug for EnvironmentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentLease")
            .field("environment", &self.environment)
            .field("deployment_id", &self.deployment_id)
            .finish()
    }
}

impl EnvironmentLease {
    pub fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }
}

impl Drop for EnvironmentLease {
    fn drop(&mut self) {
        self.locks.release(&self.environment, &self.deployment_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::DeployErrorKind;

    fn env(name: &str) -> EnvironmentName {
        EnvironmentName::new(name).unwrap()
    }

    #[test]
    fn holder_info_uses_current_host_and_pid() {
        let info = LockHolderInfo::current(DeploymentId::new("d".to_string()));
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn second_acquire_conflicts_with_holder() {
        let locks = EnvironmentLocks::new();
        let first = DeploymentId::generate();
        let _lease = locks.acquire(&env("prod"), &first).unwrap();

        let err = locks
            .acquire(&env("prod"), &DeploymentId::generate())
            .unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::Conflict);
        assert_eq!(err.lock_holder_info().unwrap().deployment_id, first);
    }

    #[test]
    fn other_environments_are_independent() {
        let locks = EnvironmentLocks::new();
        let _prod = locks.acquire(&env("prod"), &DeploymentId::generate()).unwrap();
        assert!(locks.acquire(&env("staging"), &DeploymentId::generate()).is_ok());
    }

    #[test]
    fn dropping_lease_releases_environment() {
        let locks = EnvironmentLocks::new();
        let lease = locks.acquire(&env("prod"), &DeploymentId::generate()).unwrap();
        assert!(locks.holder(&env("prod")).is_some());

        drop(lease);
        assert!(locks.holder(&env("prod")).is_none());
        assert!(locks.acquire(&env("prod"), &DeploymentId::generate()).is_ok());
    }
}
