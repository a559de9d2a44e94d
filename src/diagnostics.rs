// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Warnings ride along on the deployment record so callers can see them after the fact.

use serde::{Deserialize, Serialize};

/// Collects non-fatal warnings raised while a deployment runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    ///
    /// Critical alerts are logged at error level.
    pub fn warn(&mut self, warning: Warning) {
        match warning.kind {
            WarningKind::CriticalAlert => {
                tracing::error!(kind = %warning.kind, "{}", warning.message)
            }
            _ => tracing::warn!(kind = %warning.kind, "{}", warning.message),
        }
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_kind(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Scaling down the old color after cutover failed.
    pub fn cleanup_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CleanupFailed,
            message: message.into(),
        }
    }

    /// Scaling down the candidate after a rollback failed.
    pub fn scale_down_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ScaleDownFailed,
            message: message.into(),
        }
    }

    /// Traffic is in a state that needs an operator.
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CriticalAlert,
            message: message.into(),
        }
    }

    /// The run stopped mid-phase because the process shut down.
    pub fn abandoned(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Abandoned,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Old color could not be scaled to zero; it may still hold resources.
    CleanupFailed,
    /// Candidate could not be scaled to zero after a rollback.
    ScaleDownFailed,
    /// Traffic revert failed; manual intervention required.
    CriticalAlert,
    /// Run stopped by shutdown; collaborators may be mid-change.
    Abandoned,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::CleanupFailed => "cleanup_failed",
            WarningKind::ScaleDownFailed => "scale_down_failed",
            WarningKind::CriticalAlert => "critical",
            WarningKind::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
