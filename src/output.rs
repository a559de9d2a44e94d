// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::deploy::{Deployment, DeploymentMetrics, Phase};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Report that a deployment entered `phase`.
    pub fn phase(&self, deployment: &Deployment, phase: Phase) {
        match self.mode {
            OutputMode::Normal => println!(
                "  → {phase} ({}, traffic {})",
                deployment.status, deployment.current_traffic
            ),
            OutputMode::Quiet => {}
            OutputMode::Json => emit(&JsonEvent {
                event: "phase",
                message: phase.as_str(),
                duration_secs: self.duration(),
                deployment: Some(deployment),
                metrics: None,
            }),
        }
    }

    /// Print a warning (suppressed in quiet mode).
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => emit_err(&JsonEvent {
                event: "warning",
                message,
                duration_secs: None,
                deployment: None,
                metrics: None,
            }),
        }
    }

    /// Print a deployment record, with metrics when available.
    pub fn record(&self, deployment: &Deployment, metrics: Option<&DeploymentMetrics>) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                println!("Deployment:  {}", deployment.id);
                println!("Environment: {}", deployment.environment);
                println!("Version:     {}", deployment.version);
                println!("Status:      {} ({})", deployment.status, deployment.phase);
                println!(
                    "Active:      {} (candidate {})",
                    deployment.active_color,
                    deployment.candidate_color()
                );
                println!("Traffic:     {}", deployment.current_traffic);
                println!("Rollback:    {}", availability(deployment.rollback_available));
                if let Some(ref error) = deployment.error {
                    println!("Error:       {error}");
                }
                for warning in deployment.warnings.warnings() {
                    println!("Warning:     [{}] {}", warning.kind, warning.message);
                }
                if let Some(m) = metrics {
                    println!("Duration:    {:.1} min", m.duration_minutes);
                    println!(
                        "Health:      {} checks, {:.0}% healthy, {:.0} ms avg",
                        m.health_checks_total,
                        m.health_success_rate * 100.0,
                        m.average_response_time_ms
                    );
                    println!(
                        "Switches:    {}/{} succeeded, {:.0} ms avg",
                        m.traffic_switches_successful,
                        m.traffic_switches_total,
                        m.average_switch_time_ms
                    );
                }
            }
            OutputMode::Json => emit(&JsonEvent {
                event: "record",
                message: deployment.status.as_str(),
                duration_secs: self.duration(),
                deployment: Some(deployment),
                metrics,
            }),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                // Print only the essential result
                println!("{message}");
            }
            OutputMode::Json => emit(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
                deployment: None,
                metrics: None,
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => emit_err(&JsonEvent {
                event: "error",
                message,
                duration_secs: self.duration(),
                deployment: None,
                metrics: None,
            }),
        }
    }
}

fn availability(available: bool) -> &'static str {
    if available { "available" } else { "unavailable" }
}

fn emit(event: &JsonEvent<'_>) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

fn emit_err(event: &JsonEvent<'_>) {
    if let Ok(json) = serde_json::to_string(event) {
        eprintln!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment: Option<&'a Deployment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<&'a DeploymentMetrics>,
}
