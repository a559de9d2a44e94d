// ABOUTME: Library root for switchyard - blue/green release orchestration.
// ABOUTME: The CLI binary is in main.rs; collaborators plug in through the traits exported here.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
mod http;
pub mod output;
pub mod state;
pub mod traffic;
pub mod types;
pub mod workload;
