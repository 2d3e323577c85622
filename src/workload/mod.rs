//! # Workload
//!
//! The subset of the workload container runtime the operator depends on.
//!
//! - `layer.rs` - Pebble layer and plan model
//! - `pebble.rs` - Pebble HTTP API client (layers, plan, services, checks)
//! - `exec.rs` - Command execution inside the workload container via pod exec
//! - `sidecar.rs` - [`Workload`] implementation combining both

mod exec;
mod layer;
mod pebble;
mod sidecar;

pub use exec::PodExec;
pub use layer::{Check, HttpCheck, Layer, LogTarget, Override, Service};
pub use pebble::PebbleClient;
pub use sidecar::SidecarWorkload;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("Pebble API unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("Pebble API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Failed to decode Pebble response: {0}")]
    Decode(String),
    #[error("Exec in workload container failed: {0}")]
    Exec(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Run state of a Pebble service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Active,
    Inactive,
    Backoff,
    Error,
}

impl ServiceStatus {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => ServiceStatus::Active,
            "backoff" => ServiceStatus::Backoff,
            "error" => ServiceStatus::Error,
            _ => ServiceStatus::Inactive,
        }
    }
}

/// Result of a Pebble health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Up,
    Down,
}

/// Captured result of a command run in the workload container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Container runtime capability used by the reconciler and actions
#[async_trait]
pub trait Workload: Send + Sync {
    /// Whether the runtime API answers
    async fn can_connect(&self) -> bool;

    /// Add a layer to the plan; `combine` merges with an existing layer of the same label
    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool)
        -> Result<(), WorkloadError>;

    /// The combined plan as the runtime currently sees it
    async fn plan(&self) -> Result<Layer, WorkloadError>;

    /// Run state of a service, `None` when the plan does not declare it
    async fn service_status(&self, service: &str) -> Result<Option<ServiceStatus>, WorkloadError>;

    async fn restart(&self, service: &str) -> Result<(), WorkloadError>;

    /// Status of a health check, `None` when the plan does not declare it
    async fn check_status(&self, check: &str) -> Result<Option<CheckStatus>, WorkloadError>;

    /// Run a command to completion, optionally with the environment of a service
    async fn exec(
        &self,
        command: &[String],
        service_context: Option<&str>,
    ) -> Result<ExecOutput, WorkloadError>;

    /// File contents, `None` when the file does not exist
    async fn pull(&self, path: &str) -> Result<Option<String>, WorkloadError>;

    /// Write a file, creating parent directories
    async fn push(&self, path: &str, content: &str) -> Result<(), WorkloadError>;

    /// Names of the entries in a directory, empty when it does not exist
    async fn list_files(&self, dir: &str) -> Result<Vec<String>, WorkloadError>;

    async fn remove(&self, path: &str) -> Result<(), WorkloadError>;
}
