//! # SiteManager Spec
//!
//! Application configuration read on every reconciliation pass.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::SiteManagerStatus;

/// SiteManager Custom Resource Definition
///
/// One resource per deployed application, named after the application.
///
/// # Example
///
/// ```yaml
/// apiVersion: site-manager.io/v1
/// kind: SiteManager
/// metadata:
///   name: site-manager
///   namespace: maas
/// spec:
///   logLevel: debug
///   temporalServerAddress: temporal.maas.svc:7233
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "SiteManager",
    group = "site-manager.io",
    version = "v1",
    namespaced,
    status = "SiteManagerStatus",
    shortname = "sm",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.workloadVersion"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SiteManagerSpec {
    /// Workload log level: info, debug, warning, error, critical or trace
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Address of the Temporal server the workload schedules tasks on
    #[serde(default)]
    pub temporal_server_address: String,
    /// Temporal namespace
    #[serde(default = "default_temporal_namespace")]
    pub temporal_namespace: String,
    /// Temporal task queue
    #[serde(default = "default_temporal_task_queue")]
    pub temporal_task_queue: String,
    /// PEM bundle overriding the trust roots used to reach Temporal
    #[serde(default)]
    pub temporal_tls_root_cas: String,
    /// Whether a Temporal server address must be set before the workload goes active
    #[serde(default = "default_true")]
    pub temporal_required: bool,
}

impl Default for SiteManagerSpec {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            temporal_server_address: String::new(),
            temporal_namespace: default_temporal_namespace(),
            temporal_task_queue: default_temporal_task_queue(),
            temporal_tls_root_cas: String::new(),
            temporal_required: true,
        }
    }
}

#[must_use]
pub fn default_log_level() -> String {
    "info".to_string()
}

#[must_use]
pub fn default_temporal_namespace() -> String {
    "default".to_string()
}

#[must_use]
pub fn default_temporal_task_queue() -> String {
    "msm-tasks".to_string()
}

#[must_use]
pub fn default_true() -> bool {
    true
}
