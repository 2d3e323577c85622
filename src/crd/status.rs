//! # SiteManager Status
//!
//! Status published by the operator after each reconciliation pass.

use serde::{Deserialize, Serialize};

/// Status of the SiteManager resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SiteManagerStatus {
    /// Operator status: Maintenance, Blocked, Waiting or Active
    #[serde(default)]
    pub phase: Option<String>,
    /// Stable, human-readable reason for the current phase
    /// Examples: "Waiting for database relation", "invalid log level: 'verbose'"
    #[serde(default)]
    pub message: Option<String>,
    /// Version reported by the running workload
    #[serde(default)]
    pub workload_version: Option<String>,
    /// Replica that published this status
    #[serde(default)]
    pub reported_by: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last reconciliation time (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
