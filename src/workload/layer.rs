//! # Pebble Layer
//!
//! Serde model of a Pebble layer and of the plan Pebble reports back.
//! Field names follow the Pebble YAML schema (`log-targets`, `override`, `type`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a layer entry merges with the same entry in lower layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    #[default]
    Replace,
    Merge,
}

/// A Pebble layer, also used for the combined plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, Service>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, Check>,
    #[serde(
        default,
        rename = "log-targets",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub log_targets: BTreeMap<String, LogTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "override", default)]
    pub override_: Override,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<String>,
    /// Every key the workload understands is always present; unavailable values are null
    #[serde(default)]
    pub environment: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Check {
    #[serde(rename = "override", default)]
    pub override_: Override,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpCheck>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpCheck {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTarget {
    #[serde(rename = "override", default)]
    pub override_: Override,
    #[serde(rename = "type")]
    pub type_: String,
    pub location: String,
    /// `["all"]` forwards every service, empty keeps the target but forwards nothing
    #[serde(default)]
    pub services: Vec<String>,
}

impl LogTarget {
    #[must_use]
    pub fn loki(location: &str) -> Self {
        Self {
            override_: Override::Replace,
            type_: "loki".to_string(),
            location: location.to_string(),
            services: vec!["all".to_string()],
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.services.is_empty()
    }
}
