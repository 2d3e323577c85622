//! # Layer Builder
//!
//! Pure mapping from configuration and integration data to the workload's
//! desired process definition, plus the log-target merge against the
//! running plan.
//!
//! Log targets are never deleted: a sink that goes away keeps its
//! `loki-N` key with no services, and comes back under the same key.

use std::collections::BTreeMap;

use crate::constants::{HEALTH_CHECK_NAME, SERVICE_NAME, SERVICE_PORT};
use crate::crd::SiteManagerSpec;
use crate::integrations::{root_path, DatabaseData, ObjectStorageData};
use crate::workload::{Check, HttpCheck, Layer, LogTarget, Override, Service};

/// Inputs to [`build_spec`], borrowed from one reconciliation pass
#[derive(Debug, Clone, Copy)]
pub struct LayerInputs<'a> {
    pub spec: &'a SiteManagerSpec,
    pub database: Option<&'a DatabaseData>,
    pub object_storage: Option<&'a ObjectStorageData>,
    pub ingress_url: Option<&'a str>,
}

/// Desired process definition of the workload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredWorkloadSpec {
    pub command: Vec<String>,
    /// Every key is always present; `None` when the source is unavailable
    pub environment: BTreeMap<String, Option<String>>,
    pub checks: BTreeMap<String, Check>,
    pub log_targets: BTreeMap<String, LogTarget>,
}

impl DesiredWorkloadSpec {
    /// The layer pushed to the runtime
    #[must_use]
    pub fn to_layer(&self) -> Layer {
        let service = Service {
            override_: Override::Replace,
            summary: Some("MAAS Site Manager".to_string()),
            command: Some(self.command.join(" ")),
            startup: Some("enabled".to_string()),
            environment: self.environment.clone(),
        };
        Layer {
            summary: Some("site-manager layer".to_string()),
            description: Some("pebble config layer for site-manager".to_string()),
            services: BTreeMap::from([(SERVICE_NAME.to_string(), service)]),
            checks: self.checks.clone(),
            log_targets: self.log_targets.clone(),
        }
    }
}

/// Launch command, with `--root-path` only when the path is a real prefix
#[must_use]
pub fn build_command(root_path: Option<&str>) -> Vec<String> {
    let mut command: Vec<String> = ["uvicorn", "--host", "0.0.0.0", "--port"]
        .map(String::from)
        .to_vec();
    command.push(SERVICE_PORT.to_string());
    command.extend(["--factory", "--loop", "uvloop"].map(String::from));
    if let Some(path) = root_path.filter(|p| !p.is_empty() && *p != "/") {
        command.push("--root-path".to_string());
        command.push(path.to_string());
    }
    command.push("msm.api:create_app".to_string());
    command
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[must_use]
pub fn build_environment(inputs: &LayerInputs<'_>) -> BTreeMap<String, Option<String>> {
    let db = inputs.database;
    let s3 = inputs.object_storage;
    let spec = inputs.spec;

    [
        ("UVICORN_LOG_LEVEL", Some(spec.log_level.to_lowercase())),
        ("MSM_DB_HOST", db.map(|d| d.host.clone())),
        ("MSM_DB_PORT", db.map(|d| d.port.clone())),
        ("MSM_DB_USER", db.map(|d| d.username.clone())),
        ("MSM_DB_NAME", db.map(|d| d.name.clone())),
        ("MSM_DB_PASSWORD", db.map(|d| d.password.clone())),
        ("MSM_BASE_PATH", inputs.ingress_url.map(ToString::to_string)),
        ("MSM_S3_ACCESS_KEY", s3.map(|s| s.access_key.clone())),
        ("MSM_S3_SECRET_KEY", s3.map(|s| s.secret_key.clone())),
        ("MSM_S3_ENDPOINT", s3.map(|s| s.endpoint.clone())),
        ("MSM_S3_BUCKET", s3.map(|s| s.bucket.clone())),
        ("MSM_S3_PATH", s3.map(|s| s.path.clone())),
        (
            "MSM_TEMPORAL_SERVER_ADDRESS",
            non_empty(&spec.temporal_server_address),
        ),
        ("MSM_TEMPORAL_NAMESPACE", non_empty(&spec.temporal_namespace)),
        ("MSM_TEMPORAL_TASK_QUEUE", non_empty(&spec.temporal_task_queue)),
        (
            "MSM_TEMPORAL_TLS_ROOT_CAS",
            non_empty(&spec.temporal_tls_root_cas),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn health_check() -> Check {
    Check {
        override_: Override::Replace,
        level: Some("alive".to_string()),
        period: Some("10s".to_string()),
        threshold: Some(3),
        http: Some(HttpCheck {
            url: format!("http://localhost:{SERVICE_PORT}/version"),
        }),
    }
}

/// Desired spec without log targets; merge those with [`merge_log_targets`]
#[must_use]
pub fn build_spec(inputs: &LayerInputs<'_>) -> DesiredWorkloadSpec {
    let root = root_path(inputs.ingress_url);
    DesiredWorkloadSpec {
        command: build_command(root.as_deref()),
        environment: build_environment(inputs),
        checks: BTreeMap::from([(HEALTH_CHECK_NAME.to_string(), health_check())]),
        log_targets: BTreeMap::new(),
    }
}

fn next_loki_key(targets: &BTreeMap<String, LogTarget>) -> String {
    let mut index = targets.len();
    loop {
        let key = format!("loki-{index}");
        if !targets.contains_key(&key) {
            return key;
        }
        index += 1;
    }
}

/// Merge the running log targets with the live Loki endpoints
///
/// Live endpoints already present (by location) are re-activated, new ones
/// are appended under the next free `loki-N` key, and targets whose location
/// is no longer live are deactivated but kept.
#[must_use]
pub fn merge_log_targets(
    current: &BTreeMap<String, LogTarget>,
    endpoints: &[String],
) -> BTreeMap<String, LogTarget> {
    let mut merged = current.clone();

    for endpoint in endpoints {
        if let Some(existing) = merged.values_mut().find(|t| t.location == *endpoint) {
            existing.services = vec!["all".to_string()];
        } else {
            let key = next_loki_key(&merged);
            merged.insert(key, LogTarget::loki(endpoint));
        }
    }

    for target in merged.values_mut() {
        target.override_ = Override::Replace;
        if !endpoints.contains(&target.location) {
            target.services.clear();
        }
    }

    merged
}
