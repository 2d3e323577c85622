//! # Status Writer
//!
//! [`StatusSink`] backed by the `SiteManager` status subresource. Only the
//! leader writes; a patch is skipped when nothing it carries changed.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::constants::FIELD_MANAGER;
use crate::controller::{OperatorStatus, StatusSink};
use crate::crd::{Condition, SiteManager};
use crate::store::Leadership;

/// `Ready` condition derived from an operator status
#[must_use]
pub fn ready_condition(status: &OperatorStatus, now: &str) -> Condition {
    let ready = matches!(status, OperatorStatus::Active);
    Condition {
        r#type: "Ready".to_string(),
        status: if ready { "True" } else { "False" }.to_string(),
        last_transition_time: Some(now.to_string()),
        reason: Some(status.phase().to_string()),
        message: Some(status.message().to_string()),
    }
}

pub struct KubeStatusSink {
    api: Api<SiteManager>,
    name: String,
    reporter: String,
    leadership: Arc<dyn Leadership>,
    generation: AtomicI64,
    last_status: Mutex<Option<OperatorStatus>>,
    last_version: Mutex<Option<String>>,
}

impl std::fmt::Debug for KubeStatusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStatusSink")
            .field("name", &self.name)
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl KubeStatusSink {
    #[must_use]
    pub fn new(
        api: Api<SiteManager>,
        name: &str,
        reporter: &str,
        leadership: Arc<dyn Leadership>,
    ) -> Self {
        Self {
            api,
            name: name.to_string(),
            reporter: reporter.to_string(),
            leadership,
            generation: AtomicI64::new(0),
            last_status: Mutex::new(None),
            last_version: Mutex::new(None),
        }
    }

    /// Latest `metadata.generation` seen on the resource
    pub fn observe_generation(&self, generation: i64) {
        self.generation.store(generation, Ordering::Relaxed);
    }

    async fn patch(&self, status: serde_json::Value) -> Result<(), kube::Error> {
        self.api
            .patch_status(
                &self.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&json!({ "status": status })),
            )
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl StatusSink for KubeStatusSink {
    async fn publish(&self, status: &OperatorStatus) {
        if !self.leadership.is_leader() {
            debug!("Status {} (not published by a follower)", status);
            return;
        }
        let mut last = self.last_status.lock().await;
        if last.as_ref() == Some(status) {
            return;
        }

        let now = chrono::Utc::now().to_rfc3339();
        let generation = self.generation.load(Ordering::Relaxed);
        let body = json!({
            "phase": status.phase(),
            "message": status.message(),
            "reportedBy": self.reporter,
            "conditions": [ready_condition(status, &now)],
            "observedGeneration": (generation > 0).then_some(generation),
            "lastReconcileTime": now,
        });
        match self.patch(body).await {
            Ok(()) => *last = Some(status.clone()),
            Err(e) => warn!("Failed to publish status '{}': {}", status, e),
        }
    }

    async fn set_workload_version(&self, version: &str) {
        if !self.leadership.is_leader() {
            return;
        }
        let mut last = self.last_version.lock().await;
        if last.as_deref() == Some(version) {
            return;
        }
        match self.patch(json!({ "workloadVersion": version })).await {
            Ok(()) => *last = Some(version.to_string()),
            Err(e) => warn!("Failed to publish workload version: {}", e),
        }
    }
}
