//! # Reconciler
//!
//! Converges the workload on every lifecycle event and maps the outcome onto
//! the operator status.
//!
//! ## Reconciliation Flow
//!
//! 1. Validate configuration (log level)
//! 2. Require a reachable workload runtime
//! 3. Mirror CA-transfer trust anchors and refresh the tracing exporter
//! 4. Gather integration data; stop on the first required one not ready
//! 5. Sync TLS key material
//! 6. Build the layer, merge log targets, apply and restart when the plan or
//!    the TLS files changed
//! 7. On a healthy check: record the version, bootstrap the operator user, go active
//!
//! Only [`Operator`] changes the status. Events other than the reconcile
//! triggers run a narrower handler (trust sync, tracing, enrollment).

mod reconcile;
mod types;

pub use types::{Context, IntegrationKind, OperatorError, OperatorStatus, StatusSink};

use tracing::{debug, info_span, warn, Instrument};

use super::enroll::{publish_enroll_token, remove_enrolled_site};
use super::events::{Event, Outcome};
use super::trust::sync_trust_bundle;
use crate::crd::SiteManagerSpec;
use crate::observability::metrics;

/// Status message while the health check is not up
pub const SERVICE_UNAVAILABLE: &str = "Waiting for msm service to become available";

/// Status message while the runtime API does not answer
pub const RUNTIME_UNREACHABLE: &str = "waiting for Pebble API";

/// One operator replica: its capabilities, current configuration and status
pub struct Operator {
    ctx: Context,
    spec: SiteManagerSpec,
    status: OperatorStatus,
    /// TLS files were rewritten and the service has not been restarted since
    tls_restart_pending: bool,
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("ctx", &self.ctx)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Operator {
    #[must_use]
    pub fn new(ctx: Context, spec: SiteManagerSpec) -> Self {
        Self {
            ctx,
            spec,
            status: OperatorStatus::Maintenance("Starting".to_string()),
            tls_restart_pending: false,
        }
    }

    #[must_use]
    pub fn status(&self) -> &OperatorStatus {
        &self.status
    }

    #[must_use]
    pub fn spec(&self) -> &SiteManagerSpec {
        &self.spec
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    async fn set_status(&mut self, status: OperatorStatus) {
        if self.status == status {
            return;
        }
        debug!("Status {} -> {}", self.status, status);
        self.status = status;
        self.ctx.status.publish(&self.status).await;
    }

    async fn waiting(&mut self, message: &str) -> Outcome {
        self.set_status(OperatorStatus::Waiting(message.to_string()))
            .await;
        Outcome::Waiting(message.to_string())
    }

    /// Handle one event to completion
    pub async fn handle(&mut self, event: &Event) -> Outcome {
        let span = info_span!(
            "reconcile",
            event = event.name(),
            app = %self.ctx.app_name,
            leader = self.ctx.leadership.is_leader()
        );
        let outcome = self.dispatch(event).instrument(span).await;
        metrics::increment_outcome(outcome.kind());
        outcome
    }

    async fn dispatch(&mut self, event: &Event) -> Outcome {
        match event {
            Event::ConfigChanged(spec) => {
                self.spec = spec.clone();
                self.reconcile().await
            }
            Event::WorkloadReady
            | Event::CheckRecovered
            | Event::DatabaseCreated
            | Event::DatabaseEndpointsChanged
            | Event::LoggingEndpointsChanged
            | Event::IngressReady { .. }
            | Event::IngressRevoked
            | Event::CertificatesChanged
            | Event::ObjectStorageChanged
            | Event::LeaderElected => self.reconcile().await,
            Event::DatabaseBroken => {
                self.waiting(IntegrationKind::Database.waiting_message())
                    .await
            }
            Event::CheckFailed => self.waiting(SERVICE_UNAVAILABLE).await,
            Event::CaTransferChanged { .. } => self.sync_trust(None).await,
            Event::CaTransferRemoved { relation_id } => self.sync_trust(Some(*relation_id)).await,
            Event::TracingChanged => match self.sync_tracing().await {
                Ok(()) => Outcome::Applied,
                Err(e) => {
                    warn!("Tracing sync failed: {}", e);
                    Outcome::Deferred(e.to_string())
                }
            },
            Event::EnrollJoined { relation_id } => {
                publish_enroll_token(&self.ctx, *relation_id).await
            }
            Event::EnrollBroken {
                relation_id,
                cluster_id,
            } => remove_enrolled_site(&self.ctx, *relation_id, cluster_id.as_deref()).await,
        }
    }

    /// Trust-store changes never change the status; a failed sync is redelivered
    async fn sync_trust(&self, departing: Option<u32>) -> Outcome {
        match sync_trust_bundle(&self.ctx, departing).await {
            Ok(_) => Outcome::Applied,
            Err(e) => {
                warn!("Trust bundle sync failed: {}", e);
                Outcome::Deferred(e.to_string())
            }
        }
    }
}
