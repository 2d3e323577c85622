//! # Reconciliation Pass
//!
//! The full pass and the healthy-workload follow-up, as methods of
//! [`Operator`]. Each stage returns early through [`OperatorError`]; the error
//! decides the outcome and the status.

use std::time::Instant;
use tracing::{error, info, warn};

use super::{
    IntegrationKind, Operator, OperatorError, OperatorStatus, RUNTIME_UNREACHABLE,
    SERVICE_UNAVAILABLE,
};
use crate::constants::{
    DATABASE_ENDPOINT, HEALTH_CHECK_NAME, INGRESS_ENDPOINT, LAYER_LABEL, LOGGING_ENDPOINT,
    OBJECT_STORAGE_ENDPOINT, SERVICE_NAME, TRACING_ENDPOINT, VALID_LOG_LEVELS,
};
use crate::controller::bootstrap::{bootstrap_admin, bootstrap_required};
use crate::controller::events::Outcome;
use crate::controller::layer::{build_spec, merge_log_targets, LayerInputs};
use crate::controller::tls::sync_tls;
use crate::controller::trust::sync_trust_bundle;
use crate::integrations::{
    ingress_url, loki_endpoints, otlp_http_endpoint, read_database, read_object_storage,
    requested_receivers, IntegrationData, RECEIVERS_KEY,
};
use crate::observability::metrics;
use crate::workload::{CheckStatus, ServiceStatus};

const TEMPORAL_ADDRESS_REQUIRED: &str = "temporal-server-address configuration is required";

impl Operator {
    /// Run one reconciliation pass
    pub(super) async fn reconcile(&mut self) -> Outcome {
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = self.reconcile_pass().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => self.outcome_for(e).await,
        };

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        info!(
            "Reconciliation finished: {} ({})",
            outcome.kind(),
            self.status
        );
        outcome
    }

    async fn outcome_for(&mut self, err: OperatorError) -> Outcome {
        match err {
            OperatorError::ConfigurationInvalid(message) => {
                self.set_status(OperatorStatus::Blocked(message.clone()))
                    .await;
                Outcome::Blocked(message)
            }
            OperatorError::OperatorUserProvisioningFailed => {
                let message = err.to_string();
                self.set_status(OperatorStatus::Blocked(message.clone()))
                    .await;
                Outcome::Blocked(message)
            }
            OperatorError::RuntimeUnreachable => {
                self.set_status(OperatorStatus::Waiting(RUNTIME_UNREACHABLE.to_string()))
                    .await;
                Outcome::Deferred(RUNTIME_UNREACHABLE.to_string())
            }
            OperatorError::IntegrationNotReady(kind) => self.waiting(kind.waiting_message()).await,
            other => {
                error!("Reconciliation failed: {}", other);
                Outcome::Deferred(other.to_string())
            }
        }
    }

    async fn reconcile_pass(&mut self) -> Result<Outcome, OperatorError> {
        self.set_status(OperatorStatus::Maintenance("Assembling pod spec".to_string()))
            .await;

        let level = self.spec.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(OperatorError::ConfigurationInvalid(format!(
                "invalid log level: '{level}'"
            )));
        }

        if !self.ctx.workload.can_connect().await {
            return Err(OperatorError::RuntimeUnreachable);
        }

        if let Err(e) = sync_trust_bundle(&self.ctx, None).await {
            warn!("Trust bundle sync failed: {}", e);
        }
        if let Err(e) = self.sync_tracing().await {
            warn!("Tracing sync failed: {}", e);
        }

        let relations = &self.ctx.relations;
        let database = read_database(&relations.relations(DATABASE_ENDPOINT).await?)
            .ready()
            .ok_or(OperatorError::IntegrationNotReady(IntegrationKind::Database))?;
        let object_storage =
            match read_object_storage(&relations.relations(OBJECT_STORAGE_ENDPOINT).await?) {
                None => None,
                Some(IntegrationData::Ready(data)) => Some(data),
                Some(IntegrationData::NotReady) => {
                    return Err(OperatorError::IntegrationNotReady(
                        IntegrationKind::ObjectStorage,
                    ))
                }
            };
        if sync_tls(&self.ctx).await? > 0 {
            self.tls_restart_pending = true;
        }
        let ingress = ingress_url(&relations.relations(INGRESS_ENDPOINT).await?);

        if self.spec.temporal_required && self.spec.temporal_server_address.trim().is_empty() {
            return Err(OperatorError::ConfigurationInvalid(
                TEMPORAL_ADDRESS_REQUIRED.to_string(),
            ));
        }

        let spec = self.spec.clone();
        let inputs = LayerInputs {
            spec: &spec,
            database: Some(&database),
            object_storage: object_storage.as_ref(),
            ingress_url: ingress.as_deref(),
        };
        if self.apply_layer(&inputs, self.tls_restart_pending).await? {
            self.tls_restart_pending = false;
        }

        let check = self.ctx.workload.check_status(HEALTH_CHECK_NAME).await?;
        match check {
            Some(CheckStatus::Up) => self.on_healthy().await,
            _ => Ok(self.waiting(SERVICE_UNAVAILABLE).await),
        }
    }

    /// Push the layer and restart the service when the plan or its TLS files changed
    ///
    /// Returns whether the service was restarted.
    async fn apply_layer(
        &self,
        inputs: &LayerInputs<'_>,
        tls_rewritten: bool,
    ) -> Result<bool, OperatorError> {
        let workload = self.ctx.workload.as_ref();
        let endpoints = loki_endpoints(&self.ctx.relations.relations(LOGGING_ENDPOINT).await?);

        let before = workload.plan().await?;
        let mut desired = build_spec(inputs);
        desired.log_targets = merge_log_targets(&before.log_targets, &endpoints);
        workload
            .add_layer(LAYER_LABEL, &desired.to_layer(), true)
            .await?;
        let after = workload.plan().await?;

        let running = matches!(
            workload.service_status(SERVICE_NAME).await?,
            Some(ServiceStatus::Active)
        );
        if before == after && running && !tls_rewritten {
            return Ok(false);
        }
        workload.restart(SERVICE_NAME).await?;
        metrics::increment_workload_restarts();
        info!("Restarted service '{}'", SERVICE_NAME);
        Ok(true)
    }

    /// The health check is up: record the version, bootstrap once, go active
    async fn on_healthy(&mut self) -> Result<Outcome, OperatorError> {
        self.refresh_version().await;
        if bootstrap_required(&self.ctx).await? {
            bootstrap_admin(&self.ctx).await?;
        }
        self.set_status(OperatorStatus::Active).await;
        Ok(Outcome::Applied)
    }

    async fn refresh_version(&self) {
        let workload = self.ctx.workload.as_ref();
        if !workload.can_connect().await {
            return;
        }
        if !matches!(workload.service_status(SERVICE_NAME).await, Ok(Some(_))) {
            return;
        }
        let version = self.ctx.api.version().await;
        if !version.is_empty() {
            self.ctx.status.set_workload_version(&version).await;
        }
    }

    /// Request an OTLP receiver and point the exporter at whatever is published
    pub(super) async fn sync_tracing(&self) -> Result<(), OperatorError> {
        let relations = self.ctx.relations.relations(TRACING_ENDPOINT).await?;
        if self.ctx.leadership.is_leader() {
            let receivers = requested_receivers();
            for relation in &relations {
                if relation.local_app_data.get(RECEIVERS_KEY) != Some(&receivers) {
                    self.ctx
                        .relations
                        .set_local_data(TRACING_ENDPOINT, relation.id, RECEIVERS_KEY, Some(&receivers))
                        .await?;
                }
            }
        }
        self.ctx
            .tracing
            .configure(otlp_http_endpoint(&relations).as_deref())
            .await;
        Ok(())
    }
}
