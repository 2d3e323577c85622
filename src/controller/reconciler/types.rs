//! # Types
//!
//! Error taxonomy, status model and the capabilities a reconciler works with.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::client::{ApiError, SiteManagerApi};
use crate::integrations::{RelationError, RelationSource};
use crate::observability::TracingSink;
use crate::store::{Leadership, PeerError, PeerFacts, SecretError, SecretStore};
use crate::workload::{Workload, WorkloadError};

/// Integrations whose absence or incompleteness stops a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationKind {
    Database,
    ObjectStorage,
    Certificates,
}

impl IntegrationKind {
    /// Status message shown while waiting on this integration
    #[must_use]
    pub fn waiting_message(&self) -> &'static str {
        match self {
            IntegrationKind::Database => "Waiting for database relation",
            IntegrationKind::ObjectStorage => "Waiting for s3 integration",
            IntegrationKind::Certificates => "Waiting for certificates relation to be ready",
        }
    }
}

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("{0}")]
    ConfigurationInvalid(String),
    #[error("workload runtime unreachable")]
    RuntimeUnreachable,
    #[error("integration not ready: {}", .0.waiting_message())]
    IntegrationNotReady(IntegrationKind),
    #[error("failed to create operator user")]
    OperatorUserProvisioningFailed,
    #[error("Site Manager API error: {0}")]
    Api(#[from] ApiError),
    #[error("Workload error: {0}")]
    Workload(#[from] WorkloadError),
    #[error("Relation error: {0}")]
    Relation(#[from] RelationError),
    #[error("Peer facts error: {0}")]
    Peer(#[from] PeerError),
    #[error("Secret store error: {0}")]
    Secret(#[from] SecretError),
    #[error("Certificate request error: {0}")]
    Certificate(#[from] rcgen::Error),
    #[error("Trust store refresh failed: {0}")]
    TrustRefresh(String),
    #[error("Secret '{secret}' is missing '{key}'")]
    MissingSecretKey { secret: String, key: &'static str },
}

/// Status of this operator replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorStatus {
    Maintenance(String),
    Blocked(String),
    Waiting(String),
    Active,
}

impl OperatorStatus {
    #[must_use]
    pub fn phase(&self) -> &'static str {
        match self {
            OperatorStatus::Maintenance(_) => "Maintenance",
            OperatorStatus::Blocked(_) => "Blocked",
            OperatorStatus::Waiting(_) => "Waiting",
            OperatorStatus::Active => "Active",
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            OperatorStatus::Maintenance(m)
            | OperatorStatus::Blocked(m)
            | OperatorStatus::Waiting(m) => m,
            OperatorStatus::Active => "",
        }
    }
}

impl std::fmt::Display for OperatorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorStatus::Active => f.write_str("Active"),
            other => write!(f, "{}: {}", other.phase(), other.message()),
        }
    }
}

/// Where status and workload version are published
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, status: &OperatorStatus);
    async fn set_workload_version(&self, version: &str);
}

/// Everything the reconciler talks to
#[derive(Clone)]
pub struct Context {
    /// Application name, used to derive the operator user and resource names
    pub app_name: String,
    /// Namespace, part of the trust file naming scheme
    pub namespace: String,
    pub workload: Arc<dyn Workload>,
    pub relations: Arc<dyn RelationSource>,
    pub peers: Arc<dyn PeerFacts>,
    pub secrets: Arc<dyn SecretStore>,
    pub leadership: Arc<dyn Leadership>,
    pub api: Arc<dyn SiteManagerApi>,
    pub status: Arc<dyn StatusSink>,
    pub tracing: Arc<dyn TracingSink>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("app_name", &self.app_name)
            .field("namespace", &self.namespace)
            .field("is_leader", &self.leadership.is_leader())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages_are_stable() {
        assert_eq!(
            IntegrationKind::Database.waiting_message(),
            "Waiting for database relation"
        );
        assert_eq!(
            OperatorError::OperatorUserProvisioningFailed.to_string(),
            "failed to create operator user"
        );
        let status = OperatorStatus::Waiting("waiting for Pebble API".to_string());
        assert_eq!(status.phase(), "Waiting");
        assert_eq!(status.to_string(), "Waiting: waiting for Pebble API");
        assert_eq!(OperatorStatus::Active.message(), "");
    }
}
