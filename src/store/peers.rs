//! # Peer Facts
//!
//! A small replicated key/value bag shared by every replica of the application.
//! Values are JSON-encoded. Only the leader writes; every replica reads.
//!
//! Backed by the `<app>-peers` ConfigMap. The ConfigMap is created with the
//! application; while it is absent there is no peer channel, reads return
//! nothing and writes are dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::{Leadership, SecretId};
use crate::constants::{CSR_FACT, FIELD_MANAGER, OPERATOR_CREDENTIAL_FACT, TLS_KEY_PAIR_FACT};

/// Facts the operator records in the peer bag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactId {
    /// Secret id of the operator credential
    OperatorCredential,
    /// Secret id of the TLS key pair
    TlsKeyPair,
    /// Secret id of the private key and CSR the leader requested with
    CertificateRequest,
}

impl FactId {
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            FactId::OperatorCredential => OPERATOR_CREDENTIAL_FACT,
            FactId::TlsKeyPair => TLS_KEY_PAIR_FACT,
            FactId::CertificateRequest => CSR_FACT,
        }
    }
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Only the leader may write peer fact '{0}'")]
    NotLeader(&'static str),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

#[async_trait]
pub trait PeerFacts: Send + Sync {
    /// Whether the peer channel exists
    async fn available(&self) -> Result<bool, PeerError>;

    /// Recorded value, `None` when absent or empty
    async fn get(&self, fact: FactId) -> Result<Option<serde_json::Value>, PeerError>;

    /// Record a value; callable only when leader
    async fn set(&self, fact: FactId, value: serde_json::Value) -> Result<(), PeerError>;
}

/// Secret id recorded under `fact`, if any
///
/// # Errors
///
/// Returns an error if the peer bag cannot be read.
pub async fn secret_reference(
    peers: &dyn PeerFacts,
    fact: FactId,
) -> Result<Option<SecretId>, PeerError> {
    Ok(peers
        .get(fact)
        .await?
        .and_then(|value| value.as_str().map(SecretId::from)))
}

/// Treat the empty encodings a fact may carry (`""`, `{}`, `null`) as absent
fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

/// ConfigMap-backed peer fact bag
#[derive(Clone)]
pub struct ConfigMapPeerFacts {
    api: Api<ConfigMap>,
    name: String,
    leadership: Arc<dyn Leadership>,
}

impl std::fmt::Debug for ConfigMapPeerFacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMapPeerFacts")
            .field("name", &self.name)
            .field("is_leader", &self.leadership.is_leader())
            .finish_non_exhaustive()
    }
}

impl ConfigMapPeerFacts {
    #[must_use]
    pub fn new(
        client: Client,
        namespace: &str,
        name: &str,
        leadership: Arc<dyn Leadership>,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            leadership,
        }
    }
}

#[async_trait]
impl PeerFacts for ConfigMapPeerFacts {
    async fn available(&self) -> Result<bool, PeerError> {
        Ok(self.api.get_opt(&self.name).await?.is_some())
    }

    async fn get(&self, fact: FactId) -> Result<Option<serde_json::Value>, PeerError> {
        let Some(config_map) = self.api.get_opt(&self.name).await? else {
            return Ok(None);
        };
        let Some(raw) = config_map.data.as_ref().and_then(|d| d.get(fact.key())) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) if is_empty_value(&value) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring undecodable peer fact '{}': {}", fact.key(), e);
                Ok(None)
            }
        }
    }

    async fn set(&self, fact: FactId, value: serde_json::Value) -> Result<(), PeerError> {
        if !self.leadership.is_leader() {
            return Err(PeerError::NotLeader(fact.key()));
        }
        if self.api.get_opt(&self.name).await?.is_none() {
            debug!("No peer channel, dropping write of '{}'", fact.key());
            return Ok(());
        }
        let patch = json!({ "data": { fact.key(): value.to_string() } });
        self.api
            .patch(
                &self.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        debug!("Recorded peer fact '{}'", fact.key());
        Ok(())
    }
}
