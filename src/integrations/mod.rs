//! # External Integration Readers
//!
//! Every integration the workload depends on is modelled as a set of relations
//! on a named endpoint. A relation carries three JSON data bags: the remote
//! application's, one per remote unit, and our own application's (the only
//! one we write).
//!
//! The readers in this module are pure functions from relations to
//! [`IntegrationData`]; [`KubeRelationSource`] is the Kubernetes backing.

mod ca_transfer;
mod certificates;
mod database;
mod ingress;
mod kube_source;
mod logging;
mod object_storage;
mod trace_sink;

pub use ca_transfer::trust_anchors;
pub use certificates::{
    assigned_certificate, encode_requests, generate_request, published_requests,
    CertificateRequest, ProviderCertificate, CERTIFICATES_KEY, REQUESTS_KEY,
};
pub use database::{read_database, DatabaseData};
pub use ingress::{ingress_url, root_path};
pub use kube_source::{relation_from_secret, KubeRelationSource};
pub use logging::loki_endpoints;
pub use object_storage::{read_object_storage, ObjectStorageData};
pub use trace_sink::{otlp_http_endpoint, requested_receivers, RECEIVERS_KEY};

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// A flat string-to-string data bag
pub type DataBag = BTreeMap<String, String>;

/// One relation instance on an endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relation {
    pub id: u32,
    pub endpoint: String,
    pub remote_app: Option<String>,
    pub app_data: DataBag,
    pub units: BTreeMap<String, DataBag>,
    pub local_app_data: DataBag,
}

/// Connection data of one integration kind
///
/// Fields are only meaningful when `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationData<T> {
    Ready(T),
    NotReady,
}

impl<T> IntegrationData<T> {
    #[must_use]
    pub fn ready(self) -> Option<T> {
        match self {
            IntegrationData::Ready(data) => Some(data),
            IntegrationData::NotReady => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RelationError {
    #[error("Relation {endpoint}:{id} has an undecodable '{key}' bag: {reason}")]
    Decode {
        endpoint: String,
        id: u32,
        key: &'static str,
        reason: String,
    },
    #[error("Relation {endpoint}:{id} not found")]
    NotFound { endpoint: String, id: u32 },
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

#[async_trait]
pub trait RelationSource: Send + Sync {
    /// All live relations on `endpoint`, ordered by id
    async fn relations(&self, endpoint: &str) -> Result<Vec<Relation>, RelationError>;

    /// Write (or, with `None`, delete) a key in our application's data bag
    async fn set_local_data(
        &self,
        endpoint: &str,
        relation_id: u32,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), RelationError>;
}
