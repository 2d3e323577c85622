//! # Secret Store
//!
//! Secret contents addressed either by a stable label (for the writer) or by the
//! opaque id returned at creation (for readers on other replicas).
//!
//! Kubernetes Secrets carry the label in [`SECRET_LABEL_KEY`]; the id is the
//! generated object name.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams, ObjectMeta, PostParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::constants::{APP_LABEL_KEY, SECRET_LABEL_KEY};

pub type SecretContent = BTreeMap<String, String>;

/// Opaque secret identifier, safe to share through peer facts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SecretId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SecretId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SecretId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret '{0}' not found")]
    NotFound(String),
    #[error("Secret '{id}' has a non UTF-8 value for key '{key}'")]
    Decode { id: String, key: String },
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create a secret under `label`
    async fn create(&self, label: &str, content: &SecretContent) -> Result<SecretId, SecretError>;

    /// Replace the content of the secret under `label`; `None` when there is none
    async fn update(
        &self,
        label: &str,
        content: &SecretContent,
    ) -> Result<Option<SecretId>, SecretError>;

    /// Read a secret by id; `refresh` bypasses any cached copy
    async fn read(&self, id: &SecretId, refresh: bool) -> Result<SecretContent, SecretError>;

    /// The secret currently under `label`, if any
    async fn find(&self, label: &str) -> Result<Option<(SecretId, SecretContent)>, SecretError>;
}

/// Update the secret under `label`, creating it when missing
///
/// Returns the id and whether the secret was created.
///
/// # Errors
///
/// Returns an error if the backing store rejects the write.
pub async fn upsert(
    store: &dyn SecretStore,
    label: &str,
    content: &SecretContent,
) -> Result<(SecretId, bool), SecretError> {
    if let Some(id) = store.update(label, content).await? {
        return Ok((id, false));
    }
    let id = store.create(label, content).await?;
    Ok((id, true))
}

/// Secret store backed by namespaced Kubernetes Secrets
pub struct KubeSecretStore {
    api: Api<Secret>,
    app_name: String,
    cache: Mutex<HashMap<SecretId, SecretContent>>,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore")
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client, namespace: &str, app_name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            app_name: app_name.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn selector(&self, label: &str) -> String {
        format!("{SECRET_LABEL_KEY}={label},{APP_LABEL_KEY}={}", self.app_name)
    }

    fn remember(&self, id: &SecretId, content: &SecretContent) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(id.clone(), content.clone());
        }
    }

    fn cached(&self, id: &SecretId) -> Option<SecretContent> {
        self.cache.lock().ok().and_then(|c| c.get(id).cloned())
    }
}

fn decode_secret(secret: &Secret) -> Result<SecretContent, SecretError> {
    let id = secret.metadata.name.clone().unwrap_or_default();
    let mut content = SecretContent::new();
    for (key, value) in secret.data.iter().flatten() {
        let text = String::from_utf8(value.0.clone()).map_err(|_| SecretError::Decode {
            id: id.clone(),
            key: key.clone(),
        })?;
        content.insert(key.clone(), text);
    }
    for (key, value) in secret.string_data.iter().flatten() {
        content.insert(key.clone(), value.clone());
    }
    Ok(content)
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn create(&self, label: &str, content: &SecretContent) -> Result<SecretId, SecretError> {
        let secret = Secret {
            metadata: ObjectMeta {
                generate_name: Some(format!("{label}-")),
                labels: Some(BTreeMap::from([
                    (SECRET_LABEL_KEY.to_string(), label.to_string()),
                    (APP_LABEL_KEY.to_string(), self.app_name.clone()),
                ])),
                ..Default::default()
            },
            string_data: Some(content.clone()),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        let created = self.api.create(&PostParams::default(), &secret).await?;
        let id = SecretId::from(created.metadata.name.unwrap_or_default());
        debug!("Created secret '{}' for label '{}'", id, label);
        self.remember(&id, content);
        Ok(id)
    }

    async fn update(
        &self,
        label: &str,
        content: &SecretContent,
    ) -> Result<Option<SecretId>, SecretError> {
        let existing = self
            .api
            .list(&ListParams::default().labels(&self.selector(label)))
            .await?;
        let Some(mut secret) = existing.items.into_iter().next() else {
            return Ok(None);
        };
        let Some(name) = secret.metadata.name.clone() else {
            return Ok(None);
        };
        secret.data = None;
        secret.string_data = Some(content.clone());
        self.api
            .replace(&name, &PostParams::default(), &secret)
            .await?;
        let id = SecretId::from(name);
        debug!("Updated secret '{}' for label '{}'", id, label);
        self.remember(&id, content);
        Ok(Some(id))
    }

    async fn read(&self, id: &SecretId, refresh: bool) -> Result<SecretContent, SecretError> {
        if !refresh {
            if let Some(content) = self.cached(id) {
                return Ok(content);
            }
        }
        let secret = self
            .api
            .get_opt(id.as_str())
            .await?
            .ok_or_else(|| SecretError::NotFound(id.to_string()))?;
        let content = decode_secret(&secret)?;
        self.remember(id, &content);
        Ok(content)
    }

    async fn find(&self, label: &str) -> Result<Option<(SecretId, SecretContent)>, SecretError> {
        let existing = self
            .api
            .list(&ListParams::default().labels(&self.selector(label)))
            .await?;
        let Some(secret) = existing.items.into_iter().next() else {
            return Ok(None);
        };
        let Some(name) = secret.metadata.name.clone() else {
            return Ok(None);
        };
        let id = SecretId::from(name);
        let content = decode_secret(&secret)?;
        self.remember(&id, &content);
        Ok(Some((id, content)))
    }
}
