//! Kubernetes backing for [`RelationSource`]
//!
//! Each relation is one Secret labelled with its endpoint, relation id and
//! remote application. The integration agent owns `remote-app.json` and
//! `remote-units.json`; we own `local-app.json`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

use super::{DataBag, Relation, RelationError, RelationSource};
use crate::constants::{
    APP_LABEL_KEY, FIELD_MANAGER, LOCAL_APP_DATA, RELATION_ENDPOINT_KEY, RELATION_ID_KEY,
    REMOTE_APP_DATA, REMOTE_APP_KEY, REMOTE_UNITS_DATA,
};

#[derive(Clone)]
pub struct KubeRelationSource {
    api: Api<Secret>,
    app_name: String,
}

impl std::fmt::Debug for KubeRelationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRelationSource")
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}

impl KubeRelationSource {
    #[must_use]
    pub fn new(client: Client, namespace: &str, app_name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            app_name: app_name.to_string(),
        }
    }

    fn selector(&self, endpoint: &str) -> String {
        format!("{RELATION_ENDPOINT_KEY}={endpoint},{APP_LABEL_KEY}={}", self.app_name)
    }

    async fn find(&self, endpoint: &str, relation_id: u32) -> Result<Secret, RelationError> {
        let selector = format!("{},{RELATION_ID_KEY}={relation_id}", self.selector(endpoint));
        self.api
            .list(&ListParams::default().labels(&selector))
            .await?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| RelationError::NotFound {
                endpoint: endpoint.to_string(),
                id: relation_id,
            })
    }
}

fn bag<T: DeserializeOwned + Default>(
    secret: &Secret,
    endpoint: &str,
    id: u32,
    key: &'static str,
) -> Result<T, RelationError> {
    let raw = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|v| v.0.as_slice());
    match raw {
        None => Ok(T::default()),
        Some(bytes) if bytes.is_empty() => Ok(T::default()),
        Some(bytes) => serde_json::from_slice(bytes).map_err(|e| RelationError::Decode {
            endpoint: endpoint.to_string(),
            id,
            key,
            reason: e.to_string(),
        }),
    }
}

/// Relation carried by a relation Secret; `None` if it is not labelled as one
///
/// # Errors
///
/// Returns an error if one of the data bags is not valid JSON.
pub fn relation_from_secret(secret: &Secret) -> Result<Option<Relation>, RelationError> {
    let labels = secret.metadata.labels.clone().unwrap_or_default();
    let Some(endpoint) = labels.get(RELATION_ENDPOINT_KEY) else {
        return Ok(None);
    };
    let Some(id) = labels.get(RELATION_ID_KEY).and_then(|v| v.parse::<u32>().ok()) else {
        return Ok(None);
    };
    Ok(Some(Relation {
        id,
        endpoint: endpoint.clone(),
        remote_app: labels.get(REMOTE_APP_KEY).cloned(),
        app_data: bag(secret, endpoint, id, REMOTE_APP_DATA)?,
        units: bag::<BTreeMap<String, DataBag>>(secret, endpoint, id, REMOTE_UNITS_DATA)?,
        local_app_data: bag(secret, endpoint, id, LOCAL_APP_DATA)?,
    }))
}

#[async_trait]
impl RelationSource for KubeRelationSource {
    async fn relations(&self, endpoint: &str) -> Result<Vec<Relation>, RelationError> {
        let secrets = self
            .api
            .list(&ListParams::default().labels(&self.selector(endpoint)))
            .await?;
        let mut relations = Vec::with_capacity(secrets.items.len());
        for secret in &secrets.items {
            if secret.metadata.deletion_timestamp.is_some() {
                continue;
            }
            if let Some(relation) = relation_from_secret(secret)? {
                relations.push(relation);
            }
        }
        relations.sort_by_key(|r| r.id);
        Ok(relations)
    }

    async fn set_local_data(
        &self,
        endpoint: &str,
        relation_id: u32,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), RelationError> {
        let secret = self.find(endpoint, relation_id).await?;
        let mut local: DataBag = bag(&secret, endpoint, relation_id, LOCAL_APP_DATA)?;
        let changed = match value {
            Some(value) => local.insert(key.to_string(), value.to_string()).as_deref() != Some(value),
            None => local.remove(key).is_some(),
        };
        if !changed {
            return Ok(());
        }

        let encoded = serde_json::to_string(&local).map_err(|e| RelationError::Decode {
            endpoint: endpoint.to_string(),
            id: relation_id,
            key: LOCAL_APP_DATA,
            reason: e.to_string(),
        })?;
        let name = secret.metadata.name.unwrap_or_default();
        let patch = json!({ "stringData": { LOCAL_APP_DATA: encoded } });
        self.api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        debug!("Set '{}' on relation {}:{}", key, endpoint, relation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;

    fn relation_secret(data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("site-manager-database-4".to_string()),
                labels: Some(BTreeMap::from([
                    (RELATION_ENDPOINT_KEY.to_string(), "database".to_string()),
                    (RELATION_ID_KEY.to_string(), "4".to_string()),
                    (REMOTE_APP_KEY.to_string(), "postgresql".to_string()),
                ])),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_relation_from_secret() {
        let secret = relation_secret(&[
            (REMOTE_APP_DATA, r#"{"endpoints": "pg:5432"}"#),
            (REMOTE_UNITS_DATA, r#"{"postgresql/0": {"ready": "true"}}"#),
        ]);
        let relation = relation_from_secret(&secret).unwrap().unwrap();
        assert_eq!(relation.id, 4);
        assert_eq!(relation.endpoint, "database");
        assert_eq!(relation.remote_app.as_deref(), Some("postgresql"));
        assert_eq!(relation.app_data.get("endpoints").map(String::as_str), Some("pg:5432"));
        assert_eq!(relation.units.len(), 1);
        assert!(relation.local_app_data.is_empty());
    }

    #[test]
    fn test_relation_from_unlabelled_secret() {
        let secret = Secret::default();
        assert!(relation_from_secret(&secret).unwrap().is_none());
    }

    #[test]
    fn test_relation_from_secret_with_bad_bag() {
        let secret = relation_secret(&[(REMOTE_APP_DATA, "{not json")]);
        assert!(matches!(
            relation_from_secret(&secret),
            Err(RelationError::Decode { key: REMOTE_APP_DATA, .. })
        ));
    }
}
