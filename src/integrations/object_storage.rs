//! Object storage integration (S3 requirer)

use super::{IntegrationData, Relation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStorageData {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: String,
    pub bucket: String,
    pub path: String,
}

/// `None` when no object storage is related; otherwise its readiness
#[must_use]
pub fn read_object_storage(relations: &[Relation]) -> Option<IntegrationData<ObjectStorageData>> {
    let first = relations.first()?;
    let data = relations
        .iter()
        .map(|r| &r.app_data)
        .find(|bag| !bag.is_empty())
        .unwrap_or(&first.app_data);

    let field = |key: &str| data.get(key).cloned();
    let parsed = (|| {
        Some(ObjectStorageData {
            access_key: field("access-key")?,
            secret_key: field("secret-key")?,
            endpoint: field("endpoint")?,
            bucket: field("bucket")?,
            path: field("path")?,
        })
    })();
    Some(parsed.map_or(IntegrationData::NotReady, IntegrationData::Ready))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_relation_is_not_a_requirement() {
        assert_eq!(read_object_storage(&[]), None);
    }

    #[test]
    fn test_incomplete_credentials_are_not_ready() {
        let mut relation = Relation {
            id: 7,
            endpoint: "s3".to_string(),
            ..Default::default()
        };
        relation
            .app_data
            .insert("access-key".to_string(), "AKIA".to_string());
        assert_eq!(
            read_object_storage(&[relation]),
            Some(IntegrationData::NotReady)
        );
    }

    #[test]
    fn test_complete_credentials_are_ready() {
        let mut relation = Relation::default();
        for (k, v) in [
            ("access-key", "AKIA"),
            ("secret-key", "s3cr3t"),
            ("endpoint", "https://s3.local"),
            ("bucket", "msm-images"),
            ("path", "/images"),
        ] {
            relation.app_data.insert(k.to_string(), v.to_string());
        }
        let data = read_object_storage(&[relation]).unwrap().ready().unwrap();
        assert_eq!(data.bucket, "msm-images");
        assert_eq!(data.path, "/images");
    }
}
