//! Database integration (PostgreSQL requirer)
//!
//! The provider publishes `endpoints` (`host:port[,host:port...]`),
//! `username`, `password` and `database` in its application bag.

use super::{IntegrationData, Relation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseData {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub name: String,
}

/// Connection data from the first relation that published any
#[must_use]
pub fn read_database(relations: &[Relation]) -> IntegrationData<DatabaseData> {
    let Some(data) = relations
        .iter()
        .map(|r| &r.app_data)
        .find(|bag| !bag.is_empty())
    else {
        return IntegrationData::NotReady;
    };

    let parsed = (|| {
        let endpoint = data.get("endpoints")?.split(',').next()?.trim();
        let (host, port) = endpoint.rsplit_once(':')?;
        if host.is_empty() || port.is_empty() {
            return None;
        }
        Some(DatabaseData {
            host: host.to_string(),
            port: port.to_string(),
            username: data.get("username")?.clone(),
            password: data.get("password")?.clone(),
            name: data.get("database")?.clone(),
        })
    })();

    parsed.map_or(IntegrationData::NotReady, IntegrationData::Ready)
}
