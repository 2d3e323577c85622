//! Tracing integration (tracing requirer)
//!
//! We ask for an `otlp_http` receiver; the provider answers with `receivers`,
//! a JSON list of `{"protocol": {"name", "type"}, "url"}`.

use serde::Deserialize;

use super::Relation;

/// Key of the receiver list in both bags
pub const RECEIVERS_KEY: &str = "receivers";

const OTLP_HTTP: &str = "otlp_http";

#[derive(Debug, Deserialize)]
struct Protocol {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Receiver {
    protocol: Protocol,
    url: String,
}

/// Value we publish under [`RECEIVERS_KEY`]
#[must_use]
pub fn requested_receivers() -> String {
    serde_json::json!([OTLP_HTTP]).to_string()
}

/// The `otlp_http` receiver URL, if one is published
#[must_use]
pub fn otlp_http_endpoint(relations: &[Relation]) -> Option<String> {
    relations.iter().find_map(|relation| {
        let receivers: Vec<Receiver> = relation
            .app_data
            .get(RECEIVERS_KEY)
            .and_then(|raw| serde_json::from_str(raw).ok())?;
        receivers
            .into_iter()
            .find(|r| r.protocol.name == OTLP_HTTP)
            .map(|r| r.url)
    })
}
