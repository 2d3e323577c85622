//! Logging integration (Loki push API consumer)
//!
//! Each Loki unit publishes `endpoint` as JSON `{"url": "..."}` in its unit bag.

use serde::Deserialize;

use super::Relation;

#[derive(Debug, Deserialize)]
struct EndpointBag {
    url: String,
}

/// Live push endpoints across all units, deduplicated, in discovery order
#[must_use]
pub fn loki_endpoints(relations: &[Relation]) -> Vec<String> {
    let mut endpoints: Vec<String> = Vec::new();
    for url in relations
        .iter()
        .flat_map(|r| r.units.values())
        .filter_map(|bag| bag.get("endpoint"))
        .filter_map(|raw| serde_json::from_str::<EndpointBag>(raw).ok())
        .map(|bag| bag.url)
    {
        if !endpoints.contains(&url) {
            endpoints.push(url);
        }
    }
    endpoints
}
