//! Ingress integration (per-application ingress requirer)
//!
//! The provider publishes `ingress` as JSON `{"url": "..."}` in its
//! application bag.

use serde::Deserialize;
use tracing::warn;

use super::Relation;

#[derive(Debug, Deserialize)]
struct IngressBag {
    url: String,
}

/// URL the workload is published under, if any
#[must_use]
pub fn ingress_url(relations: &[Relation]) -> Option<String> {
    relations.iter().find_map(|relation| {
        let raw = relation.app_data.get("ingress")?;
        match serde_json::from_str::<IngressBag>(raw) {
            Ok(bag) if !bag.url.is_empty() => Some(bag.url),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring malformed ingress data on relation {}: {}", relation.id, e);
                None
            }
        }
    })
}

/// Path prefix the proxy serves the workload under
///
/// `""` and `"/"` both mean no prefix.
#[must_use]
pub fn root_path(url: Option<&str>) -> Option<String> {
    let parsed = reqwest::Url::parse(url?).ok()?;
    let path = parsed.path();
    if path.is_empty() || path == "/" {
        None
    } else {
        Some(path.to_string())
    }
}
