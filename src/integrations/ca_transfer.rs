//! CA transfer integration (certificate transfer requirer)
//!
//! Providers publish `certificates` (a JSON list of PEM strings) in their
//! application bag. Older providers publish `ca` and `chain` per unit instead.

use super::Relation;

/// Trust anchors published on one relation, in a stable order
#[must_use]
pub fn trust_anchors(relation: &Relation) -> Vec<String> {
    if let Some(certs) = relation
        .app_data
        .get("certificates")
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
    {
        return dedup(certs);
    }

    let mut certs = Vec::new();
    for bag in relation.units.values() {
        if let Some(ca) = bag.get("ca") {
            certs.push(ca.clone());
        }
        if let Some(chain) = bag
            .get("chain")
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
        {
            certs.extend(chain);
        }
    }
    dedup(certs)
}

fn dedup(certs: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(certs.len());
    for cert in certs {
        let cert = cert.trim().to_string();
        if !cert.is_empty() && !seen.contains(&cert) {
            seen.push(cert);
        }
    }
    seen
}
