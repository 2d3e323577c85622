//! Outbound trust bundle: CA-transfer anchors mirrored into the workload trust store

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::reconciler::{Context, OperatorError};
use crate::constants::{CA_TRANSFER_ENDPOINT, TRUST_DIR, TRUST_FILE_PREFIX, TRUST_REFRESH_COMMAND};
use crate::integrations::trust_anchors;
use crate::observability::metrics;

const TRUST_FILE_SUFFIX: &str = "-ca.crt";

/// Prefix shared by every file this namespace manages
#[must_use]
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{TRUST_FILE_PREFIX}-{namespace}-")
}

#[must_use]
pub fn trust_file_name(namespace: &str, relation_id: u32, index: usize) -> String {
    format!(
        "{}{relation_id}-{index}{TRUST_FILE_SUFFIX}",
        namespace_prefix(namespace)
    )
}

/// Whether `name` is a trust file of this namespace: `<prefix><relation>-<index>-ca.crt`
fn is_managed(name: &str, prefix: &str) -> bool {
    let Some(rest) = name
        .strip_prefix(prefix)
        .and_then(|r| r.strip_suffix(TRUST_FILE_SUFFIX))
    else {
        return false;
    };
    rest.split_once('-').is_some_and(|(relation, index)| {
        relation.parse::<u32>().is_ok() && index.parse::<usize>().is_ok()
    })
}

fn with_trailing_newline(pem: &str) -> String {
    if pem.ends_with('\n') {
        pem.to_string()
    } else {
        format!("{pem}\n")
    }
}

/// Summary of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustSyncReport {
    pub written: usize,
    pub removed: usize,
    pub refreshed: bool,
}

impl TrustSyncReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.written > 0 || self.removed > 0
    }
}

/// Desired trust files keyed by file name
///
/// # Errors
///
/// Returns an error if the CA-transfer relations cannot be listed.
pub async fn desired_trust_files(
    ctx: &Context,
    departing: Option<u32>,
) -> Result<BTreeMap<String, String>, OperatorError> {
    let relations = ctx.relations.relations(CA_TRANSFER_ENDPOINT).await?;
    let mut files = BTreeMap::new();
    for relation in relations.iter().filter(|r| Some(r.id) != departing) {
        for (index, pem) in trust_anchors(relation).iter().enumerate() {
            files.insert(
                trust_file_name(&ctx.namespace, relation.id, index),
                with_trailing_newline(pem),
            );
        }
    }
    Ok(files)
}

/// Marker present while the trust store holds files the index has not picked up
///
/// The leading dot keeps it out of the refresh command's `*.crt` scan.
#[must_use]
pub fn refresh_marker_path(namespace: &str) -> String {
    format!("{TRUST_DIR}/.{}refresh-pending", namespace_prefix(namespace))
}

/// Mirror the anchors of every active CA-transfer relation into the trust store
///
/// `departing` names a relation that is going away and must not contribute,
/// even if it is still listed. Files of other namespaces are never touched.
/// The trust-store index is rebuilt once when anything changed, or when an
/// earlier refresh failed after its files were already in place.
///
/// # Errors
///
/// Returns an error if the workload filesystem is unavailable or the refresh
/// command fails.
pub async fn sync_trust_bundle(
    ctx: &Context,
    departing: Option<u32>,
) -> Result<TrustSyncReport, OperatorError> {
    let desired = desired_trust_files(ctx, departing).await?;
    let prefix = namespace_prefix(&ctx.namespace);
    let marker = refresh_marker_path(&ctx.namespace);
    let workload = ctx.workload.as_ref();
    let mut report = TrustSyncReport::default();

    let existing = workload.list_files(TRUST_DIR).await?;
    let stale: Vec<&String> = existing
        .iter()
        .filter(|n| is_managed(n, &prefix))
        .filter(|n| !desired.contains_key(*n))
        .collect();
    let mut outdated = Vec::new();
    for (name, pem) in &desired {
        let path = format!("{TRUST_DIR}/{name}");
        if workload.pull(&path).await?.as_deref() != Some(pem.as_str()) {
            outdated.push((path, pem));
        }
    }

    let pending = workload.pull(&marker).await?.is_some();
    if stale.is_empty() && outdated.is_empty() && !pending {
        return Ok(report);
    }
    if !pending {
        workload.push(&marker, "").await?;
    }

    for name in stale {
        workload.remove(&format!("{TRUST_DIR}/{name}")).await?;
        debug!("Removed stale trust anchor {}", name);
        report.removed += 1;
    }
    for (path, pem) in outdated {
        workload.push(&path, pem).await?;
        report.written += 1;
    }

    let command: Vec<String> = TRUST_REFRESH_COMMAND.iter().map(ToString::to_string).collect();
    let output = workload.exec(&command, None).await?;
    if !output.success() {
        warn!(
            "Trust store refresh exited with {}: {}",
            output.exit_code,
            output.stderr.trim()
        );
        return Err(OperatorError::TrustRefresh(format!(
            "exit code {}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }
    workload.remove(&marker).await?;
    metrics::increment_trust_refreshes();
    report.refreshed = true;
    info!(
        "Trust store refreshed ({} written, {} removed)",
        report.written, report.removed
    );
    Ok(report)
}
