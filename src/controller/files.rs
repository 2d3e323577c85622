//! Content-addressed writes into the workload filesystem

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::workload::{Workload, WorkloadError};

/// Hex SHA-256 of `content`
#[must_use]
pub fn content_digest(content: &str) -> String {
    Sha256::digest(content.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Write `content` to `path` unless the workload already holds identical bytes
///
/// Returns whether the file was written.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub async fn push_if_changed(
    workload: &dyn Workload,
    path: &str,
    content: &str,
) -> Result<bool, WorkloadError> {
    let desired = content_digest(content);
    let current = workload.pull(path).await?.map(|c| content_digest(&c));
    if current.as_deref() == Some(desired.as_str()) {
        return Ok(false);
    }
    workload.push(path, content).await?;
    debug!("Wrote {} (sha256 {})", path, &desired[..12]);
    Ok(true)
}
