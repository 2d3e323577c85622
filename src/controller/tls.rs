//! # Workload TLS Identity
//!
//! The leader requests a certificate for the workload from the certificates
//! integration and shares the resulting key pair through a secret recorded as
//! a peer fact. Followers read that secret. Every replica then mirrors the pair
//! into the workload, rewriting files only when their bytes differ.

use serde_json::json;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::files::push_if_changed;
use super::reconciler::{Context, IntegrationKind, OperatorError};
use crate::constants::{
    CERTIFICATES_ENDPOINT, CERTS_DIR, CERT_COMMON_NAME, CERT_FILE, CSR_LABEL, KEY_FILE,
    TLS_KEY_PAIR_LABEL,
};
use crate::integrations::{
    assigned_certificate, encode_requests, generate_request, published_requests,
    CertificateRequest, Relation, REQUESTS_KEY,
};
use crate::observability::metrics;
use crate::store::{secret_reference, upsert, FactId, SecretContent, SecretError, SecretId};
use crate::workload::Workload;

const PRIVATE_KEY: &str = "private-key";
const CERTIFICATE: &str = "certificate";
const CSR: &str = "csr";

#[must_use]
pub fn key_path() -> String {
    format!("{CERTS_DIR}/{KEY_FILE}")
}

#[must_use]
pub fn cert_path() -> String {
    format!("{CERTS_DIR}/{CERT_FILE}")
}

/// Private key and certificate of the workload
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct TlsKeyMaterial {
    pub private_key: String,
    pub certificate: String,
}

impl std::fmt::Debug for TlsKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsKeyMaterial")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

impl TlsKeyMaterial {
    fn from_content(id: &SecretId, content: &SecretContent) -> Result<Self, OperatorError> {
        let field = |key: &'static str| {
            content
                .get(key)
                .cloned()
                .ok_or_else(|| OperatorError::MissingSecretKey {
                    secret: id.to_string(),
                    key,
                })
        };
        Ok(Self {
            private_key: field(PRIVATE_KEY)?,
            certificate: field(CERTIFICATE)?,
        })
    }

    fn to_content(&self) -> SecretContent {
        SecretContent::from([
            (PRIVATE_KEY.to_string(), self.private_key.clone()),
            (CERTIFICATE.to_string(), self.certificate.clone()),
        ])
    }
}

fn stored_request(content: &SecretContent) -> Option<(String, String)> {
    Some((content.get(PRIVATE_KEY)?.clone(), content.get(CSR)?.clone()))
}

/// Private key and CSR the leader requests with, generated on first use
///
/// The peer fact points at the request secret; while no peer channel records
/// it, the secret is found by its label so the key survives between passes.
async fn ensure_request(ctx: &Context) -> Result<(String, String), OperatorError> {
    let recorded = secret_reference(ctx.peers.as_ref(), FactId::CertificateRequest).await?;
    if let Some(id) = &recorded {
        match ctx.secrets.read(id, false).await {
            Ok(content) => {
                if let Some(request) = stored_request(&content) {
                    return Ok(request);
                }
            }
            Err(SecretError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    if let Some((id, content)) = ctx.secrets.find(CSR_LABEL).await? {
        if let Some(request) = stored_request(&content) {
            if recorded.as_ref() != Some(&id) {
                ctx.peers
                    .set(FactId::CertificateRequest, json!(id.as_str()))
                    .await?;
            }
            return Ok(request);
        }
    }

    let (private_key, csr) = generate_request(CERT_COMMON_NAME)?;
    let content = SecretContent::from([
        (PRIVATE_KEY.to_string(), private_key.clone()),
        (CSR.to_string(), csr.clone()),
    ]);
    let (id, _) = upsert(ctx.secrets.as_ref(), CSR_LABEL, &content).await?;
    ctx.peers
        .set(FactId::CertificateRequest, json!(id.as_str()))
        .await?;
    info!("Generated certificate signing request for '{}'", CERT_COMMON_NAME);
    Ok((private_key, csr))
}

async fn publish_request(ctx: &Context, relation: &Relation, csr: &str) -> Result<(), OperatorError> {
    let already_published = published_requests(&relation.local_app_data)
        .iter()
        .any(|r| r.certificate_signing_request.trim() == csr.trim());
    if already_published {
        return Ok(());
    }
    let requests = [CertificateRequest {
        certificate_signing_request: csr.to_string(),
        ca: false,
    }];
    ctx.relations
        .set_local_data(
            CERTIFICATES_ENDPOINT,
            relation.id,
            REQUESTS_KEY,
            Some(&encode_requests(&requests)),
        )
        .await?;
    info!("Requested certificate on relation {}", relation.id);
    Ok(())
}

async fn leader_material(
    ctx: &Context,
    relation: &Relation,
) -> Result<Option<TlsKeyMaterial>, OperatorError> {
    let (private_key, csr) = ensure_request(ctx).await?;
    publish_request(ctx, relation, &csr).await?;

    let Some(assigned) = assigned_certificate(relation, &csr) else {
        debug!("Certificate or private key is not available");
        return Ok(None);
    };
    let material = TlsKeyMaterial {
        private_key,
        certificate: assigned.certificate.clone(),
    };

    let recorded = secret_reference(ctx.peers.as_ref(), FactId::TlsKeyPair).await?;
    let stored = match &recorded {
        Some(id) => ctx
            .secrets
            .read(id, true)
            .await
            .ok()
            .and_then(|content| TlsKeyMaterial::from_content(id, &content).ok()),
        None => None,
    };
    if stored.as_ref() != Some(&material) {
        let (id, _) = upsert(ctx.secrets.as_ref(), TLS_KEY_PAIR_LABEL, &material.to_content()).await?;
        if recorded.as_ref() != Some(&id) {
            ctx.peers.set(FactId::TlsKeyPair, json!(id.as_str())).await?;
        }
        info!("Stored TLS key pair in secret {}", id);
    }
    Ok(Some(material))
}

async fn follower_material(ctx: &Context) -> Result<Option<TlsKeyMaterial>, OperatorError> {
    let Some(id) = secret_reference(ctx.peers.as_ref(), FactId::TlsKeyPair).await? else {
        return Ok(None);
    };
    match ctx.secrets.read(&id, true).await {
        Ok(content) => Ok(Some(TlsKeyMaterial::from_content(&id, &content)?)),
        Err(SecretError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Mirror the key pair into the workload; returns how many files were written
///
/// # Errors
///
/// Returns an error if the workload filesystem cannot be read or written.
pub async fn write_material(
    workload: &dyn Workload,
    material: &TlsKeyMaterial,
) -> Result<usize, OperatorError> {
    let mut written = 0;
    for (path, content) in [
        (cert_path(), &material.certificate),
        (key_path(), &material.private_key),
    ] {
        if push_if_changed(workload, &path, content).await? {
            metrics::increment_certificate_writes();
            written += 1;
        }
    }
    Ok(written)
}

/// Converge the workload's TLS files with the shared key pair
///
/// Returns how many files were rewritten; without a certificates relation
/// there is nothing to do.
///
/// # Errors
///
/// [`OperatorError::IntegrationNotReady`] while the relation exists but no key
/// material is available yet.
pub async fn sync_tls(ctx: &Context) -> Result<usize, OperatorError> {
    let relations = ctx.relations.relations(CERTIFICATES_ENDPOINT).await?;
    let Some(relation) = relations.first() else {
        return Ok(0);
    };

    let material = if ctx.leadership.is_leader() {
        leader_material(ctx, relation).await?
    } else {
        follower_material(ctx).await?
    };
    let Some(material) = material else {
        return Err(OperatorError::IntegrationNotReady(IntegrationKind::Certificates));
    };

    let written = write_material(ctx.workload.as_ref(), &material).await?;
    if written > 0 {
        info!("Updated {} TLS file(s) in {}", written, CERTS_DIR);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(key_path(), "/etc/msm/msm.key");
        assert_eq!(cert_path(), "/etc/msm/msm.pem");
    }

    #[test]
    fn test_material_from_content() {
        let id = SecretId::from("tls-1");
        let material = TlsKeyMaterial {
            private_key: "KEY".to_string(),
            certificate: "CERT".to_string(),
        };
        let decoded = TlsKeyMaterial::from_content(&id, &material.to_content()).unwrap();
        assert_eq!(decoded, material);

        let missing = SecretContent::from([(PRIVATE_KEY.to_string(), "KEY".to_string())]);
        assert!(matches!(
            TlsKeyMaterial::from_content(&id, &missing),
            Err(OperatorError::MissingSecretKey { key: CERTIFICATE, .. })
        ));
    }
}
