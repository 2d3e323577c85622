//! Certificate integration (TLS certificates requirer, application mode)
//!
//! We publish `certificate_signing_requests` in our application bag; the
//! issuer answers with `certificates` in its application bag, matched back to
//! our request by CSR text.

use rcgen::{CertificateParams, DnType, KeyPair};
use serde::{Deserialize, Serialize};

use super::{DataBag, Relation};

/// Key of our request list in the local bag
pub const REQUESTS_KEY: &str = "certificate_signing_requests";

/// Key of the issued list in the provider bag
pub const CERTIFICATES_KEY: &str = "certificates";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub certificate_signing_request: String,
    #[serde(default)]
    pub ca: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCertificate {
    pub certificate_signing_request: String,
    pub certificate: String,
    #[serde(default)]
    pub ca: String,
    #[serde(default)]
    pub chain: Vec<String>,
}

/// Generate a private key and a CSR for `common_name`, both PEM encoded
///
/// # Errors
///
/// Returns an error if key generation or CSR signing fails.
pub fn generate_request(common_name: &str) -> Result<(String, String), rcgen::Error> {
    let key = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec![common_name.to_string()])?;
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let csr = params.serialize_request(&key)?;
    Ok((key.serialize_pem(), csr.pem()?))
}

/// Requests currently published in our bag
#[must_use]
pub fn published_requests(local: &DataBag) -> Vec<CertificateRequest> {
    local
        .get(REQUESTS_KEY)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

/// JSON encoding of a request list for our bag
#[must_use]
pub fn encode_requests(requests: &[CertificateRequest]) -> String {
    serde_json::to_string(requests).unwrap_or_else(|_| "[]".to_string())
}

/// The certificate the issuer assigned to `csr`, if any
#[must_use]
pub fn assigned_certificate(relation: &Relation, csr: &str) -> Option<ProviderCertificate> {
    let issued: Vec<ProviderCertificate> = relation
        .app_data
        .get(CERTIFICATES_KEY)
        .and_then(|raw| serde_json::from_str(raw).ok())?;
    issued
        .into_iter()
        .find(|c| c.certificate_signing_request.trim() == csr.trim() && !c.certificate.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_produces_pem() {
        let (key, csr) = generate_request("msm").unwrap();
        assert!(key.contains("BEGIN PRIVATE KEY"));
        assert!(csr.contains("BEGIN CERTIFICATE REQUEST"));
    }

    #[test]
    fn test_assigned_certificate_matches_by_csr() {
        let issued = serde_json::json!([
            {"certificate_signing_request": "other", "certificate": "CERT-OTHER", "ca": "CA"},
            {"certificate_signing_request": "mine\n", "certificate": "CERT-MINE", "ca": "CA", "chain": ["CA"]},
        ]);
        let mut relation = Relation::default();
        relation
            .app_data
            .insert(CERTIFICATES_KEY.to_string(), issued.to_string());

        let cert = assigned_certificate(&relation, "mine").unwrap();
        assert_eq!(cert.certificate, "CERT-MINE");
        assert_eq!(cert.chain, vec!["CA".to_string()]);
        assert_eq!(assigned_certificate(&relation, "missing"), None);
    }

    #[test]
    fn test_published_requests_tolerates_garbage() {
        let mut local = DataBag::new();
        assert!(published_requests(&local).is_empty());
        local.insert(REQUESTS_KEY.to_string(), "not json".to_string());
        assert!(published_requests(&local).is_empty());

        let requests = vec![CertificateRequest {
            certificate_signing_request: "csr".to_string(),
            ca: false,
        }];
        local.insert(REQUESTS_KEY.to_string(), encode_requests(&requests));
        assert_eq!(published_requests(&local), requests);
    }
}
