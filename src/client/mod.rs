//! # Site Manager API Client
//!
//! Thin client for the workload's management API, used for enrollment tokens
//! and remote-site teardown.
//!
//! Endpoints:
//! - `POST /api/v1/login` - form login, returns a bearer token
//! - `POST /api/v1/tokens` - issue enrollment tokens
//! - `GET /api/v1/sites?cluster_id=` - confirmed sites
//! - `GET /api/v1/sites/pending` - sites awaiting acceptance
//! - `DELETE /api/v1/sites/{id}` - remove a site
//! - `GET /version` - workload version

mod requests;
mod responses;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::VERSION_TIMEOUT_SECS;
use requests::{IssueTokensRequest, LoginForm};
use responses::{LoginResponse, Site, SitesResponse, TokensResponse, VersionResponse};

/// Lifetime of an issued enrollment token
pub const ENROLL_TOKEN_DURATION_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to authenticate: {0}")]
    Auth(String),
    #[error("{operation} failed with HTTP {status}: {body}")]
    Request {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("More than one {collection} entry for cluster '{cluster_id}'")]
    Ambiguous {
        collection: &'static str,
        cluster_id: String,
    },
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Login credentials of a Site Manager user
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait SiteManagerApi: Send + Sync {
    /// Workload version; empty when it cannot be determined
    async fn version(&self) -> String;

    /// Issue a single enrollment token
    async fn issue_enroll_token(&self, credentials: &Credentials) -> Result<String, ApiError>;

    /// Remove the site registered for `cluster_id`, confirmed or pending
    async fn remove_site(&self, credentials: &Credentials, cluster_id: &str)
        -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct SiteManagerClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl SiteManagerClient {
    /// Create a client for the API at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder().build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn login(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let response = self
            .http_client
            .post(format!("{}/api/v1/login", self.base_url))
            .form(&LoginForm {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth(body));
        }
        let login: LoginResponse = response.json().await?;
        Ok(login.access_token)
    }

    async fn sites(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<Site>, ApiError> {
        let response = self
            .http_client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Request {
                operation: "list sites",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json::<SitesResponse>().await?.items)
    }

    async fn delete_site(&self, token: &str, id: i64) -> Result<(), ApiError> {
        let response = self
            .http_client
            .delete(format!("{}/api/v1/sites/{id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Request {
                operation: "delete site",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        info!("Removed site {}", id);
        Ok(())
    }
}

/// The single entry in `sites`, `None` if there is none
fn single_match<'a>(
    collection: &'static str,
    cluster_id: &str,
    sites: &'a [Site],
) -> Result<Option<&'a Site>, ApiError> {
    match sites {
        [] => Ok(None),
        [site] => Ok(Some(site)),
        _ => Err(ApiError::Ambiguous {
            collection,
            cluster_id: cluster_id.to_string(),
        }),
    }
}

#[async_trait]
impl SiteManagerApi for SiteManagerClient {
    async fn version(&self) -> String {
        let result = async {
            self.http_client
                .get(format!("{}/version", self.base_url))
                .timeout(Duration::from_secs(VERSION_TIMEOUT_SECS))
                .send()
                .await?
                .error_for_status()?
                .json::<VersionResponse>()
                .await
        }
        .await;
        match result {
            Ok(body) => body.version,
            Err(e) => {
                warn!("Unable to get version from API: {}", e);
                String::new()
            }
        }
    }

    async fn issue_enroll_token(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let span = info_span!("site_manager.issue_enroll_token");
        async move {
            let token = self.login(credentials).await?;
            let response = self
                .http_client
                .post(format!("{}/api/v1/tokens", self.base_url))
                .bearer_auth(&token)
                .json(&IssueTokensRequest {
                    count: 1,
                    duration_seconds: ENROLL_TOKEN_DURATION_SECS,
                })
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ApiError::Request {
                    operation: "issue enrollment token",
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }
            let tokens: TokensResponse = response.json().await?;
            tokens
                .items
                .into_iter()
                .next()
                .map(|t| t.value)
                .ok_or(ApiError::Request {
                    operation: "issue enrollment token",
                    status: status.as_u16(),
                    body: "no token returned".to_string(),
                })
        }
        .instrument(span)
        .await
    }

    async fn remove_site(
        &self,
        credentials: &Credentials,
        cluster_id: &str,
    ) -> Result<(), ApiError> {
        let span = info_span!("site_manager.remove_site", cluster_id = cluster_id);
        async move {
            let token = self.login(credentials).await?;

            // The confirmed listing filters server side; pending entries are filtered here.
            let confirmed: Vec<Site> = self
                .sites(&token, "/api/v1/sites", &[("cluster_id", cluster_id)])
                .await?
                .into_iter()
                .filter(|s| s.cluster_id.as_deref().is_none_or(|c| c == cluster_id))
                .collect();
            let pending: Vec<Site> = self
                .sites(&token, "/api/v1/sites/pending", &[])
                .await?
                .into_iter()
                .filter(|s| s.cluster_id.as_deref() == Some(cluster_id))
                .collect();

            let confirmed = single_match("site", cluster_id, &confirmed)?;
            let pending = single_match("pending site", cluster_id, &pending)?;
            if confirmed.is_none() && pending.is_none() {
                debug!("No site registered for cluster '{}'", cluster_id);
                return Ok(());
            }
            for site in confirmed.into_iter().chain(pending) {
                self.delete_site(&token, site.id).await?;
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}
