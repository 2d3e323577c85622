//! Response bodies returned by the Site Manager API

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct Token {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TokensResponse {
    #[serde(default)]
    pub items: Vec<Token>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Site {
    pub id: i64,
    #[serde(default)]
    pub cluster_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SitesResponse {
    #[serde(default)]
    pub items: Vec<Site>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VersionResponse {
    pub version: String,
}
