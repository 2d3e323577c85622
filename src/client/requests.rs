//! Request bodies sent to the Site Manager API

use serde::Serialize;

/// Form body of `POST /api/v1/login`
#[derive(Debug, Serialize)]
pub(super) struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Body of `POST /api/v1/tokens`
#[derive(Debug, Serialize)]
pub(super) struct IssueTokensRequest {
    pub count: u32,
    pub duration_seconds: u64,
}
