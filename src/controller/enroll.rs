//! # Site Enrollment
//!
//! Leader-side handling of the enrollment integration: MAAS regions that join
//! receive a fresh enrollment token, and the site of a region that leaves is
//! removed from Site Manager.
//!
//! Both paths need the operator credential, so they defer until bootstrap has
//! recorded it.

use tracing::{info, warn};

use super::events::Outcome;
use super::reconciler::{Context, OperatorError};
use crate::client::Credentials;
use crate::constants::ENROLL_ENDPOINT;
use crate::store::{secret_reference, FactId, SecretError};

/// Key the token is published under in our application bag
pub const TOKEN_KEY: &str = "token";

const NO_CREDENTIALS: &str = "operator credentials not available yet";

/// The operator credential recorded by bootstrap, if any
///
/// # Errors
///
/// Returns an error if the peer channel or the secret cannot be read, or the
/// secret lacks a username or password.
pub async fn operator_credentials(ctx: &Context) -> Result<Option<Credentials>, OperatorError> {
    let Some(id) = secret_reference(ctx.peers.as_ref(), FactId::OperatorCredential).await? else {
        return Ok(None);
    };
    let content = match ctx.secrets.read(&id, true).await {
        Ok(content) => content,
        Err(SecretError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let field = |key: &'static str| {
        content
            .get(key)
            .cloned()
            .ok_or_else(|| OperatorError::MissingSecretKey {
                secret: id.to_string(),
                key,
            })
    };
    Ok(Some(Credentials {
        username: field("username")?,
        password: field("password")?,
    }))
}

/// Issue an enrollment token and publish it on the joined relation
pub async fn publish_enroll_token(ctx: &Context, relation_id: u32) -> Outcome {
    if !ctx.leadership.is_leader() {
        return Outcome::Applied;
    }
    match issue_and_publish(ctx, relation_id).await {
        Ok(true) => Outcome::Applied,
        Ok(false) => Outcome::Deferred(NO_CREDENTIALS.to_string()),
        Err(e) => {
            warn!("Unable to publish enrollment token on relation {}: {}", relation_id, e);
            Outcome::Deferred(e.to_string())
        }
    }
}

async fn issue_and_publish(ctx: &Context, relation_id: u32) -> Result<bool, OperatorError> {
    let Some(credentials) = operator_credentials(ctx).await? else {
        return Ok(false);
    };
    let token = ctx.api.issue_enroll_token(&credentials).await?;
    ctx.relations
        .set_local_data(ENROLL_ENDPOINT, relation_id, TOKEN_KEY, Some(&token))
        .await?;
    info!("Published enrollment token on relation {}", relation_id);
    Ok(true)
}

/// Remove the site a departing region enrolled with
pub async fn remove_enrolled_site(
    ctx: &Context,
    relation_id: u32,
    cluster_id: Option<&str>,
) -> Outcome {
    if !ctx.leadership.is_leader() {
        return Outcome::Applied;
    }
    let Some(cluster_id) = cluster_id else {
        warn!(
            "Relation {} departed without a cluster id; no site to remove",
            relation_id
        );
        return Outcome::Applied;
    };
    let credentials = match operator_credentials(ctx).await {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return Outcome::Deferred(NO_CREDENTIALS.to_string()),
        Err(e) => return Outcome::Deferred(e.to_string()),
    };
    match ctx.api.remove_site(&credentials, cluster_id).await {
        Ok(()) => {
            info!("Removed site for cluster {}", cluster_id);
            Outcome::Applied
        }
        Err(e) => {
            warn!("Unable to remove site for cluster {}: {}", cluster_id, e);
            Outcome::Deferred(e.to_string())
        }
    }
}
