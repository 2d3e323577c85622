//! # Admin Bootstrap
//!
//! Provisions the operator's own admin user in the workload, once per peer
//! channel lifetime. The guard is the operator-credential peer fact: while it
//! is recorded, bootstrap never runs again.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde_json::json;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::reconciler::{Context, OperatorError};
use crate::constants::{OPERATOR_CREDENTIAL_LABEL, SERVICE_NAME};
use crate::observability::metrics;
use crate::store::{secret_reference, upsert, FactId, SecretContent};
use crate::workload::Workload;

pub const PASSWORD_LENGTH: usize = 16;

/// Random password drawn uniformly from `[A-Za-z0-9]`
#[must_use]
pub fn generate_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// A Site Manager admin user
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AdminCredential {
    pub username: String,
    pub email: String,
    pub password: String,
    pub fullname: Option<String>,
}

impl std::fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredential")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("fullname", &self.fullname)
            .finish_non_exhaustive()
    }
}

impl AdminCredential {
    /// Fresh operator credential for `app_name`
    #[must_use]
    pub fn for_operator(app_name: &str) -> Self {
        Self {
            username: format!("{app_name}-operator"),
            email: format!("no-reply@{app_name}.operator"),
            password: generate_password(),
            fullname: Some(format!("{app_name} operator")),
        }
    }

    #[must_use]
    pub fn create_user_command(&self) -> Vec<String> {
        let mut command = vec![
            "msm-admin".to_string(),
            "create-user".to_string(),
            "--admin".to_string(),
            self.username.clone(),
            self.email.clone(),
            self.password.clone(),
        ];
        if let Some(fullname) = self.fullname.as_ref().filter(|f| !f.is_empty()) {
            command.push(fullname.clone());
        }
        command
    }

    /// Secret content; the workload logs in with the email
    #[must_use]
    pub fn secret_content(&self) -> SecretContent {
        SecretContent::from([
            ("username".to_string(), self.email.clone()),
            ("password".to_string(), self.password.clone()),
        ])
    }
}

/// Run `msm-admin create-user` in the service's environment
///
/// `false` when the runtime is unreachable, the service is not declared, the
/// exec fails, or the command exits non-zero.
pub async fn create_user(workload: &dyn Workload, credential: &AdminCredential) -> bool {
    info!("Creating user {}", credential.username);
    if !workload.can_connect().await {
        return false;
    }
    match workload.service_status(SERVICE_NAME).await {
        Ok(Some(_)) => {}
        Ok(None) => return false,
        Err(e) => {
            warn!("Unable to query service '{}': {}", SERVICE_NAME, e);
            return false;
        }
    }
    match workload
        .exec(&credential.create_user_command(), Some(SERVICE_NAME))
        .await
    {
        Ok(output) if output.success() => true,
        Ok(output) => {
            warn!(
                "create-user for {} exited with {}: {}",
                credential.username,
                output.exit_code,
                output.stderr.trim()
            );
            false
        }
        Err(e) => {
            warn!("create-user for {} failed: {}", credential.username, e);
            false
        }
    }
}

/// Whether this replica should bootstrap now
///
/// # Errors
///
/// Returns an error if the peer channel cannot be read.
pub async fn bootstrap_required(ctx: &Context) -> Result<bool, OperatorError> {
    if !ctx.leadership.is_leader() || !ctx.peers.available().await? {
        return Ok(false);
    }
    Ok(secret_reference(ctx.peers.as_ref(), FactId::OperatorCredential)
        .await?
        .is_none())
}

/// Provision the operator user, store its credential and record the reference
///
/// # Errors
///
/// [`OperatorError::OperatorUserProvisioningFailed`] when the workload refuses
/// the user; nothing is recorded in that case.
pub async fn bootstrap_admin(ctx: &Context) -> Result<(), OperatorError> {
    let credential = AdminCredential::for_operator(&ctx.app_name);
    if !create_user(ctx.workload.as_ref(), &credential).await {
        metrics::increment_admin_bootstrap_errors();
        return Err(OperatorError::OperatorUserProvisioningFailed);
    }

    let (id, created) = upsert(
        ctx.secrets.as_ref(),
        OPERATOR_CREDENTIAL_LABEL,
        &credential.secret_content(),
    )
    .await?;
    ctx.peers
        .set(FactId::OperatorCredential, json!(id.as_str()))
        .await?;

    metrics::increment_admin_bootstraps();
    info!(
        "✅ Operator user {} provisioned ({} secret {})",
        credential.username,
        if created { "created" } else { "updated" },
        id
    );
    Ok(())
}
