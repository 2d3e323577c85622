//! Operator actions invoked on demand

use serde_json::{json, Value};
use thiserror::Error;

use super::bootstrap::{create_user, AdminCredential};
use crate::workload::Workload;

#[derive(Debug, Error)]
#[error("Failed to create user {username}")]
pub struct CreateAdminError {
    pub username: String,
}

/// Create an admin user in the workload
///
/// # Errors
///
/// Fails when the runtime is unreachable, the service is missing, or the
/// provisioning command does not exit 0.
pub async fn create_admin(
    workload: &dyn Workload,
    username: &str,
    password: &str,
    email: &str,
    fullname: Option<&str>,
) -> Result<Value, CreateAdminError> {
    let credential = AdminCredential {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        fullname: fullname.map(ToString::to_string),
    };
    if create_user(workload, &credential).await {
        Ok(json!({ "info": format!("user {username} successfully created") }))
    } else {
        Err(CreateAdminError {
            username: username.to_string(),
        })
    }
}
