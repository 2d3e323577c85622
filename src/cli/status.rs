//! # Status Command
//!
//! Command to show the status of a SiteManager resource.

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use site_manager_operator::crd::SiteManager;

/// Show the spec and status of a SiteManager resource
pub async fn status_command(client: Client, name: &str, namespace: &str) -> Result<()> {
    let api: Api<SiteManager> = Api::namespaced(client, namespace);
    let resource = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get SiteManager '{namespace}/{name}'"))?;

    println!("📊 Status for SiteManager '{namespace}/{name}'");
    println!();
    println!("Spec:");
    println!("  Log Level: {}", resource.spec.log_level);
    println!(
        "  Temporal Server: {}",
        if resource.spec.temporal_server_address.is_empty() {
            "<unset>"
        } else {
            &resource.spec.temporal_server_address
        }
    );
    println!("  Temporal Namespace: {}", resource.spec.temporal_namespace);
    println!("  Temporal Task Queue: {}", resource.spec.temporal_task_queue);
    println!("  Temporal Required: {}", resource.spec.temporal_required);

    println!();
    println!("Status:");
    let Some(status) = resource.status else {
        println!("  <not reported yet>");
        return Ok(());
    };
    println!("  Phase: {}", status.phase.as_deref().unwrap_or("<unknown>"));
    if let Some(message) = status.message.as_deref().filter(|m| !m.is_empty()) {
        println!("  Message: {message}");
    }
    if let Some(version) = &status.workload_version {
        println!("  Workload Version: {version}");
    }
    if let Some(reporter) = &status.reported_by {
        println!("  Reported By: {reporter}");
    }
    if let Some(time) = &status.last_reconcile_time {
        println!("  Last Reconcile: {time}");
    }
    for condition in &status.conditions {
        println!(
            "  Condition {}: {} ({})",
            condition.r#type,
            condition.status,
            condition.reason.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
