//! # Create Admin Command

use anyhow::Result;
use kube::Client;
use site_manager_operator::config::OperatorConfig;
use site_manager_operator::controller::actions::create_admin;
use site_manager_operator::workload::{PebbleClient, PodExec, SidecarWorkload};

/// Create an admin user and print the action result as JSON
pub async fn create_admin_command(
    client: Client,
    config: &OperatorConfig,
    username: &str,
    password: &str,
    email: &str,
    fullname: Option<&str>,
) -> Result<()> {
    let workload = SidecarWorkload::new(
        PebbleClient::new(&config.pebble_url)?,
        PodExec::new(
            client,
            &config.namespace,
            &config.pod_name,
            &config.workload_container,
        ),
    );
    let result = create_admin(&workload, username, password, email, fullname).await?;
    println!("{result}");
    Ok(())
}
