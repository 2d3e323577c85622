//! # SMCTL CLI
//!
//! Command-line interface for the Site Manager operator.
//!
//! ## Usage
//!
//! ```bash
//! # Create an admin user in the workload
//! smctl create-admin --username admin --password s3cret --email admin@example.com
//!
//! # Show the status of the SiteManager resource
//! smctl status site-manager --namespace maas
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;

mod create_admin;
mod status;

/// Site Manager operator CLI
#[derive(Parser)]
#[command(name = "smctl")]
#[command(about = "Site Manager operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to POD_NAMESPACE, then "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an admin user in the Site Manager workload
    #[command(name = "create-admin")]
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        fullname: Option<String>,
        /// Pod running the workload container (defaults to POD_NAME)
        #[arg(long)]
        pod: Option<String>,
    },
    /// Show status of a SiteManager resource
    Status {
        /// Name of the SiteManager resource (defaults to APP_NAME)
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smctl=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = site_manager_operator::config::OperatorConfig::from_env();
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::CreateAdmin {
            username,
            password,
            email,
            fullname,
            pod,
        } => {
            if let Some(pod) = pod {
                config.pod_name = pod;
            }
            create_admin::create_admin_command(
                client,
                &config,
                &username,
                &password,
                &email,
                fullname.as_deref(),
            )
            .await
        }
        Commands::Status { name } => {
            let name = name.unwrap_or_else(|| config.app_name.clone());
            status::status_command(client, &name, &config.namespace).await
        }
    }
}
