//! # Initialization
//!
//! Operator startup: rustls, tracing, metrics, probe server, Kubernetes
//! client, and the capability implementations the reconciler runs against.

use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::server::{start_server, ServerState};
use super::status_writer::KubeStatusSink;
use crate::client::SiteManagerClient;
use crate::config::OperatorConfig;
use crate::controller::{Context, Operator};
use crate::crd::SiteManager;
use crate::integrations::KubeRelationSource;
use crate::observability::{self, OtlpTracing};
use crate::store::{ConfigMapPeerFacts, KubeSecretStore, SharedLeadership};
use crate::workload::{PebbleClient, PodExec, SidecarWorkload};

/// Everything [`super::run`] wires together
pub struct Initialized {
    pub config: OperatorConfig,
    pub client: Client,
    pub server_state: Arc<ServerState>,
    pub leadership: SharedLeadership,
    pub tracing: Arc<OtlpTracing>,
    pub status: Arc<KubeStatusSink>,
    pub site_managers: Api<SiteManager>,
    pub relation_secrets: Api<Secret>,
    pub operator: Operator,
}

impl std::fmt::Debug for Initialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initialized")
            .field("config", &self.config)
            .field("operator", &self.operator)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// # Errors
///
/// Returns an error if logging, metrics, the probe server or the Kubernetes
/// client cannot be set up.
pub async fn initialize() -> Result<Initialized> {
    // Required for rustls 0.23+ before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    let config = OperatorConfig::from_env();
    let otel_handle =
        observability::init_subscriber(config.log_format).context("Failed to initialize logging")?;

    info!("Starting Site Manager operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!("HTTP server error: {}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let leadership = SharedLeadership::new(false);
    let site_managers: Api<SiteManager> = Api::namespaced(client.clone(), &config.namespace);
    let status = Arc::new(KubeStatusSink::new(
        site_managers.clone(),
        &config.app_name,
        &config.pod_name,
        Arc::new(leadership.clone()),
    ));
    let tracing = Arc::new(OtlpTracing::new(otel_handle, &config.app_name));

    let workload = SidecarWorkload::new(
        PebbleClient::new(&config.pebble_url)?,
        PodExec::new(
            client.clone(),
            &config.namespace,
            &config.pod_name,
            &config.workload_container,
        ),
    );
    let ctx = Context {
        app_name: config.app_name.clone(),
        namespace: config.namespace.clone(),
        workload: Arc::new(workload),
        relations: Arc::new(KubeRelationSource::new(
            client.clone(),
            &config.namespace,
            &config.app_name,
        )),
        peers: Arc::new(ConfigMapPeerFacts::new(
            client.clone(),
            &config.namespace,
            &config.peers_config_map(),
            Arc::new(leadership.clone()),
        )),
        secrets: Arc::new(KubeSecretStore::new(
            client.clone(),
            &config.namespace,
            &config.app_name,
        )),
        leadership: Arc::new(leadership.clone()),
        api: Arc::new(SiteManagerClient::new(&config.workload_url)?),
        status: status.clone(),
        tracing: tracing.clone(),
    };

    let spec = site_managers
        .get_opt(&config.app_name)
        .await
        .with_context(|| format!("Failed to read SiteManager '{}'", config.app_name))?
        .map(|resource| resource.spec)
        .unwrap_or_default();
    let operator = Operator::new(ctx, spec);

    info!(
        "Operator initialized for '{}' in namespace '{}'",
        config.app_name, config.namespace
    );

    Ok(Initialized {
        relation_secrets: Api::namespaced(client.clone(), &config.namespace),
        config,
        client,
        server_state,
        leadership,
        tracing,
        status,
        site_managers,
        operator,
    })
}

async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &OperatorConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state
            .is_listening
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
