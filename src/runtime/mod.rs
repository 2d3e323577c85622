//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization.rs` - startup and capability construction
//! - `dispatcher.rs` - sequential event loop with redelivery of deferred events
//! - `watchers.rs` - `SiteManager` and relation Secret watches
//! - `pebble_poller.rs` - workload reachability and health-check transitions
//! - `leader_election.rs` - Lease-based leader election
//! - `status_writer.rs` - status subresource publishing
//! - `server.rs` - metrics and probe endpoints

pub mod dispatcher;
pub mod initialization;
pub mod leader_election;
pub mod pebble_poller;
pub mod server;
pub mod status_writer;
pub mod watchers;

use anyhow::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::constants::EVENT_CHANNEL_CAPACITY;
use dispatcher::Dispatcher;
use initialization::initialize;
use leader_election::LeaderElector;
use pebble_poller::PebblePoller;

/// Run the operator until SIGINT/SIGTERM
///
/// # Errors
///
/// Returns an error if initialization fails.
pub async fn run() -> Result<()> {
    let init = initialize().await?;
    let config = init.config;
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let elector = Arc::new(LeaderElector::new(
        init.client.clone(),
        &config.namespace,
        &config.lease_name,
        &config.pod_name,
        init.leadership.clone(),
    ));
    let election = {
        let elector = Arc::clone(&elector);
        let tx = tx.clone();
        tokio::spawn(async move { elector.run(tx).await })
    };

    let workload = Arc::clone(&init.operator.context().workload);
    let poller = tokio::spawn(
        PebblePoller::new(workload, config.pebble_poll_interval()).run(tx.clone()),
    );
    let config_watch = tokio::spawn(watchers::watch_site_manager(
        init.site_managers,
        config.app_name.clone(),
        Arc::clone(&init.status),
        tx.clone(),
        config.watch_restart_delay(),
    ));
    let relation_watch = tokio::spawn(watchers::watch_relations(
        init.relation_secrets,
        config.app_name.clone(),
        tx,
        config.watch_restart_delay(),
    ));

    let ready = Arc::clone(&init.server_state.is_ready);
    let mut event_loop = tokio::spawn(Dispatcher::new(init.operator).run(rx, ready));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping...");
        }
        _ = &mut event_loop => {
            warn!("Event loop exited");
        }
    }

    init.server_state.is_ready.store(false, Ordering::Relaxed);
    for task in [election, poller, config_watch, relation_watch] {
        task.abort();
    }
    event_loop.abort();

    if let Err(e) = elector.release().await {
        warn!("Failed to release lease: {}", e);
    }
    init.tracing.shutdown().await;
    info!("Operator stopped");
    Ok(())
}
