//! # Pebble Poller
//!
//! The workload runtime has no push channel to the operator, so reachability
//! and the `http-test` check are polled and edge-triggered into events.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::constants::HEALTH_CHECK_NAME;
use crate::controller::Event;
use crate::workload::{CheckStatus, Workload};

pub struct PebblePoller {
    workload: Arc<dyn Workload>,
    interval: Duration,
    connected: bool,
    check: Option<CheckStatus>,
}

impl std::fmt::Debug for PebblePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PebblePoller")
            .field("interval", &self.interval)
            .field("connected", &self.connected)
            .field("check", &self.check)
            .finish_non_exhaustive()
    }
}

impl PebblePoller {
    #[must_use]
    pub fn new(workload: Arc<dyn Workload>, interval: Duration) -> Self {
        Self {
            workload,
            interval,
            connected: false,
            check: None,
        }
    }

    /// Sample the runtime once and return the transitions since the last sample
    pub async fn poll_once(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let reachable = self.workload.can_connect().await;
        if reachable && !self.connected {
            info!("Workload runtime is reachable");
            events.push(Event::WorkloadReady);
        }
        self.connected = reachable;

        let status = if reachable {
            self.workload
                .check_status(HEALTH_CHECK_NAME)
                .await
                .ok()
                .flatten()
        } else {
            None
        };
        let was_up = self.check == Some(CheckStatus::Up);
        let is_up = status == Some(CheckStatus::Up);
        if is_up && !was_up {
            events.push(Event::CheckRecovered);
        } else if was_up && !is_up {
            events.push(Event::CheckFailed);
        }
        self.check = status;
        events
    }

    pub async fn run(mut self, events: mpsc::Sender<Event>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for event in self.poll_once().await {
                debug!("Pebble event {}", event.name());
                if events.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}
