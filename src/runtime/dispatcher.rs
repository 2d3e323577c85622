//! # Dispatcher
//!
//! Single consumer of the event channel. Events are handled strictly one at a
//! time; deferred events are queued once and redelivered, in order, before the
//! next new event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::controller::{Event, Operator, Outcome};
use crate::observability::metrics;

#[derive(Debug)]
pub struct Dispatcher {
    operator: Operator,
    deferred: Vec<Event>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            deferred: Vec::new(),
        }
    }

    #[must_use]
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Events waiting for redelivery, oldest first
    #[must_use]
    pub fn deferred(&self) -> &[Event] {
        &self.deferred
    }

    fn defer(&mut self, event: Event) {
        if !self.deferred.contains(&event) {
            self.deferred.push(event);
        }
    }

    async fn redeliver(&mut self) {
        let pending = std::mem::take(&mut self.deferred);
        for event in pending {
            debug!("Redelivering {}", event.name());
            if self.operator.handle(&event).await.is_deferred() {
                self.defer(event);
            }
        }
    }

    /// Redeliver deferred events, then handle `event`
    pub async fn deliver(&mut self, event: Event) -> Outcome {
        self.redeliver().await;
        let outcome = self.operator.handle(&event).await;
        if outcome.is_deferred() {
            self.defer(event);
        }
        metrics::set_deferred_events(self.deferred.len());
        outcome
    }

    /// Consume events until every sender is gone
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>, ready: Arc<AtomicBool>) {
        info!("Event loop started");
        ready.store(true, Ordering::Relaxed);
        while let Some(event) = events.recv().await {
            let name = event.name();
            let outcome = self.deliver(event).await;
            debug!("{} -> {:?}", name, outcome);
        }
        ready.store(false, Ordering::Relaxed);
        info!("Event loop stopped");
    }
}
