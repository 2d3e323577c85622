//! # Watchers
//!
//! Turn Kubernetes watch streams into operator events:
//!
//! - the `SiteManager` resource becomes [`Event::ConfigChanged`]
//! - relation Secrets become integration events via [`RelationTracker`]
//!
//! Both watches restart after the stream ends.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use kube_runtime::watcher;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::status_writer::KubeStatusSink;
use crate::constants::{
    APP_LABEL_KEY, CA_TRANSFER_ENDPOINT, CERTIFICATES_ENDPOINT, DATABASE_ENDPOINT,
    ENROLL_ENDPOINT, INGRESS_ENDPOINT, LOGGING_ENDPOINT, OBJECT_STORAGE_ENDPOINT,
    RELATION_ENDPOINT_KEY, TRACING_ENDPOINT,
};
use crate::controller::Event;
use crate::crd::SiteManager;
use crate::integrations::{ingress_url, relation_from_secret, Relation};

/// Remote app data key the enrolled region publishes its cluster id under
pub const CLUSTER_ID_KEY: &str = "uuid";

/// What happened to one relation
#[derive(Debug, Clone, Copy)]
pub enum RelationChange<'a> {
    Joined(&'a Relation),
    Changed(&'a Relation),
    Departed(&'a Relation),
}

impl<'a> RelationChange<'a> {
    fn relation(&self) -> &'a Relation {
        match self {
            RelationChange::Joined(r) | RelationChange::Changed(r) | RelationChange::Departed(r) => {
                r
            }
        }
    }
}

/// The operator event a relation change maps to, if any
#[must_use]
pub fn event_for(change: RelationChange<'_>) -> Option<Event> {
    let relation = change.relation();
    let departed = matches!(change, RelationChange::Departed(_));
    match relation.endpoint.as_str() {
        DATABASE_ENDPOINT => Some(match change {
            RelationChange::Joined(_) => Event::DatabaseCreated,
            RelationChange::Changed(_) => Event::DatabaseEndpointsChanged,
            RelationChange::Departed(_) => Event::DatabaseBroken,
        }),
        OBJECT_STORAGE_ENDPOINT => Some(Event::ObjectStorageChanged),
        LOGGING_ENDPOINT => Some(Event::LoggingEndpointsChanged),
        CERTIFICATES_ENDPOINT => Some(Event::CertificatesChanged),
        TRACING_ENDPOINT => Some(Event::TracingChanged),
        INGRESS_ENDPOINT if departed => Some(Event::IngressRevoked),
        INGRESS_ENDPOINT => match ingress_url(std::slice::from_ref(relation)) {
            Some(url) => Some(Event::IngressReady { url }),
            // A cleared url withdraws the prefix just like a departure
            None if matches!(change, RelationChange::Changed(_)) => Some(Event::IngressRevoked),
            None => None,
        },
        CA_TRANSFER_ENDPOINT if departed => Some(Event::CaTransferRemoved {
            relation_id: relation.id,
        }),
        CA_TRANSFER_ENDPOINT => Some(Event::CaTransferChanged {
            relation_id: relation.id,
        }),
        ENROLL_ENDPOINT => match change {
            RelationChange::Joined(_) => Some(Event::EnrollJoined {
                relation_id: relation.id,
            }),
            RelationChange::Changed(_) => None,
            RelationChange::Departed(_) => Some(Event::EnrollBroken {
                relation_id: relation.id,
                cluster_id: relation.app_data.get(CLUSTER_ID_KEY).cloned(),
            }),
        },
        _ => None,
    }
}

type RelationKey = (String, u32);

/// Remembers the last remote state of every relation
///
/// Only remote data counts as a change; our own writes to the local bag
/// come back through the watch and must not re-trigger handlers.
#[derive(Debug, Default)]
pub struct RelationTracker {
    seen: BTreeMap<RelationKey, Relation>,
    listing: Option<BTreeSet<RelationKey>>,
}

fn same_remote_state(a: &Relation, b: &Relation) -> bool {
    a.remote_app == b.remote_app && a.app_data == b.app_data && a.units == b.units
}

impl RelationTracker {
    /// Record a live relation and report how it changed
    pub fn observe(&mut self, relation: Relation) -> Option<Event> {
        let key = (relation.endpoint.clone(), relation.id);
        if let Some(listing) = self.listing.as_mut() {
            listing.insert(key.clone());
        }
        let event = match self.seen.get(&key) {
            None => event_for(RelationChange::Joined(&relation)),
            Some(previous) if !same_remote_state(previous, &relation) => {
                event_for(RelationChange::Changed(&relation))
            }
            Some(_) => None,
        };
        self.seen.insert(key, relation);
        event
    }

    /// Forget a relation and report its departure with the last known data
    pub fn depart(&mut self, endpoint: &str, id: u32) -> Option<Event> {
        let relation = self.seen.remove(&(endpoint.to_string(), id))?;
        event_for(RelationChange::Departed(&relation))
    }

    /// A relist begins; relations missing from it have departed
    pub fn begin_listing(&mut self) {
        self.listing = Some(BTreeSet::new());
    }

    /// The relist is complete: depart every relation it did not contain
    pub fn finish_listing(&mut self) -> Vec<Event> {
        let Some(listed) = self.listing.take() else {
            return Vec::new();
        };
        let gone: Vec<RelationKey> = self
            .seen
            .keys()
            .filter(|key| !listed.contains(*key))
            .cloned()
            .collect();
        gone.into_iter()
            .filter_map(|(endpoint, id)| self.depart(&endpoint, id))
            .collect()
    }

    fn apply(&mut self, secret: &Secret) -> Vec<Event> {
        match relation_from_secret(secret) {
            Ok(Some(relation)) if secret.metadata.deletion_timestamp.is_some() => {
                self.depart(&relation.endpoint, relation.id).into_iter().collect()
            }
            Ok(Some(relation)) => self.observe(relation).into_iter().collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Ignoring relation secret: {}", e);
                Vec::new()
            }
        }
    }

    fn delete(&mut self, secret: &Secret) -> Vec<Event> {
        match relation_from_secret(secret) {
            Ok(Some(relation)) => self.depart(&relation.endpoint, relation.id).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

async fn send_all(events: &mpsc::Sender<Event>, batch: Vec<Event>) -> bool {
    for event in batch {
        debug!("Relation event {}", event.name());
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

/// Watch the relation Secrets of `app_name` and forward the events they imply
pub async fn watch_relations(
    secrets: Api<Secret>,
    app_name: String,
    events: mpsc::Sender<Event>,
    restart_delay: Duration,
) {
    let selector = format!("{APP_LABEL_KEY}={app_name},{RELATION_ENDPOINT_KEY}");
    let mut tracker = RelationTracker::default();
    loop {
        info!("Starting relation watch ({})", selector);
        let stream = watcher(secrets.clone(), watcher::Config::default().labels(&selector));
        pin_mut!(stream);

        while let Some(event_result) = stream.next().await {
            let batch = match event_result {
                Ok(watcher::Event::Init) => {
                    tracker.begin_listing();
                    Vec::new()
                }
                Ok(watcher::Event::InitApply(secret) | watcher::Event::Apply(secret)) => {
                    tracker.apply(&secret)
                }
                Ok(watcher::Event::Delete(secret)) => tracker.delete(&secret),
                Ok(watcher::Event::InitDone) => tracker.finish_listing(),
                Err(e) => {
                    error!("Error watching relation secrets: {}", e);
                    Vec::new()
                }
            };
            if !send_all(&events, batch).await {
                return;
            }
        }

        warn!("Relation watch stream ended, restarting in {:?}", restart_delay);
        tokio::time::sleep(restart_delay).await;
    }
}

/// Watch the `SiteManager` resource named after the application
pub async fn watch_site_manager(
    api: Api<SiteManager>,
    name: String,
    status: Arc<KubeStatusSink>,
    events: mpsc::Sender<Event>,
    restart_delay: Duration,
) {
    loop {
        info!("Starting watch for SiteManager '{}'", name);
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let stream = watcher(api.clone(), config);
        pin_mut!(stream);

        let mut last_spec = None;
        while let Some(event_result) = stream.next().await {
            match event_result {
                Ok(watcher::Event::InitApply(resource) | watcher::Event::Apply(resource)) => {
                    if let Some(generation) = resource.metadata.generation {
                        status.observe_generation(generation);
                    }
                    if last_spec.as_ref() == Some(&resource.spec) {
                        continue;
                    }
                    last_spec = Some(resource.spec.clone());
                    if events
                        .send(Event::ConfigChanged(resource.spec))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(watcher::Event::Delete(_)) => {
                    warn!("SiteManager '{}' was deleted; keeping the last configuration", name);
                    last_spec = None;
                }
                Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
                Err(e) => {
                    error!("Error watching SiteManager '{}': {}", name, e);
                }
            }
        }

        warn!("SiteManager watch stream ended, restarting in {:?}", restart_delay);
        tokio::time::sleep(restart_delay).await;
    }
}
