//! # Leader Election
//!
//! Lease-based election over `coordination.k8s.io/v1`. Every replica runs the
//! operator; only the lease holder is the leader, which gates peer-fact writes,
//! admin bootstrap, certificate requests and enrollment.
//!
//! Updates carry the lease's `resourceVersion`, so a lease that changed between
//! read and write fails with 409 and the attempt is simply retried.

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::constants::FIELD_MANAGER;
use crate::controller::Event;
use crate::store::SharedLeadership;

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LeaderElectionError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("lease '{0}' has no resourceVersion")]
    MissingResourceVersion(String),
}

/// Whether a lease held by someone else may be taken over at `now`
#[must_use]
pub fn lease_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    let renew_time = spec.and_then(|s| s.renew_time.as_ref());
    let duration = spec.and_then(|s| s.lease_duration_seconds);
    let holder = spec.and_then(|s| s.holder_identity.as_ref());
    match (holder, renew_time, duration) {
        (Some(_), Some(renewed), Some(seconds)) => {
            now > renewed.0 + chrono::Duration::seconds(i64::from(seconds))
        }
        _ => true,
    }
}

pub struct LeaderElector {
    leases: Api<Lease>,
    lease_name: String,
    identity: String,
    leadership: SharedLeadership,
}

impl std::fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElector")
            .field("lease_name", &self.lease_name)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl LeaderElector {
    #[must_use]
    pub fn new(
        client: Client,
        namespace: &str,
        lease_name: &str,
        identity: &str,
        leadership: SharedLeadership,
    ) -> Self {
        Self {
            leases: Api::namespaced(client, namespace),
            lease_name: lease_name.to_string(),
            identity: identity.to_string(),
            leadership,
        }
    }

    /// Contend for the lease forever, flipping the shared flag on every change
    ///
    /// Sends [`Event::LeaderElected`] each time leadership is acquired.
    pub async fn run(&self, events: mpsc::Sender<Event>) {
        info!(identity = %self.identity, lease = %self.lease_name, "Starting leader election");
        loop {
            let held = match self.try_acquire_or_renew().await {
                Ok(held) => held,
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "Lease update failed");
                    false
                }
            };

            let was_leader = self.leadership.set(held);
            if held && !was_leader {
                info!(identity = %self.identity, "Leadership acquired");
                if events.send(Event::LeaderElected).await.is_err() {
                    return;
                }
            } else if !held && was_leader {
                warn!(identity = %self.identity, "Leadership lost");
            }

            tokio::time::sleep(if held { RENEW_INTERVAL } else { RETRY_INTERVAL }).await;
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError> {
        let now = Utc::now();
        let Some(lease) = self.leases.get_opt(&self.lease_name).await? else {
            return self.create_lease(now).await;
        };

        let spec = lease.spec.as_ref();
        let holder = spec.and_then(|s| s.holder_identity.as_deref());
        if holder == Some(self.identity.as_str()) {
            return self.renew_lease(&lease, now).await;
        }
        if !lease_expired(spec, now) {
            debug!(identity = %self.identity, holder = ?holder, "Lease held by another replica");
            return Ok(false);
        }

        let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);
        let resource_version = lease
            .metadata
            .resource_version
            .clone()
            .ok_or_else(|| LeaderElectionError::MissingResourceVersion(self.lease_name.clone()))?;
        let mut taken = self.lease_for(now, transitions + 1);
        taken.metadata.resource_version = Some(resource_version);
        self.replace(&taken).await
    }

    fn lease_for(&self, now: DateTime<Utc>, transitions: i32) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: i32::try_from(LEASE_DURATION.as_secs()).ok(),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(transitions),
                ..Default::default()
            }),
        }
    }

    async fn create_lease(&self, now: DateTime<Utc>) -> Result<bool, LeaderElectionError> {
        match self
            .leases
            .create(&PostParams::default(), &self.lease_for(now, 0))
            .await
        {
            Ok(_) => {
                info!(identity = %self.identity, "Created lease");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn renew_lease(&self, existing: &Lease, now: DateTime<Utc>) -> Result<bool, LeaderElectionError> {
        if existing.metadata.resource_version.is_none() {
            return Err(LeaderElectionError::MissingResourceVersion(
                self.lease_name.clone(),
            ));
        }
        let mut renewed = existing.clone();
        if let Some(spec) = renewed.spec.as_mut() {
            spec.renew_time = Some(MicroTime(now));
        }
        self.replace(&renewed).await
    }

    async fn replace(&self, lease: &Lease) -> Result<bool, LeaderElectionError> {
        match self
            .leases
            .replace(&self.lease_name, &PostParams::default(), lease)
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease changed concurrently");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Give the lease up so another replica can take over immediately
    ///
    /// # Errors
    ///
    /// Returns an error if the lease cannot be read or patched.
    pub async fn release(&self) -> Result<(), LeaderElectionError> {
        let Some(lease) = self.leases.get_opt(&self.lease_name).await? else {
            return Ok(());
        };
        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.identity.as_str()) {
            return Ok(());
        }
        let past = Utc::now() - chrono::Duration::seconds(60);
        let patch = json!({
            "spec": {
                "holderIdentity": null,
                "renewTime": past.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            }
        });
        self.leases
            .patch(
                &self.lease_name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        self.leadership.set(false);
        info!(identity = %self.identity, "Lease released");
        Ok(())
    }
}
