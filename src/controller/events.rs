//! # Events
//!
//! Every lifecycle trigger the operator reacts to, and what handling one
//! produced.

use crate::crd::SiteManagerSpec;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The `SiteManager` resource was created or its spec changed
    ConfigChanged(SiteManagerSpec),
    /// The workload runtime became reachable
    WorkloadReady,
    /// The health check went up
    CheckRecovered,
    /// The health check went from up to anything else
    CheckFailed,
    DatabaseCreated,
    DatabaseEndpointsChanged,
    DatabaseBroken,
    LoggingEndpointsChanged,
    IngressReady { url: String },
    IngressRevoked,
    CertificatesChanged,
    ObjectStorageChanged,
    CaTransferChanged { relation_id: u32 },
    CaTransferRemoved { relation_id: u32 },
    TracingChanged,
    EnrollJoined { relation_id: u32 },
    /// Carries the cluster id the remote side enrolled with, if it published one
    EnrollBroken {
        relation_id: u32,
        cluster_id: Option<String>,
    },
    /// This replica acquired leadership
    LeaderElected,
}

impl Event {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::ConfigChanged(_) => "config-changed",
            Event::WorkloadReady => "workload-ready",
            Event::CheckRecovered => "check-recovered",
            Event::CheckFailed => "check-failed",
            Event::DatabaseCreated => "database-created",
            Event::DatabaseEndpointsChanged => "database-endpoints-changed",
            Event::DatabaseBroken => "database-broken",
            Event::LoggingEndpointsChanged => "logging-endpoints-changed",
            Event::IngressReady { .. } => "ingress-ready",
            Event::IngressRevoked => "ingress-revoked",
            Event::CertificatesChanged => "certificates-changed",
            Event::ObjectStorageChanged => "object-storage-changed",
            Event::CaTransferChanged { .. } => "ca-transfer-changed",
            Event::CaTransferRemoved { .. } => "ca-transfer-removed",
            Event::TracingChanged => "tracing-changed",
            Event::EnrollJoined { .. } => "enroll-joined",
            Event::EnrollBroken { .. } => "enroll-broken",
            Event::LeaderElected => "leader-elected",
        }
    }
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Desired state applied, or nothing to do
    Applied,
    /// Not ready; a later event will re-trigger
    Waiting(String),
    /// Redeliver this event later
    Deferred(String),
    /// Operator intervention required
    Blocked(String),
}

impl Outcome {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Waiting(_) => "waiting",
            Outcome::Deferred(_) => "deferred",
            Outcome::Blocked(_) => "blocked",
        }
    }

    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Outcome::Deferred(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_kind() {
        assert_eq!(Outcome::Applied.kind(), "applied");
        assert_eq!(Outcome::Deferred("x".into()).kind(), "deferred");
        assert!(Outcome::Deferred("x".into()).is_deferred());
        assert!(!Outcome::Blocked("x".into()).is_deferred());
    }

    #[test]
    fn test_identical_events_compare_equal() {
        assert_eq!(
            Event::EnrollJoined { relation_id: 3 },
            Event::EnrollJoined { relation_id: 3 }
        );
        assert_ne!(
            Event::CaTransferChanged { relation_id: 3 },
            Event::CaTransferRemoved { relation_id: 3 }
        );
    }
}
