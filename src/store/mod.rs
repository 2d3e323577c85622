//! # Credential Store
//!
//! Cluster-wide facts shared by all operator replicas, and the secrets they reference.
//!
//! - `peers.rs` - [`PeerFacts`]: leader-written, replica-readable fact bag
//! - `secrets.rs` - [`SecretStore`]: secret contents addressed by label or id
//! - `leadership.rs` - [`Leadership`]: whether this replica is the elected leader

mod leadership;
mod peers;
mod secrets;

pub use leadership::{Leadership, SharedLeadership};
pub use peers::{secret_reference, ConfigMapPeerFacts, FactId, PeerError, PeerFacts};
pub use secrets::{upsert, KubeSecretStore, SecretContent, SecretError, SecretId, SecretStore};
