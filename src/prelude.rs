//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use site_manager_operator::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::controller::{
    Context, Event, Operator, OperatorError, OperatorStatus, Outcome, StatusSink,
};

pub use crate::client::{ApiError, Credentials, SiteManagerApi};
pub use crate::integrations::{IntegrationData, Relation, RelationError, RelationSource};
pub use crate::observability::TracingSink;
pub use crate::store::{Leadership, PeerFacts, SecretStore};
pub use crate::workload::{Workload, WorkloadError};

pub use crate::config::OperatorConfig;
