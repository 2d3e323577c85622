//! # Controller
//!
//! Operator logic for the Site Manager workload.
//!
//! - `events`: lifecycle events and handling outcomes
//! - `reconciler`: the reconciliation pass and status model
//! - `layer`: desired workload spec and log-target merge
//! - `bootstrap`: one-time operator admin user
//! - `tls`: workload TLS key pair
//! - `trust`: CA-transfer trust bundle
//! - `enroll`: enrollment tokens and site removal
//! - `actions`: on-demand operations (`create-admin`)

pub mod actions;
pub mod bootstrap;
pub mod enroll;
pub mod events;
pub mod files;
pub mod layer;
pub mod reconciler;
pub mod tls;
pub mod trust;

pub use events::{Event, Outcome};
pub use reconciler::{Context, Operator, OperatorError, OperatorStatus, StatusSink};
