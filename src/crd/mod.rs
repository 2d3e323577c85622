//! # Custom Resource Definitions
//!
//! CRD types for the Site Manager operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `SiteManager` desired state (the application configuration surface)
//! - `status.rs` - Status published after every reconciliation pass

mod spec;
mod status;

pub use spec::{
    default_log_level, default_temporal_namespace, default_temporal_task_queue, default_true,
    SiteManager, SiteManagerSpec,
};
pub use status::{Condition, SiteManagerStatus};
