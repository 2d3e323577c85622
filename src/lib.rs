//! Site Manager Operator Library
//!
//! Reconciliation, integration readers and Kubernetes-backed capabilities for
//! the Site Manager operator. Tests are included in the module files and in
//! `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use site_manager_operator::prelude::*;
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod integrations;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
pub mod workload;
