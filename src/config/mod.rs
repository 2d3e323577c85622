//! # Configuration
//!
//! Process-level settings. The application configuration lives on the
//! `SiteManager` resource, see [`crate::crd::SiteManagerSpec`].

mod operator;

pub use operator::{LogFormat, OperatorConfig};
