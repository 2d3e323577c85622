//! # Site Manager Operator
//!
//! Kubernetes operator for the MAAS Site Manager workload.
//!
//! The operator runs next to the workload container in the same pod. It reads
//! application configuration from the `SiteManager` resource and integration
//! data from relation Secrets, drives the workload through its Pebble API, and
//! publishes the outcome to the resource's status.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    site_manager_operator::runtime::run().await
}
