//! # Observability
//!
//! - `metrics`: Prometheus metrics collection
//! - `otel`: Subscriber setup and runtime-configurable OpenTelemetry export

pub mod metrics;
pub mod otel;

pub use otel::{init_subscriber, OtelReloadHandle, OtlpTracing, TracingSink};
