//! # OpenTelemetry Support
//!
//! Span export is driven by the tracing integration rather than by static
//! configuration: the subscriber is built with an empty, reloadable
//! OpenTelemetry layer, and [`OtlpTracing`] swaps an OTLP/HTTP exporter in or
//! out whenever the integration publishes or withdraws a receiver.
//!
//! The HTTP exporter uses a blocking client, so providers are built and shut
//! down on the blocking pool.

use async_trait::async_trait;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::config::LogFormat;

/// The swappable OpenTelemetry layer, empty while no receiver is known
pub type OtelLayer = Option<tracing_opentelemetry::OpenTelemetryLayer<Registry, SdkTracer>>;

/// Handle used to swap the OpenTelemetry layer at runtime
pub type OtelReloadHandle = reload::Handle<OtelLayer, Registry>;

const DEFAULT_FILTER: &str = "site_manager_operator=info";

/// Where spans go
#[async_trait]
pub trait TracingSink: Send + Sync {
    /// Export to `endpoint`, or stop exporting with `None`
    async fn configure(&self, endpoint: Option<&str>);
}

/// Install the global subscriber: env filter, text or JSON output, and an
/// initially empty OpenTelemetry layer
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_subscriber(format: LogFormat) -> anyhow::Result<OtelReloadHandle> {
    let (otel_layer, handle) = reload::Layer::new(OtelLayer::None);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(otel_layer).with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()?,
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }
    Ok(handle)
}

/// OTLP/HTTP traces URL for a receiver base URL
fn traces_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.ends_with("/v1/traces") {
        endpoint.to_string()
    } else {
        format!("{endpoint}/v1/traces")
    }
}

fn build_resource(service_name: &str) -> Resource {
    let mut attributes = vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new(
            "service.version",
            format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("BUILD_GIT_HASH")),
        ),
    ];
    if let Ok(pod_name) = std::env::var("POD_NAME") {
        attributes.push(KeyValue::new("k8s.pod.name", pod_name));
    }
    if let Ok(namespace) = std::env::var("POD_NAMESPACE") {
        attributes.push(KeyValue::new("k8s.namespace.name", namespace));
    }
    Resource::builder_empty().with_attributes(attributes).build()
}

fn build_provider(endpoint: &str, service_name: &str) -> Result<SdkTracerProvider, String> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(traces_url(endpoint))
        .build()
        .map_err(|e| e.to_string())?;
    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(build_resource(service_name))
        .build())
}

fn shutdown_provider(provider: SdkTracerProvider) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = provider.shutdown() {
            warn!("Error shutting down tracer provider: {}", e);
        }
    });
}

struct ActiveExporter {
    endpoint: String,
    provider: SdkTracerProvider,
}

/// [`TracingSink`] backed by the subscriber's reloadable OpenTelemetry layer
pub struct OtlpTracing {
    handle: OtelReloadHandle,
    service_name: String,
    active: Mutex<Option<ActiveExporter>>,
}

impl std::fmt::Debug for OtlpTracing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtlpTracing")
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

impl OtlpTracing {
    #[must_use]
    pub fn new(handle: OtelReloadHandle, service_name: &str) -> Self {
        Self {
            handle,
            service_name: service_name.to_string(),
            active: Mutex::new(None),
        }
    }

    /// Flush and stop the current exporter, if any
    pub async fn shutdown(&self) {
        if let Some(active) = self.active.lock().await.take() {
            if let Err(e) = self.handle.reload(OtelLayer::None) {
                warn!("Failed to detach OpenTelemetry layer: {}", e);
            }
            shutdown_provider(active.provider);
        }
    }
}

#[async_trait]
impl TracingSink for OtlpTracing {
    async fn configure(&self, endpoint: Option<&str>) {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|a| a.endpoint.as_str()) == endpoint {
            return;
        }

        let previous = active.take();
        if let Some(endpoint) = endpoint {
            let owned_endpoint = endpoint.to_string();
            let service_name = self.service_name.clone();
            let built =
                tokio::task::spawn_blocking(move || build_provider(&owned_endpoint, &service_name))
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|r| r);
            match built {
                Ok(provider) => {
                    let tracer = provider.tracer(self.service_name.clone());
                    let layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    match self.handle.reload(Some(layer)) {
                        Ok(()) => {
                            info!("✅ Exporting traces to {}", traces_url(endpoint));
                            *active = Some(ActiveExporter {
                                endpoint: endpoint.to_string(),
                                provider,
                            });
                        }
                        Err(e) => {
                            warn!("Failed to attach OpenTelemetry layer: {}", e);
                            shutdown_provider(provider);
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to build OTLP exporter for {}: {}", endpoint, e);
                    if let Err(e) = self.handle.reload(OtelLayer::None) {
                        warn!("Failed to detach OpenTelemetry layer: {}", e);
                    }
                }
            }
        } else {
            if let Err(e) = self.handle.reload(OtelLayer::None) {
                warn!("Failed to detach OpenTelemetry layer: {}", e);
            }
            info!("Trace export disabled");
        }

        if let Some(previous) = previous {
            shutdown_provider(previous.provider);
        }
    }
}
