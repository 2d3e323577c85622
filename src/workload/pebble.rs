//! # Pebble REST Client
//!
//! Minimal client for the Pebble HTTP API exposed by the workload container
//! (`pebble run --http`). Covers layers, the plan, services and checks.
//!
//! Pebble wraps every response in an envelope:
//!
//! ```json
//! {"type": "sync", "status-code": 200, "status": "OK", "result": ...}
//! {"type": "async", "status-code": 202, "status": "Accepted", "change": "42"}
//! {"type": "error", "status-code": 400, "result": {"message": "..."}}
//! ```

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

use super::{CheckStatus, Layer, ServiceStatus, WorkloadError};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    #[serde(default)]
    change: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResult {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ServiceInfo {
    name: String,
    current: String,
}

#[derive(Debug, Deserialize)]
struct CheckInfo {
    name: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ChangeInfo {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    err: Option<String>,
}

/// Pebble HTTP API client
#[derive(Debug, Clone)]
pub struct PebbleClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl PebbleClient {
    /// Create a client for the Pebble API at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, WorkloadError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Envelope<T>, WorkloadError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Envelope<ErrorResult>>(&error_text)
                .ok()
                .and_then(|e| e.result)
                .map_or(error_text, |r| r.message);
            return Err(WorkloadError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| WorkloadError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Envelope<T>, WorkloadError> {
        let response = self
            .http_client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Envelope<T>, WorkloadError> {
        let response = self
            .http_client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Probe the API
    ///
    /// # Errors
    ///
    /// Returns an error when Pebble does not answer successfully.
    pub async fn system_info(&self) -> Result<(), WorkloadError> {
        self.get::<serde_json::Value>("/v1/system-info", &[])
            .await
            .map(|_| ())
    }

    /// Add a layer to the plan
    ///
    /// # Errors
    ///
    /// Returns an error if the layer cannot be serialized or Pebble rejects it.
    pub async fn add_layer(
        &self,
        label: &str,
        layer: &Layer,
        combine: bool,
    ) -> Result<(), WorkloadError> {
        let span = info_span!("pebble.add_layer", layer.label = label, combine);
        async move {
            let yaml =
                serde_yaml::to_string(layer).map_err(|e| WorkloadError::Decode(e.to_string()))?;
            let body = json!({
                "action": "add",
                "combine": combine,
                "label": label,
                "format": "yaml",
                "layer": yaml,
            });
            self.post::<serde_json::Value>("/v1/layers", &body).await?;
            debug!("Layer '{}' added", label);
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Fetch the combined plan
    ///
    /// # Errors
    ///
    /// Returns an error if Pebble cannot be reached or the plan does not parse.
    pub async fn plan(&self) -> Result<Layer, WorkloadError> {
        let envelope = self
            .get::<String>("/v1/plan", &[("format", "yaml")])
            .await?;
        let yaml = envelope.result.unwrap_or_default();
        if yaml.trim().is_empty() {
            return Ok(Layer::default());
        }
        serde_yaml::from_str(&yaml).map_err(|e| WorkloadError::Decode(e.to_string()))
    }

    /// Run state of a service
    ///
    /// # Errors
    ///
    /// Returns an error if Pebble cannot be reached.
    pub async fn service_status(
        &self,
        service: &str,
    ) -> Result<Option<ServiceStatus>, WorkloadError> {
        let envelope = self
            .get::<Vec<ServiceInfo>>("/v1/services", &[("names", service)])
            .await?;
        Ok(envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|s| s.name == service)
            .map(|s| ServiceStatus::parse(&s.current)))
    }

    /// Restart a service and wait for the change to complete
    ///
    /// # Errors
    ///
    /// Returns an error if the restart is rejected or the change fails.
    pub async fn restart(&self, service: &str) -> Result<(), WorkloadError> {
        let span = info_span!("pebble.restart", service = service);
        async move {
            let envelope = self
                .post::<serde_json::Value>(
                    "/v1/services",
                    &json!({"action": "restart", "services": [service]}),
                )
                .await?;
            let Some(change) = envelope.change else {
                return Ok(());
            };
            let waited = self
                .get::<ChangeInfo>(&format!("/v1/changes/{change}/wait"), &[("timeout", "30s")])
                .await?;
            match waited.result {
                Some(ChangeInfo { err: Some(err), .. }) => Err(WorkloadError::Api {
                    status: 500,
                    message: format!("restart of '{service}' failed: {err}"),
                }),
                Some(ChangeInfo { ready: false, .. }) => Err(WorkloadError::Api {
                    status: 504,
                    message: format!("restart of '{service}' did not complete"),
                }),
                _ => Ok(()),
            }
        }
        .instrument(span)
        .await
    }

    /// Status of a health check
    ///
    /// # Errors
    ///
    /// Returns an error if Pebble cannot be reached.
    pub async fn check_status(&self, check: &str) -> Result<Option<CheckStatus>, WorkloadError> {
        let envelope = self
            .get::<Vec<CheckInfo>>("/v1/checks", &[("names", check)])
            .await?;
        Ok(envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.name == check)
            .map(|c| {
                if c.status == "up" {
                    CheckStatus::Up
                } else {
                    CheckStatus::Down
                }
            }))
    }
}
