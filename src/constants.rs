//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! Workload names, fact ids and secret labels are part of the contract with
//! already-deployed replicas and must not change between releases.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default interval between Pebble connectivity and health-check polls
pub const DEFAULT_PEBBLE_POLL_INTERVAL_SECS: u64 = 10;

/// Default delay before restarting a watch stream after an error
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Capacity of the event channel feeding the dispatcher
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// Workload

/// Container running the Site Manager workload
pub const WORKLOAD_CONTAINER: &str = "site-manager";

/// Pebble service name of the Site Manager API
pub const SERVICE_NAME: &str = "msm";

/// Label of the layer the operator owns in the Pebble plan
pub const LAYER_LABEL: &str = "site-manager";

/// Name of the HTTP health check declared in the layer
pub const HEALTH_CHECK_NAME: &str = "http-test";

/// Port the Site Manager API binds to
pub const SERVICE_PORT: u16 = 8000;

/// Default Pebble API base URL (sidecar in the same pod)
pub const DEFAULT_PEBBLE_URL: &str = "http://localhost:38813";

/// Default Site Manager API base URL (sidecar in the same pod)
pub const DEFAULT_WORKLOAD_URL: &str = "http://localhost:8000";

/// Timeout for the workload version probe
pub const VERSION_TIMEOUT_SECS: u64 = 10;

/// Log levels accepted by the workload
pub const VALID_LOG_LEVELS: &[&str] = &["info", "debug", "warning", "error", "critical", "trace"];

// TLS material

/// Directory holding the workload TLS key pair
pub const CERTS_DIR: &str = "/etc/msm";

/// File name of the workload private key
pub const KEY_FILE: &str = "msm.key";

/// File name of the workload certificate
pub const CERT_FILE: &str = "msm.pem";

/// Common name requested from the certificate issuer
pub const CERT_COMMON_NAME: &str = "msm";

// Trust store

/// Directory the distro trust store picks extra anchors up from
pub const TRUST_DIR: &str = "/usr/local/share/ca-certificates";

/// Prefix of every trust anchor file the operator manages
pub const TRUST_FILE_PREFIX: &str = "receive-ca-cert";

/// Command rebuilding the trust-store index
pub const TRUST_REFRESH_COMMAND: &[&str] = &["update-ca-certificates", "--fresh"];

// Object storage

/// Bucket the workload stores images in
pub const S3_BUCKET: &str = "msm-images";

/// Database name requested from the database integration
pub const DATABASE_NAME: &str = "msm";

// Peer facts and secret labels

/// Fact id referencing the operator credential secret
pub const OPERATOR_CREDENTIAL_FACT: &str = "site-manager-operator-cred-id";

/// Fact id referencing the TLS key pair secret
pub const TLS_KEY_PAIR_FACT: &str = "site-manager-operator-tls-id";

/// Fact id referencing the secret holding the leader's private key and CSR
pub const CSR_FACT: &str = "site-manager-operator-csr-id";

/// Label of the operator credential secret
pub const OPERATOR_CREDENTIAL_LABEL: &str = "site-manager-operator-cred";

/// Label of the TLS key pair secret
pub const TLS_KEY_PAIR_LABEL: &str = "site-manager-operator-tls";

/// Label of the secret holding the private key and CSR the leader requested with
pub const CSR_LABEL: &str = "site-manager-operator-csr";

// Kubernetes object labels

/// Label carrying the secret label on operator-owned secrets
pub const SECRET_LABEL_KEY: &str = "site-manager.io/secret-label";

/// Label carrying the integration endpoint name on relation secrets
pub const RELATION_ENDPOINT_KEY: &str = "site-manager.io/relation-endpoint";

/// Label carrying the owning application name
pub const APP_LABEL_KEY: &str = "app.kubernetes.io/name";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "site-manager-operator";

// Integration endpoint names

/// Peer channel between operator replicas
pub const PEER_ENDPOINT: &str = "site-manager-cluster";
pub const DATABASE_ENDPOINT: &str = "database";
pub const OBJECT_STORAGE_ENDPOINT: &str = "s3";
pub const INGRESS_ENDPOINT: &str = "ingress";
pub const LOGGING_ENDPOINT: &str = "logging-consumer";
pub const CERTIFICATES_ENDPOINT: &str = "certificates";
pub const CA_TRANSFER_ENDPOINT: &str = "receive-ca-cert";
pub const TRACING_ENDPOINT: &str = "tracing";
pub const ENROLL_ENDPOINT: &str = "maas-site-manager";

// Relation secrets

/// Label carrying the relation instance id on relation secrets
pub const RELATION_ID_KEY: &str = "site-manager.io/relation-id";

/// Label carrying the remote application name on relation secrets
pub const REMOTE_APP_KEY: &str = "site-manager.io/remote-app";

/// Relation secret key holding the remote application data bag
pub const REMOTE_APP_DATA: &str = "remote-app.json";

/// Relation secret key holding the remote unit data bags
pub const REMOTE_UNITS_DATA: &str = "remote-units.json";

/// Relation secret key holding the local application data bag
pub const LOCAL_APP_DATA: &str = "local-app.json";
