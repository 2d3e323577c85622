//! Common test utilities
//!
//! In-memory stand-ins for every capability the operator talks to, plus the
//! rustls setup shared by the Pact tests.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use site_manager_operator::client::{ApiError, Credentials, SiteManagerApi};
use site_manager_operator::constants::{
    DATABASE_ENDPOINT, HEALTH_CHECK_NAME, SERVICE_NAME,
};
use site_manager_operator::controller::{Context, Operator, OperatorStatus, StatusSink};
use site_manager_operator::crd::SiteManagerSpec;
use site_manager_operator::integrations::{DataBag, Relation, RelationError, RelationSource};
use site_manager_operator::observability::TracingSink;
use site_manager_operator::store::{
    FactId, Leadership, PeerError, PeerFacts, SecretContent, SecretError, SecretId, SecretStore,
    SharedLeadership,
};
use site_manager_operator::workload::{
    CheckStatus, ExecOutput, Layer, ServiceStatus, Workload, WorkloadError,
};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` so the provider is installed a single time per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

// Workload

#[derive(Debug, Default)]
struct WorkloadState {
    plan: Layer,
    active: bool,
    restarts: usize,
    execs: Vec<Vec<String>>,
    files: BTreeMap<String, String>,
    pushes: usize,
    exit_codes: BTreeMap<String, i32>,
}

/// Pebble-like workload: layers combine into a plan, restarts activate the service
#[derive(Debug)]
pub struct FakeWorkload {
    reachable: AtomicBool,
    check_up: AtomicBool,
    state: Mutex<WorkloadState>,
}

impl Default for FakeWorkload {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            check_up: AtomicBool::new(true),
            state: Mutex::new(WorkloadState::default()),
        }
    }
}

impl FakeWorkload {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_check_up(&self, up: bool) {
        self.check_up.store(up, Ordering::SeqCst);
    }

    /// Exit code returned for commands whose program is `program`
    pub fn set_exit_code(&self, program: &str, code: i32) {
        self.state
            .lock()
            .unwrap()
            .exit_codes
            .insert(program.to_string(), code);
    }

    pub fn restarts(&self) -> usize {
        self.state.lock().unwrap().restarts
    }

    pub fn pushes(&self) -> usize {
        self.state.lock().unwrap().pushes
    }

    pub fn current_plan(&self) -> Layer {
        self.state.lock().unwrap().plan.clone()
    }

    pub fn execs(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().execs.clone()
    }

    /// Commands run whose program is `program`
    pub fn execs_of(&self, program: &str) -> Vec<Vec<String>> {
        self.execs()
            .into_iter()
            .filter(|c| c.first().map(String::as_str) == Some(program))
            .collect()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
    }

    pub fn files_in(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.state
            .lock()
            .unwrap()
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|name| !name.contains('/'))
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl Workload for FakeWorkload {
    async fn can_connect(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn add_layer(
        &self,
        _label: &str,
        layer: &Layer,
        _combine: bool,
    ) -> Result<(), WorkloadError> {
        let mut state = self.state.lock().unwrap();
        let plan = &mut state.plan;
        if layer.summary.is_some() {
            plan.summary.clone_from(&layer.summary);
        }
        if layer.description.is_some() {
            plan.description.clone_from(&layer.description);
        }
        plan.services.extend(layer.services.clone());
        plan.checks.extend(layer.checks.clone());
        plan.log_targets.extend(layer.log_targets.clone());
        Ok(())
    }

    async fn plan(&self) -> Result<Layer, WorkloadError> {
        Ok(self.current_plan())
    }

    async fn service_status(&self, service: &str) -> Result<Option<ServiceStatus>, WorkloadError> {
        let state = self.state.lock().unwrap();
        if !state.plan.services.contains_key(service) {
            return Ok(None);
        }
        Ok(Some(if state.active {
            ServiceStatus::Active
        } else {
            ServiceStatus::Inactive
        }))
    }

    async fn restart(&self, _service: &str) -> Result<(), WorkloadError> {
        let mut state = self.state.lock().unwrap();
        state.restarts += 1;
        state.active = true;
        Ok(())
    }

    async fn check_status(&self, check: &str) -> Result<Option<CheckStatus>, WorkloadError> {
        if !self.state.lock().unwrap().plan.checks.contains_key(check) {
            return Ok(None);
        }
        Ok(Some(if self.check_up.load(Ordering::SeqCst) {
            CheckStatus::Up
        } else {
            CheckStatus::Down
        }))
    }

    async fn exec(
        &self,
        command: &[String],
        _service_context: Option<&str>,
    ) -> Result<ExecOutput, WorkloadError> {
        let mut state = self.state.lock().unwrap();
        state.execs.push(command.to_vec());
        let exit_code = command
            .first()
            .and_then(|program| state.exit_codes.get(program))
            .copied()
            .unwrap_or(0);
        Ok(ExecOutput {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                "failed".to_string()
            },
        })
    }

    async fn pull(&self, path: &str) -> Result<Option<String>, WorkloadError> {
        Ok(self.file(path))
    }

    async fn push(&self, path: &str, content: &str) -> Result<(), WorkloadError> {
        let mut state = self.state.lock().unwrap();
        state.pushes += 1;
        state.files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>, WorkloadError> {
        Ok(self.files_in(dir))
    }

    async fn remove(&self, path: &str) -> Result<(), WorkloadError> {
        self.state.lock().unwrap().files.remove(path);
        Ok(())
    }
}

// Relations

#[derive(Debug, Default)]
pub struct FakeRelations {
    relations: Mutex<BTreeMap<String, Vec<Relation>>>,
    writes: AtomicUsize,
}

impl FakeRelations {
    pub fn add(&self, relation: Relation) {
        let mut all = self.relations.lock().unwrap();
        let on_endpoint = all.entry(relation.endpoint.clone()).or_default();
        on_endpoint.retain(|r| r.id != relation.id);
        on_endpoint.push(relation);
        on_endpoint.sort_by_key(|r| r.id);
    }

    pub fn remove(&self, endpoint: &str, id: u32) {
        if let Some(on_endpoint) = self.relations.lock().unwrap().get_mut(endpoint) {
            on_endpoint.retain(|r| r.id != id);
        }
    }

    pub fn set_app_data(&self, endpoint: &str, id: u32, key: &str, value: &str) {
        let mut all = self.relations.lock().unwrap();
        if let Some(relation) = all
            .get_mut(endpoint)
            .and_then(|rs| rs.iter_mut().find(|r| r.id == id))
        {
            relation.app_data.insert(key.to_string(), value.to_string());
        }
    }

    pub fn set_unit_data(&self, endpoint: &str, id: u32, unit: &str, key: &str, value: &str) {
        let mut all = self.relations.lock().unwrap();
        if let Some(relation) = all
            .get_mut(endpoint)
            .and_then(|rs| rs.iter_mut().find(|r| r.id == id))
        {
            relation
                .units
                .entry(unit.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
        }
    }

    pub fn local_data(&self, endpoint: &str, id: u32) -> DataBag {
        self.relations
            .lock()
            .unwrap()
            .get(endpoint)
            .and_then(|rs| rs.iter().find(|r| r.id == id))
            .map(|r| r.local_app_data.clone())
            .unwrap_or_default()
    }

    /// Number of writes to our application bags
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationSource for FakeRelations {
    async fn relations(&self, endpoint: &str) -> Result<Vec<Relation>, RelationError> {
        Ok(self
            .relations
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_local_data(
        &self,
        endpoint: &str,
        relation_id: u32,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), RelationError> {
        let mut all = self.relations.lock().unwrap();
        let relation = all
            .get_mut(endpoint)
            .and_then(|rs| rs.iter_mut().find(|r| r.id == relation_id))
            .ok_or_else(|| RelationError::NotFound {
                endpoint: endpoint.to_string(),
                id: relation_id,
            })?;
        match value {
            Some(value) => {
                relation
                    .local_app_data
                    .insert(key.to_string(), value.to_string());
            }
            None => {
                relation.local_app_data.remove(key);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A relation on `endpoint` with the given remote application bag
pub fn relation(endpoint: &str, id: u32, app_data: &[(&str, &str)]) -> Relation {
    Relation {
        id,
        endpoint: endpoint.to_string(),
        remote_app: Some(format!("{endpoint}-provider")),
        app_data: app_data
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        ..Default::default()
    }
}

pub fn database_relation(id: u32) -> Relation {
    relation(
        DATABASE_ENDPOINT,
        id,
        &[
            ("endpoints", "pg.local:5432"),
            ("username", "msm"),
            ("password", "db-secret"),
            ("database", "msm"),
        ],
    )
}

// Peer facts

#[derive(Debug)]
pub struct FakePeers {
    available: AtomicBool,
    leadership: SharedLeadership,
    facts: Arc<Mutex<BTreeMap<&'static str, Value>>>,
    sets: AtomicUsize,
}

impl FakePeers {
    pub fn new(leadership: SharedLeadership) -> Self {
        Self {
            available: AtomicBool::new(true),
            leadership,
            facts: Arc::new(Mutex::new(BTreeMap::new())),
            sets: AtomicUsize::new(0),
        }
    }

    /// Another replica's view of the same bag
    pub fn sharing(&self, leadership: SharedLeadership) -> Self {
        Self {
            available: AtomicBool::new(self.available.load(Ordering::SeqCst)),
            leadership,
            facts: Arc::clone(&self.facts),
            sets: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fact(&self, fact: FactId) -> Option<Value> {
        self.facts.lock().unwrap().get(fact.key()).cloned()
    }

    /// Number of accepted writes
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerFacts for FakePeers {
    async fn available(&self) -> Result<bool, PeerError> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn get(&self, fact: FactId) -> Result<Option<Value>, PeerError> {
        if !self.available.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.fact(fact))
    }

    async fn set(&self, fact: FactId, value: Value) -> Result<(), PeerError> {
        if !self.leadership.is_leader() {
            return Err(PeerError::NotLeader(fact.key()));
        }
        if !self.available.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.facts.lock().unwrap().insert(fact.key(), value);
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Secrets

#[derive(Debug, Default)]
pub struct FakeSecrets {
    by_label: Mutex<BTreeMap<String, (SecretId, SecretContent)>>,
    created: AtomicUsize,
}

impl FakeSecrets {
    pub fn by_label(&self, label: &str) -> Option<(SecretId, SecretContent)> {
        self.by_label.lock().unwrap().get(label).cloned()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// A secret left under `label` by an earlier deployment
    pub fn preload(&self, label: &str, id: &str, content: &[(&str, &str)]) {
        let content = content
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.by_label
            .lock()
            .unwrap()
            .insert(label.to_string(), (SecretId::from(id), content));
    }

    /// Drop a secret as if it had been deleted out of band
    pub fn forget(&self, label: &str) {
        self.by_label.lock().unwrap().remove(label);
    }
}

#[async_trait]
impl SecretStore for FakeSecrets {
    async fn create(&self, label: &str, content: &SecretContent) -> Result<SecretId, SecretError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let id = SecretId::from(format!("secret-{n}"));
        self.by_label
            .lock()
            .unwrap()
            .insert(label.to_string(), (id.clone(), content.clone()));
        Ok(id)
    }

    async fn update(
        &self,
        label: &str,
        content: &SecretContent,
    ) -> Result<Option<SecretId>, SecretError> {
        let mut secrets = self.by_label.lock().unwrap();
        Ok(secrets.get_mut(label).map(|(id, stored)| {
            stored.clone_from(content);
            id.clone()
        }))
    }

    async fn read(&self, id: &SecretId, _refresh: bool) -> Result<SecretContent, SecretError> {
        self.by_label
            .lock()
            .unwrap()
            .values()
            .find(|(stored, _)| stored == id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| SecretError::NotFound(id.to_string()))
    }

    async fn find(&self, label: &str) -> Result<Option<(SecretId, SecretContent)>, SecretError> {
        Ok(self.by_label(label))
    }
}

// Site Manager API

#[derive(Debug, Default)]
pub struct FakeApi {
    version: Mutex<String>,
    tokens_issued: AtomicUsize,
    removed: Mutex<Vec<String>>,
    fail: AtomicBool,
    logins: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn tokens_issued(&self) -> usize {
        self.tokens_issued.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    /// Usernames every call authenticated with
    pub fn logins(&self) -> Vec<String> {
        self.logins.lock().unwrap().clone()
    }

    fn authenticate(&self, credentials: &Credentials) -> Result<(), ApiError> {
        self.logins
            .lock()
            .unwrap()
            .push(credentials.username.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Auth("invalid credentials".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SiteManagerApi for FakeApi {
    async fn version(&self) -> String {
        self.version.lock().unwrap().clone()
    }

    async fn issue_enroll_token(&self, credentials: &Credentials) -> Result<String, ApiError> {
        self.authenticate(credentials)?;
        let n = self.tokens_issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("enroll-token-{n}"))
    }

    async fn remove_site(
        &self,
        credentials: &Credentials,
        cluster_id: &str,
    ) -> Result<(), ApiError> {
        self.authenticate(credentials)?;
        self.removed.lock().unwrap().push(cluster_id.to_string());
        Ok(())
    }
}

// Status and tracing

#[derive(Debug, Default)]
pub struct RecordingStatus {
    published: Mutex<Vec<OperatorStatus>>,
    version: Mutex<Option<String>>,
}

impl RecordingStatus {
    pub fn published(&self) -> Vec<OperatorStatus> {
        self.published.lock().unwrap().clone()
    }

    pub fn version(&self) -> Option<String> {
        self.version.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSink for RecordingStatus {
    async fn publish(&self, status: &OperatorStatus) {
        self.published.lock().unwrap().push(status.clone());
    }

    async fn set_workload_version(&self, version: &str) {
        *self.version.lock().unwrap() = Some(version.to_string());
    }
}

#[derive(Debug, Default)]
pub struct RecordingTracing {
    endpoints: Mutex<Vec<Option<String>>>,
}

impl RecordingTracing {
    pub fn endpoints(&self) -> Vec<Option<String>> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl TracingSink for RecordingTracing {
    async fn configure(&self, endpoint: Option<&str>) {
        self.endpoints
            .lock()
            .unwrap()
            .push(endpoint.map(ToString::to_string));
    }
}

// Harness

/// One replica's capabilities, all in memory
#[derive(Debug)]
pub struct Harness {
    pub namespace: String,
    pub workload: Arc<FakeWorkload>,
    pub relations: Arc<FakeRelations>,
    pub peers: Arc<FakePeers>,
    pub secrets: Arc<FakeSecrets>,
    pub leadership: SharedLeadership,
    pub api: Arc<FakeApi>,
    pub status: Arc<RecordingStatus>,
    pub tracing: Arc<RecordingTracing>,
}

impl Harness {
    pub fn leader() -> Self {
        Self::new(true)
    }

    pub fn follower() -> Self {
        Self::new(false)
    }

    pub fn new(is_leader: bool) -> Self {
        let leadership = SharedLeadership::new(is_leader);
        Self {
            namespace: "sm".to_string(),
            workload: Arc::new(FakeWorkload::default()),
            relations: Arc::new(FakeRelations::default()),
            peers: Arc::new(FakePeers::new(leadership.clone())),
            secrets: Arc::new(FakeSecrets::default()),
            leadership,
            api: Arc::new(FakeApi::default()),
            status: Arc::new(RecordingStatus::default()),
            tracing: Arc::new(RecordingTracing::default()),
        }
    }

    /// A second replica sharing this one's relations, peer bag and secrets
    pub fn peer_replica(&self, is_leader: bool) -> Self {
        let leadership = SharedLeadership::new(is_leader);
        let peers = self.peers.sharing(leadership.clone());
        Self {
            namespace: self.namespace.clone(),
            workload: Arc::new(FakeWorkload::default()),
            relations: Arc::clone(&self.relations),
            peers: Arc::new(peers),
            secrets: Arc::clone(&self.secrets),
            leadership,
            api: Arc::clone(&self.api),
            status: Arc::new(RecordingStatus::default()),
            tracing: Arc::new(RecordingTracing::default()),
        }
    }

    pub fn context(&self) -> Context {
        Context {
            app_name: "site-manager".to_string(),
            namespace: self.namespace.clone(),
            workload: Arc::clone(&self.workload) as Arc<dyn Workload>,
            relations: Arc::clone(&self.relations) as Arc<dyn RelationSource>,
            peers: Arc::clone(&self.peers) as Arc<dyn PeerFacts>,
            secrets: Arc::clone(&self.secrets) as Arc<dyn SecretStore>,
            leadership: Arc::new(self.leadership.clone()) as Arc<dyn Leadership>,
            api: Arc::clone(&self.api) as Arc<dyn SiteManagerApi>,
            status: Arc::clone(&self.status) as Arc<dyn StatusSink>,
            tracing: Arc::clone(&self.tracing) as Arc<dyn TracingSink>,
        }
    }

    pub fn operator(&self, spec: SiteManagerSpec) -> Operator {
        Operator::new(self.context(), spec)
    }

    /// Ready to go active: database related, temporal configured, check up
    pub fn with_required_integrations(self) -> Self {
        self.relations.add(database_relation(1));
        self
    }
}

/// Spec with every required option set
pub fn configured_spec() -> SiteManagerSpec {
    SiteManagerSpec {
        temporal_server_address: "temporal.local:7233".to_string(),
        ..SiteManagerSpec::default()
    }
}

pub fn service_env(plan: &Layer, key: &str) -> Option<String> {
    plan.services
        .get(SERVICE_NAME)
        .and_then(|s| s.environment.get(key).cloned().flatten())
}

pub fn has_health_check(plan: &Layer) -> bool {
    plan.checks.contains_key(HEALTH_CHECK_NAME)
}
