#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use vecstack_provisioner::manifest::{DatabaseConnection, HostRef, Manifest, StackParams};
use vecstack_provisioner::remote::{
    Endpoint, IndexStatus, Observation, ProbeTarget, RemoteCommand, RemoteError,
};
use vecstack_provisioner::syncer::BoxFuture;
use vecstack_provisioner::syncers::{ClusterSpec, Quantization, Similarity, VectorField};
use vecstack_provisioner::{Connector, ReadinessPolicy, RetryPolicy, Secret, Session, Settings};

pub const PASSWORD: &str = "v3ct0r-s3cret";
pub const SRV: &str = "mongodb+srv://vector-cluster.abcde.mongodb.net";

pub const CREATE_CLUSTER: &str = "create cluster vector-cluster";
pub const CREATE_USER: &str = "create database user vector-user";
pub const CREATE_ACCESS: &str = "create access entry 203.0.113.7";
pub const CREATE_COLLECTION: &str = "create collection ww.facts";
pub const CREATE_INDEX: &str = "create search index vector-index on ww.facts";
pub const CLUSTER_TARGET: &str = "cluster vector-cluster";
pub const INDEX_TARGET: &str = "search index vector-index on ww.facts";

#[derive(Default)]
struct FakeState {
    /// Every open attempt, successful or not.
    opens: u32,
    /// Remaining "bad auth" rejections for database endpoints.
    auth_races: u32,
    permanent_auth: bool,
    connect_failure: Option<String>,
    /// Objects the remote already holds, by command description.
    existing: HashSet<String>,
    failing: HashMap<String, String>,
    /// Scripted build states per probe target; the last one repeats.
    statuses: HashMap<String, VecDeque<IndexStatus>>,
    /// Status reads that fail before the scripted states apply.
    probe_failures: HashMap<String, u32>,
    calls: Vec<String>,
    live_sessions: i64,
}

/// In-memory stand-in for the remote control plane and database.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_races(self, count: u32) -> Self {
        self.state.lock().unwrap().auth_races = count;
        self
    }

    pub fn with_permanent_auth_failure(self) -> Self {
        self.state.lock().unwrap().permanent_auth = true;
        self
    }

    pub fn with_connect_failure(self, message: &str) -> Self {
        self.state.lock().unwrap().connect_failure = Some(message.to_string());
        self
    }

    pub fn with_existing(self, command: &str) -> Self {
        self.state.lock().unwrap().existing.insert(command.to_string());
        self
    }

    pub fn failing(self, command: &str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(command.to_string(), message.to_string());
        self
    }

    pub fn with_statuses(self, target: &str, statuses: &[IndexStatus]) -> Self {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(target.to_string(), statuses.iter().copied().collect());
        self
    }

    pub fn with_probe_failures(self, target: &str, count: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .probe_failures
            .insert(target.to_string(), count);
        self
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn opens(&self) -> u32 {
        self.state.lock().unwrap().opens
    }

    pub fn live_sessions(&self) -> i64 {
        self.state.lock().unwrap().live_sessions
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn executed(&self, command: &str) -> bool {
        self.calls().iter().any(|c| c == &format!("execute {command}"))
    }

    pub fn position(&self, command: &str) -> Option<usize> {
        self.calls()
            .iter()
            .position(|c| c == &format!("execute {command}"))
    }

    pub fn probes(&self, target: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| *c == &format!("probe {target}"))
            .count()
    }
}

impl Connector for FakeRemote {
    fn open<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, Result<Box<dyn Session>, RemoteError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            state.calls.push(format!("open {endpoint}"));

            if let Some(message) = &state.connect_failure {
                return Err(RemoteError::connect(message.clone()));
            }
            let host = match endpoint {
                Endpoint::Database(conn) => Some(match &conn.host {
                    HostRef::Uri { uri } => uri.clone(),
                    HostRef::Cluster { .. } => SRV.to_string(),
                }),
                Endpoint::ControlPlane { .. } => None,
            };
            if let Endpoint::Database(_) = endpoint {
                if state.permanent_auth {
                    return Err(RemoteError::auth("user is not allowed to do action"));
                }
                if state.auth_races > 0 {
                    state.auth_races -= 1;
                    return Err(RemoteError::classify_open(
                        "SCRAM failure: bad auth : authentication failed",
                    ));
                }
            }

            state.live_sessions += 1;
            Ok(Box::new(FakeSession {
                state: self.state.clone(),
                host,
            }) as Box<dyn Session>)
        })
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
    /// Set for database sessions, as the real one reports it.
    host: Option<String>,
}

impl Session for FakeSession {
    fn execute<'a>(
        &'a mut self,
        command: RemoteCommand<'a>,
    ) -> BoxFuture<'a, Result<Value, RemoteError>> {
        Box::pin(async move {
            let key = command.to_string();
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("execute {key}"));

            if let Some(message) = state.failing.get(&key) {
                return Err(RemoteError::classify(message.clone()));
            }
            if !state.existing.insert(key.clone()) {
                return Err(RemoteError::already_exists(format!("{key}: already exists")));
            }
            Ok(match &self.host {
                Some(host) => json!({ "created": key, "host": host }),
                None => json!({ "created": key }),
            })
        })
    }

    fn probe<'a>(
        &'a mut self,
        target: &'a ProbeTarget,
    ) -> BoxFuture<'a, Result<Observation, RemoteError>> {
        Box::pin(async move {
            let key = target.to_string();
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("probe {key}"));

            if let Some(remaining) = state.probe_failures.get_mut(&key)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(RemoteError::operation("connection reset by peer"));
            }

            let status = match state.statuses.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(IndexStatus::Steady),
                Some(queue) => queue.front().copied().unwrap_or(IndexStatus::Steady),
                None => IndexStatus::Steady,
            };

            let properties = match (target, status) {
                (_, IndexStatus::Failed) => json!({ "message": "index definition rejected" }),
                (ProbeTarget::Cluster { .. }, IndexStatus::Steady) => {
                    json!({ "state_name": "IDLE", "standard_srv": SRV })
                }
                (ProbeTarget::SearchIndex { .. }, _) => match &self.host {
                    Some(host) => json!({ "host": host }),
                    None => Value::Null,
                },
                _ => Value::Null,
            };
            Ok(Observation { status, properties })
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.state.lock().unwrap().live_sessions -= 1;
        })
    }
}

pub fn stack_params() -> StackParams {
    StackParams {
        project_id: "proj-1".into(),
        cluster: ClusterSpec::free_tier("proj-1", "vector-cluster"),
        cluster_uri: None,
        ip_address: "203.0.113.7".into(),
        username: "vector-user".into(),
        password: Secret::new(PASSWORD),
        database: "ww".into(),
        collection: "facts".into(),
        index_name: "vector-index".into(),
        vector_field: VectorField {
            path: "embedding".into(),
            num_dimensions: 768,
            similarity: Similarity::DotProduct,
            quantization: Quantization::Scalar,
        },
    }
}

pub fn stack() -> Manifest {
    Manifest::vector_search(&stack_params())
}

pub fn database_endpoint() -> Endpoint {
    Endpoint::Database(DatabaseConnection {
        host: HostRef::Uri { uri: SRV.into() },
        username: "vector-user".into(),
        password: Secret::new(PASSWORD),
    })
}

pub fn retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::from_secs(10),
    }
}

/// Index builds time out after a minute, polled every five seconds.
pub fn short_index_wait() -> Settings {
    Settings {
        index_readiness: ReadinessPolicy::new(Duration::from_secs(60), Duration::from_secs(5)),
        ..Settings::default()
    }
}
