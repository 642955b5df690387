//! The seam between the reconciliation engine and the remote control plane.
//!
//! A [`Connector`] opens one authenticated [`Session`] per operation. The
//! session issues creation commands and status probes, and is closed by
//! whoever opened it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::manifest::DatabaseConnection;
use crate::syncer::BoxFuture;
use crate::syncers::{AccessEntrySpec, ClusterSpec, DatabaseUserSpec, SearchIndexSpec};

/// What a session authenticates against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The project-level administration API.
    ControlPlane { project_id: String },
    /// A database deployment, using the credentials of a database user.
    Database(DatabaseConnection),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ControlPlane { project_id } => write!(f, "control-plane({project_id})"),
            Self::Database(conn) => write!(f, "database({}@{})", conn.username, conn.host_label()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RemoteCommand<'a> {
    CreateCluster(&'a ClusterSpec),
    CreateDatabaseUser(&'a DatabaseUserSpec),
    CreateAccessEntry(&'a AccessEntrySpec),
    CreateCollection {
        database: &'a str,
        collection: &'a str,
    },
    CreateSearchIndex(&'a SearchIndexSpec),
}

impl fmt::Display for RemoteCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::CreateCluster(spec) => write!(f, "create cluster {}", spec.cluster_name),
            Self::CreateDatabaseUser(spec) => write!(f, "create database user {}", spec.username),
            Self::CreateAccessEntry(spec) => write!(f, "create access entry {}", spec.ip_address),
            Self::CreateCollection {
                database,
                collection,
            } => write!(f, "create collection {database}.{collection}"),
            Self::CreateSearchIndex(spec) => write!(
                f,
                "create search index {} on {}.{}",
                spec.index_name, spec.database, spec.collection
            ),
        }
    }
}

/// A remote object whose build completes asynchronously.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProbeTarget {
    Cluster {
        project_id: String,
        cluster_name: String,
    },
    SearchIndex {
        database: String,
        collection: String,
        index_name: String,
    },
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cluster { cluster_name, .. } => write!(f, "cluster {cluster_name}"),
            Self::SearchIndex {
                database,
                collection,
                index_name,
            } => write!(f, "search index {index_name} on {database}.{collection}"),
        }
    }
}

/// Observed build state. Transient: never cached beyond one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Building,
    Steady,
    Failed,
}

impl IndexStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Building)
    }
}

/// One status read: the status plus whatever the remote reported with it
/// (e.g. a cluster's published connection strings).
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub status: IndexStatus,
    pub properties: Value,
}

impl Observation {
    pub fn new(status: IndexStatus) -> Self {
        Self {
            status,
            properties: Value::Null,
        }
    }
}

impl From<IndexStatus> for Observation {
    fn from(status: IndexStatus) -> Self {
        Self::new(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Credentials rejected in a way that clears once a freshly created
    /// user has propagated.
    AuthRace,
    /// Credentials rejected for good.
    Auth,
    /// The endpoint could not be reached or the connection string is bad.
    Connect,
    /// The object is already there. Not a failure.
    AlreadyExists,
    /// Any other rejection.
    Operation,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth_race(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AuthRace, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Auth, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Connect, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AlreadyExists, message)
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Operation, message)
    }

    /// Best-effort classification of an error raised by a command.
    ///
    /// Only the exact symptoms are recognised; anything else is an
    /// operation failure, never something retryable.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("bad auth") {
            Self::auth_race(message)
        } else if lower.contains("already exists") {
            Self::already_exists(message)
        } else {
            Self::operation(message)
        }
    }

    /// Classification of an error raised while opening a session. Only
    /// "bad auth" is transient; the rest is a connection failure.
    pub fn classify_open(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.to_ascii_lowercase().contains("bad auth") {
            Self::auth_race(message)
        } else {
            Self::connect(message)
        }
    }
}

/// An authenticated handle, valid for a single provider operation.
pub trait Session: Send {
    /// Issue a creation command. The returned value carries whatever the
    /// remote echoed back about the object.
    fn execute<'a>(&'a mut self, command: RemoteCommand<'a>)
    -> BoxFuture<'a, Result<Value, RemoteError>>;

    /// Read the build status of an object. Never mutates remote state.
    fn probe<'a>(&'a mut self, target: &'a ProbeTarget)
    -> BoxFuture<'a, Result<Observation, RemoteError>>;

    /// Release the session.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

pub trait Connector: Send + Sync {
    fn open<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, Result<Box<dyn Session>, RemoteError>>;
}
