use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::addr::ResourceAddr;
use crate::error::ProvisionerError;
use crate::syncer::ResourceSyncer;
use crate::syncers::{
    AccessEntrySpec, ClusterSpec, CollectionSpec, DatabaseUserSpec, SearchIndexSpec, VectorField,
};

/// A credential value that never shows up in logs, state files or
/// exported descriptors.
///
/// Deserializes from a plain string; serializes as a redaction marker.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cluster,
    DatabaseUser,
    AccessEntry,
    Collection,
    SearchIndex,
}

impl ResourceKind {
    /// Short label for humans, e.g. "Search Index".
    pub fn label(self) -> &'static str {
        match self {
            Self::Cluster => "Cluster",
            Self::DatabaseUser => "Database User",
            Self::AccessEntry => "Access Entry",
            Self::Collection => "Collection",
            Self::SearchIndex => "Search Index",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Cluster => "cluster",
            Self::DatabaseUser => "database_user",
            Self::AccessEntry => "access_entry",
            Self::Collection => "collection",
            Self::SearchIndex => "search_index",
        };
        f.write_str(s)
    }
}

/// Where a database session connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRef {
    /// A full connection string, e.g. `mongodb+srv://vector-cluster.abcde.mongodb.net`.
    Uri { uri: String },
    /// A cluster in the project; resolved to its published SRV string when
    /// a session opens.
    Cluster {
        project_id: String,
        cluster_name: String,
    },
}

/// Data-plane credentials shared by the collection and search-index kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConnection {
    pub host: HostRef,
    pub username: String,
    pub password: Secret,
}

impl DatabaseConnection {
    pub(crate) fn validate(&self) -> Result<(), String> {
        match &self.host {
            HostRef::Uri { uri } => {
                if !(uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://")) {
                    return Err(format!("connection uri {uri:?} is not a mongodb uri"));
                }
            }
            HostRef::Cluster {
                project_id,
                cluster_name,
            } => {
                crate::syncers::require("connection.project_id", project_id)?;
                crate::syncers::require("connection.cluster_name", cluster_name)?;
            }
        }
        crate::syncers::require("connection.username", &self.username)?;
        if self.password.is_empty() {
            return Err("connection.password must not be empty".into());
        }
        Ok(())
    }

    /// Host description safe for logs.
    pub fn host_label(&self) -> String {
        match &self.host {
            HostRef::Uri { uri } => crate::export::strip_credentials(uri),
            HostRef::Cluster { cluster_name, .. } => format!("cluster:{cluster_name}"),
        }
    }
}

/// Desired remote state, one variant per resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Desired {
    Cluster(ClusterSpec),
    DatabaseUser(DatabaseUserSpec),
    AccessEntry(AccessEntrySpec),
    Collection(CollectionSpec),
    SearchIndex(SearchIndexSpec),
}

/// Every resource in the plan is declared as a `ResourceSpec`.
///
/// A `ResourceSpec` is immutable once handed to a reconciliation run; the
/// provider, the orchestrator and the exporter all read from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Unique logical name, e.g. "vector-collection"
    pub name: String,
    /// Short label for output, e.g. "Vector Collection"
    #[serde(default)]
    pub label: String,
    pub desired: Desired,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, label: impl Into<String>, desired: Desired) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            desired,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.syncer().kind()
    }

    pub fn addr(&self) -> ResourceAddr {
        ResourceAddr {
            kind: self.kind(),
            name: self.name.clone(),
        }
    }

    pub fn syncer(&self) -> &dyn ResourceSyncer {
        match &self.desired {
            Desired::Cluster(spec) => spec,
            Desired::DatabaseUser(spec) => spec,
            Desired::AccessEntry(spec) => spec,
            Desired::Collection(spec) => spec,
            Desired::SearchIndex(spec) => spec,
        }
    }

    /// Check that every property the kind needs is present.
    pub fn validate(&self) -> Result<(), ProvisionerError> {
        let invalid = |reason: String| ProvisionerError::InvalidSpec {
            resource: self.addr().to_string(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        self.syncer().validate().map_err(invalid)
    }
}

/// `dependent` may only be created after `dependency` succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub dependent: String,
    pub dependency: String,
}

impl Edge {
    pub fn new(dependent: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self {
            dependent: dependent.into(),
            dependency: dependency.into(),
        }
    }
}

/// Runtime inputs for the default vector-search stack.
#[derive(Debug, Clone)]
pub struct StackParams {
    pub project_id: String,
    pub cluster: ClusterSpec,
    /// Explicit connection string; `None` resolves through the cluster.
    pub cluster_uri: Option<String>,
    pub ip_address: String,
    pub username: String,
    pub password: Secret,
    pub database: String,
    pub collection: String,
    pub index_name: String,
    pub vector_field: VectorField,
}

/// The full desired state: version, resource specs and their edges.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub version: u32,
    pub specs: Vec<ResourceSpec>,
    pub edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    version: Option<u32>,
    specs: Vec<ResourceSpec>,
    #[serde(default)]
    edges: Option<Vec<Edge>>,
}

impl Manifest {
    /// Bump when adding, removing, or changing resource specs.
    pub const VERSION: u32 = 1;

    /// Build a manifest whose edges follow the domain ordering.
    pub fn new(specs: Vec<ResourceSpec>) -> Self {
        let edges = Self::domain_edges(&specs);
        Self {
            version: Self::VERSION,
            specs,
            edges,
        }
    }

    /// Parse an already-expressed desired-state document. When the
    /// document carries no `edges` key the domain edges are derived.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProvisionerError> {
        let raw: RawManifest = serde_json::from_slice(bytes)?;
        let edges = match raw.edges {
            Some(edges) => edges,
            None => Self::domain_edges(&raw.specs),
        };
        Ok(Self {
            version: raw.version.unwrap_or(Self::VERSION),
            specs: raw.specs,
            edges,
        })
    }

    /// Derive the fixed dependency edges of this domain from resource kinds:
    ///
    /// - a database user waits for the cluster it is scoped to
    /// - a collection waits for its user, every access entry, and its cluster
    /// - a search index waits for the collection it indexes
    pub fn domain_edges(specs: &[ResourceSpec]) -> Vec<Edge> {
        let mut edges = Vec::new();

        for spec in specs {
            match &spec.desired {
                Desired::Cluster(_) | Desired::AccessEntry(_) => {}
                Desired::DatabaseUser(user) => {
                    for other in specs {
                        if let Desired::Cluster(cluster) = &other.desired
                            && cluster.project_id == user.project_id
                            && cluster.cluster_name == user.cluster_name
                        {
                            edges.push(Edge::new(&spec.name, &other.name));
                        }
                    }
                }
                Desired::Collection(coll) => {
                    for other in specs {
                        let depends = match &other.desired {
                            Desired::DatabaseUser(user) => {
                                user.username == coll.connection.username
                            }
                            Desired::AccessEntry(_) => true,
                            Desired::Cluster(cluster) => {
                                hosted_on(&coll.connection.host, cluster)
                            }
                            _ => false,
                        };
                        if depends {
                            edges.push(Edge::new(&spec.name, &other.name));
                        }
                    }
                }
                Desired::SearchIndex(index) => {
                    for other in specs {
                        if let Desired::Collection(coll) = &other.desired
                            && coll.database == index.database
                            && coll.collection == index.collection
                        {
                            edges.push(Edge::new(&spec.name, &other.name));
                        }
                    }
                }
            }
        }

        edges
    }

    /// Build the default vector-search stack from runtime config.
    pub fn vector_search(params: &StackParams) -> Self {
        let host = match &params.cluster_uri {
            Some(uri) => HostRef::Uri { uri: uri.clone() },
            None => HostRef::Cluster {
                project_id: params.project_id.clone(),
                cluster_name: params.cluster.cluster_name.clone(),
            },
        };
        let connection = DatabaseConnection {
            host,
            username: params.username.clone(),
            password: params.password.clone(),
        };

        Manifest::new(vec![
            ResourceSpec::new(
                params.cluster.cluster_name.clone(),
                "Vector Cluster",
                Desired::Cluster(params.cluster.clone()),
            ),
            ResourceSpec::new(
                params.username.clone(),
                "Vector User",
                Desired::DatabaseUser(DatabaseUserSpec {
                    project_id: params.project_id.clone(),
                    cluster_name: params.cluster.cluster_name.clone(),
                    username: params.username.clone(),
                    password: params.password.clone(),
                    database: params.database.clone(),
                    collection: params.collection.clone(),
                }),
            ),
            ResourceSpec::new(
                "my-current-ip",
                "Access Entry",
                Desired::AccessEntry(AccessEntrySpec {
                    project_id: params.project_id.clone(),
                    ip_address: params.ip_address.clone(),
                    comment: crate::syncers::access_entry::DEFAULT_COMMENT.into(),
                }),
            ),
            ResourceSpec::new(
                "vector-collection",
                "Vector Collection",
                Desired::Collection(CollectionSpec {
                    connection: connection.clone(),
                    database: params.database.clone(),
                    collection: params.collection.clone(),
                }),
            ),
            ResourceSpec::new(
                params.index_name.clone(),
                "Vector Search Index",
                Desired::SearchIndex(SearchIndexSpec {
                    connection,
                    database: params.database.clone(),
                    collection: params.collection.clone(),
                    index_name: params.index_name.clone(),
                    fields: vec![params.vector_field.clone()],
                }),
            ),
        ])
    }
}

fn hosted_on(host: &HostRef, cluster: &ClusterSpec) -> bool {
    matches!(
        host,
        HostRef::Cluster { project_id, cluster_name }
            if *project_id == cluster.project_id && *cluster_name == cluster.cluster_name
    )
}
