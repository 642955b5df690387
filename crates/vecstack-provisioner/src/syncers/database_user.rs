use serde::{Deserialize, Serialize};

use crate::manifest::{ResourceKind, Secret};
use crate::remote::{Endpoint, RemoteCommand};
use crate::syncer::ResourceSyncer;
use crate::syncers::require;

/// A SCRAM user authenticating against `admin`, granted `readWrite` on one
/// collection and scoped to one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseUserSpec {
    pub project_id: String,
    pub cluster_name: String,
    pub username: String,
    pub password: Secret,
    pub database: String,
    pub collection: String,
}

impl ResourceSyncer for DatabaseUserSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::DatabaseUser
    }

    fn validate(&self) -> Result<(), String> {
        require("project_id", &self.project_id)?;
        require("cluster_name", &self.cluster_name)?;
        require("username", &self.username)?;
        if self.password.is_empty() {
            return Err("password must not be empty".into());
        }
        require("database", &self.database)?;
        require("collection", &self.collection)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::ControlPlane {
            project_id: self.project_id.clone(),
        }
    }

    fn command(&self) -> RemoteCommand<'_> {
        RemoteCommand::CreateDatabaseUser(self)
    }
}
