use serde::{Deserialize, Serialize};

use crate::manifest::{DatabaseConnection, ResourceKind};
use crate::remote::{Endpoint, RemoteCommand};
use crate::syncer::ResourceSyncer;
use crate::syncers::require;

const DATABASE_FORBIDDEN: &[char] = &['/', '\\', '.', ' ', '"', '$'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub connection: DatabaseConnection,
    pub database: String,
    pub collection: String,
}

impl ResourceSyncer for CollectionSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Collection
    }

    fn validate(&self) -> Result<(), String> {
        require("database", &self.database)?;
        require("collection", &self.collection)?;
        validate_namespace(&self.database, &self.collection)?;
        self.connection.validate()
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Database(self.connection.clone())
    }

    fn command(&self) -> RemoteCommand<'_> {
        RemoteCommand::CreateCollection {
            database: &self.database,
            collection: &self.collection,
        }
    }
}

/// MongoDB naming restrictions that the server would otherwise reject
/// with a generic error.
pub(crate) fn validate_namespace(database: &str, collection: &str) -> Result<(), String> {
    if database.len() > 64 {
        return Err(format!("database name {database:?} is longer than 64 bytes"));
    }
    if database.contains(DATABASE_FORBIDDEN) {
        return Err(format!("database name {database:?} contains a forbidden character"));
    }
    if collection.contains('$') || collection.contains('\0') {
        return Err(format!("collection name {collection:?} contains a forbidden character"));
    }
    if collection.starts_with("system.") {
        return Err(format!("collection name {collection:?} uses the reserved system. prefix"));
    }
    Ok(())
}
