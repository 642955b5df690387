use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::manifest::{DatabaseConnection, ResourceKind};
use crate::remote::{Endpoint, ProbeTarget, RemoteCommand};
use crate::syncer::ResourceSyncer;
use crate::syncers::collection::validate_namespace;
use crate::syncers::require;

/// Upper bound the search service accepts for `numDimensions`.
pub const MAX_DIMENSIONS: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Similarity {
    Euclidean,
    Cosine,
    DotProduct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantization {
    None,
    Scalar,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorField {
    /// Document field holding the embedding, e.g. "embedding"
    pub path: String,
    pub num_dimensions: u32,
    pub similarity: Similarity,
    pub quantization: Quantization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexSpec {
    pub connection: DatabaseConnection,
    pub database: String,
    pub collection: String,
    pub index_name: String,
    pub fields: Vec<VectorField>,
}

impl SearchIndexSpec {
    /// The `vectorSearch` index definition as the search service expects it.
    pub fn definition(&self) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|f| {
                json!({
                    "type": "vector",
                    "path": f.path,
                    "numDimensions": f.num_dimensions,
                    "similarity": f.similarity,
                    "quantization": f.quantization,
                })
            })
            .collect();
        json!({ "fields": fields })
    }
}

impl ResourceSyncer for SearchIndexSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SearchIndex
    }

    fn validate(&self) -> Result<(), String> {
        require("database", &self.database)?;
        require("collection", &self.collection)?;
        require("index_name", &self.index_name)?;
        validate_namespace(&self.database, &self.collection)?;
        if self.fields.is_empty() {
            return Err("at least one vector field is required".into());
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            require("fields.path", &field.path)?;
            if !seen.insert(field.path.as_str()) {
                return Err(format!("vector field {:?} is declared twice", field.path));
            }
            if field.num_dimensions == 0 || field.num_dimensions > MAX_DIMENSIONS {
                return Err(format!(
                    "vector field {:?} needs 1..={MAX_DIMENSIONS} dimensions, got {}",
                    field.path, field.num_dimensions
                ));
            }
        }
        self.connection.validate()
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Database(self.connection.clone())
    }

    fn command(&self) -> RemoteCommand<'_> {
        RemoteCommand::CreateSearchIndex(self)
    }

    fn readiness(&self) -> Option<ProbeTarget> {
        Some(ProbeTarget::SearchIndex {
            database: self.database.clone(),
            collection: self.collection.clone(),
            index_name: self.index_name.clone(),
        })
    }
}
