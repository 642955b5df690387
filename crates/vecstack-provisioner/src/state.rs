use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::manifest::ResourceKind;
use crate::plan::{FailureReason, NodeReport, NodeState, Reconciled};
use crate::remote::IndexStatus;

/// Journal of the last run, persisted next to the config at `state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionerState {
    pub manifest_version: Option<u32>,

    /// Keyed by resource address, e.g. `collection.vector-collection`.
    pub resources: BTreeMap<String, ResourceState>,

    pub last_run: Option<jiff::Timestamp>,
}

/// Recorded terminal state of a single resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub kind: ResourceKind,
    pub name: String,
    pub status: ResourceStatus,
    pub readiness: Option<IndexStatus>,
    pub properties: serde_json::Value,
    pub detail: Option<String>,
    pub recorded_at: jiff::Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Created,
    AlreadyExists,
    Failed,
    Skipped,
}

impl ResourceState {
    /// `None` while the node is still open.
    pub fn from_node(node: &NodeReport) -> Option<Self> {
        let (status, readiness, properties, detail) = match &node.state {
            NodeState::Succeeded(success) => (
                match success.outcome {
                    Reconciled::Created => ResourceStatus::Created,
                    Reconciled::AlreadyExists => ResourceStatus::AlreadyExists,
                },
                success.readiness,
                success.properties.clone(),
                None,
            ),
            NodeState::Failed { reason } => (
                match reason {
                    FailureReason::CascadeSkipped { .. } => ResourceStatus::Skipped,
                    _ => ResourceStatus::Failed,
                },
                None,
                serde_json::Value::Null,
                Some(reason.to_string()),
            ),
            _ => return None,
        };

        Some(Self {
            kind: node.spec.kind(),
            name: node.spec.name.clone(),
            status,
            readiness,
            properties,
            detail,
            recorded_at: jiff::Timestamp::now(),
        })
    }
}

impl ProvisionerState {
    /// Record a terminal node, replacing any earlier entry for it.
    pub fn record(&mut self, node: &NodeReport) {
        if let Some(rs) = ResourceState::from_node(node) {
            self.resources.insert(node.addr().to_string(), rs);
        }
    }
}
