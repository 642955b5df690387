//! vecstack-provisioner
//!
//! Reconciliation engine for a vector-search database stack: cluster,
//! database user, access-list entry, collection and vector search index.
//! Library consumed by the `vecstack` CLI.
//!
//! Public API:
//! - `DependencyGraph::build()` — validate a manifest into an explicit graph
//! - `Orchestrator::run()` — ensure every node in dependency order, waiting
//!   for asynchronous builds
//! - `export()` — turn a fully successful run into a connection descriptor
//! - `provision()` — convenience: graph → run → export

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod addr;
pub mod atlas;
pub mod cancel;
pub mod error;
pub mod export;
pub mod graph;
pub mod manifest;
pub mod orchestrate;
pub mod persistence;
pub mod plan;
pub mod provider;
pub mod readiness;
pub mod remote;
pub mod state;
pub mod supervisor;
pub mod syncer;
pub mod syncers;

pub use crate::addr::ResourceAddr;
pub use crate::cancel::{CancelHandle, Cancellation};
pub use crate::error::ProvisionerError;
pub use crate::export::{ConnectionDescriptor, CredentialRef, export};
pub use crate::graph::DependencyGraph;
pub use crate::manifest::{Desired, Manifest, ResourceKind, ResourceSpec, Secret};
pub use crate::orchestrate::Orchestrator;
pub use crate::persistence::StatePersistence;
pub use crate::plan::{FailureReason, NodeState, PlanReport, PlanResult};
pub use crate::provider::{ReconciliationResult, ResourceProvider};
pub use crate::readiness::{ReadinessPoller, ReadinessPolicy};
pub use crate::remote::{Connector, IndexStatus, Session};
pub use crate::state::ProvisionerState;
pub use crate::supervisor::{ConnectionSupervisor, RetryPolicy};

/// Tuning for one provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "ReadinessPolicy::cluster")]
    pub cluster_readiness: ReadinessPolicy,
    #[serde(default = "ReadinessPolicy::search_index")]
    pub index_readiness: ReadinessPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cluster_readiness: ReadinessPolicy::cluster(),
            index_readiness: ReadinessPolicy::search_index(),
        }
    }
}

/// A run that reached terminal success.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub report: PlanReport,
    pub descriptor: ConnectionDescriptor,
}

/// Full provisioning: graph → run → export.
///
/// Returns the descriptor only when every node succeeded; otherwise
/// `PartialFailure` naming every failed or cascaded node.
pub async fn provision(
    manifest: &Manifest,
    connector: Arc<dyn Connector>,
    settings: &Settings,
    journal: Option<&StatePersistence>,
    credential_ref: &CredentialRef,
    cancel: &Cancellation,
) -> Result<Provisioned, ProvisionerError> {
    let graph = DependencyGraph::build(manifest)?;
    let supervisor = ConnectionSupervisor::new(connector, settings.retry);
    let provider = ResourceProvider::new(supervisor.clone());
    let poller = ReadinessPoller::new(supervisor)
        .with_policies(settings.cluster_readiness, settings.index_readiness);

    let mut orchestrator = Orchestrator::new(&provider, &poller);
    if let Some(journal) = journal {
        orchestrator = orchestrator.with_journal(journal);
    }

    tracing::info!(resources = graph.len(), "executing provisioning plan");
    let report = orchestrator.run(&graph, cancel).await;

    if let PlanResult::PartialFailure(failures) = report.result() {
        tracing::warn!(failed = failures.len(), "provisioning plan did not fully succeed");
        return Err(ProvisionerError::PartialFailure(failures));
    }

    let descriptor = export(&report, credential_ref)?;
    tracing::info!(uri = %descriptor.uri, "all resources ready");
    Ok(Provisioned { report, descriptor })
}
