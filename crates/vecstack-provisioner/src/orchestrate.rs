use futures::future::join_all;
use serde_json::Value;

use crate::cancel::Cancellation;
use crate::graph::DependencyGraph;
use crate::manifest::{Manifest, ResourceSpec};
use crate::persistence::StatePersistence;
use crate::plan::{FailureReason, NodeReport, NodeState, PlanReport, Reconciled, Success};
use crate::provider::{ReconciliationResult, ResourceProvider};
use crate::readiness::ReadinessPoller;
use crate::remote::IndexStatus;
use crate::state::ProvisionerState;

/// Drives provider calls in dependency order.
///
/// The orchestrator is the only writer of node state. Nodes whose
/// predecessors all succeeded run together in a wave; a node with a failed
/// predecessor is cascade-skipped without ever reaching the provider.
/// Nothing is retried at this layer.
pub struct Orchestrator<'a> {
    provider: &'a ResourceProvider,
    poller: &'a ReadinessPoller,
    journal: Option<&'a StatePersistence>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(provider: &'a ResourceProvider, poller: &'a ReadinessPoller) -> Self {
        Self {
            provider,
            poller,
            journal: None,
        }
    }

    /// Record every terminal transition in `journal`.
    pub fn with_journal(mut self, journal: &'a StatePersistence) -> Self {
        self.journal = Some(journal);
        self
    }

    pub async fn run(&self, graph: &DependencyGraph, cancel: &Cancellation) -> PlanReport {
        let mut states = vec![NodeState::Pending; graph.len()];
        let mut journal_state = self.load_journal().await;

        loop {
            let mut ready = Vec::new();
            let mut progressed = false;

            for idx in 0..graph.len() {
                if states[idx].is_terminal() {
                    continue;
                }
                let deps = graph.dependencies(idx);

                let failed_dep = deps
                    .iter()
                    .copied()
                    .find(|&d| matches!(states[d], NodeState::Failed { .. }));
                if let Some(failed) = failed_dep {
                    let dependency = graph.spec(failed).name.clone();
                    tracing::warn!(
                        addr = %graph.spec(idx).addr(),
                        dependency = %dependency,
                        "skipping resource, dependency did not succeed"
                    );
                    states[idx] = NodeState::Failed {
                        reason: FailureReason::CascadeSkipped { dependency },
                    };
                    self.record(&mut journal_state, graph.spec(idx), &states[idx]).await;
                    progressed = true;
                } else if deps.iter().all(|&d| states[d].is_succeeded()) {
                    ready.push(idx);
                } else {
                    states[idx] = NodeState::Waiting;
                }
            }

            if ready.is_empty() {
                if progressed {
                    continue;
                }
                break;
            }

            for &idx in &ready {
                states[idx] = NodeState::InProgress;
            }
            tracing::debug!(
                wave = ?ready.iter().map(|&i| graph.spec(i).name.as_str()).collect::<Vec<_>>(),
                "starting wave"
            );

            let results = join_all(ready.iter().map(|&idx| self.reconcile(graph.spec(idx), cancel))).await;
            for (idx, state) in ready.into_iter().zip(results) {
                states[idx] = state;
                self.record(&mut journal_state, graph.spec(idx), &states[idx]).await;
            }
        }

        let report = PlanReport {
            nodes: graph
                .specs()
                .iter()
                .cloned()
                .zip(states)
                .map(|(spec, state)| NodeReport { spec, state })
                .collect(),
        };

        if let (Some(journal), Some(mut state)) = (self.journal, journal_state) {
            state.manifest_version = Some(Manifest::VERSION);
            state.last_run = Some(jiff::Timestamp::now());
            if let Err(e) = journal.flush(&state).await {
                tracing::warn!(error = %e, "failed to write state journal");
            }
        }

        report
    }

    /// Ensure one node, then wait for its build if the kind has one.
    async fn reconcile(&self, spec: &ResourceSpec, cancel: &Cancellation) -> NodeState {
        let (outcome, properties) = match self.provider.ensure(spec, cancel).await {
            ReconciliationResult::Created { properties } => (Reconciled::Created, properties),
            ReconciliationResult::AlreadyExists => (Reconciled::AlreadyExists, Value::Null),
            ReconciliationResult::Failed(reason) => return NodeState::Failed { reason },
        };

        let syncer = spec.syncer();
        let Some(target) = syncer.readiness() else {
            return NodeState::Succeeded(Success {
                outcome,
                readiness: None,
                properties,
            });
        };

        let policy = self.poller.policy_for(&target);
        tracing::info!(
            addr = %spec.addr(),
            timeout_secs = policy.timeout.as_secs(),
            "waiting for build to settle"
        );
        match self
            .poller
            .wait_for_steady(&syncer.endpoint(), &target, policy, cancel)
            .await
        {
            Ok(observation) if observation.status == IndexStatus::Steady => {
                NodeState::Succeeded(Success {
                    outcome,
                    readiness: Some(IndexStatus::Steady),
                    properties: merge_properties(properties, observation.properties),
                })
            }
            Ok(observation) => {
                let detail = observation
                    .properties
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("remote reported the build as failed")
                    .to_string();
                NodeState::Failed {
                    reason: FailureReason::BuildFailed {
                        target: target.to_string(),
                        detail,
                    },
                }
            }
            Err(e) => NodeState::Failed {
                reason: FailureReason::from(&e),
            },
        }
    }

    async fn load_journal(&self) -> Option<ProvisionerState> {
        let journal = self.journal?;
        match journal.load().await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable state journal");
                Some(ProvisionerState::default())
            }
        }
    }

    async fn record(&self, state: &mut Option<ProvisionerState>, spec: &ResourceSpec, node: &NodeState) {
        let (Some(journal), Some(state)) = (self.journal, state.as_mut()) else {
            return;
        };
        state.record(&NodeReport {
            spec: spec.clone(),
            state: node.clone(),
        });
        if let Err(e) = journal.flush(state).await {
            tracing::warn!(error = %e, "failed to write state journal");
        }
    }
}

/// Overlay `extra` onto `base`; objects merge key by key, anything else
/// is replaced when `extra` carries a value.
fn merge_properties(base: Value, extra: Value) -> Value {
    match (base, extra) {
        (Value::Object(mut base), Value::Object(extra)) => {
            base.extend(extra);
            Value::Object(base)
        }
        (base, Value::Null) => base,
        (_, extra) => extra,
    }
}
