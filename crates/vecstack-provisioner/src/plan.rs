use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addr::ResourceAddr;
use crate::error::ProvisionerError;
use crate::manifest::{ResourceKind, ResourceSpec};
use crate::remote::IndexStatus;

/// Why a node did not reach success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The resource declaration is missing required properties.
    InvalidSpec(String),
    /// Authentication kept racing past the retry bound.
    AuthExhausted { attempts: u32 },
    /// The remote rejected the credentials for good.
    Auth(String),
    /// The endpoint was unreachable.
    Connect(String),
    /// The remote refused the creation command.
    RemoteOperationFailed(String),
    /// Never attempted: a predecessor failed.
    CascadeSkipped { dependency: String },
    /// Still building when the readiness deadline passed.
    ReadinessTimeout { target: String, waited_secs: u64 },
    /// The remote reported the asynchronous build as failed.
    BuildFailed { target: String, detail: String },
    /// The run was aborted or hit its deadline.
    Cancelled(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidSpec(msg) => write!(f, "invalid spec: {msg}"),
            Self::AuthExhausted { attempts } => {
                write!(f, "authentication still failing after {attempts} attempts")
            }
            Self::Auth(msg) => write!(f, "authentication rejected: {msg}"),
            Self::Connect(msg) => write!(f, "connection failed: {msg}"),
            Self::RemoteOperationFailed(msg) => write!(f, "remote operation failed: {msg}"),
            Self::CascadeSkipped { dependency } => {
                write!(f, "skipped because {dependency} did not succeed")
            }
            Self::ReadinessTimeout {
                target,
                waited_secs,
            } => write!(f, "{target} not ready after {waited_secs}s"),
            Self::BuildFailed { target, detail } => write!(f, "{target} build failed: {detail}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
        }
    }
}

impl From<&ProvisionerError> for FailureReason {
    fn from(err: &ProvisionerError) -> Self {
        match err {
            ProvisionerError::InvalidSpec { reason, .. } => Self::InvalidSpec(reason.clone()),
            ProvisionerError::AuthExhausted { attempts } => Self::AuthExhausted {
                attempts: *attempts,
            },
            ProvisionerError::Auth(msg) => Self::Auth(msg.clone()),
            ProvisionerError::Connect(msg) => Self::Connect(msg.clone()),
            ProvisionerError::ReadinessTimeout { target, waited } => Self::ReadinessTimeout {
                target: target.clone(),
                waited_secs: waited.as_secs(),
            },
            ProvisionerError::BuildFailed { target, detail } => Self::BuildFailed {
                target: target.clone(),
                detail: detail.clone(),
            },
            ProvisionerError::Cancelled | ProvisionerError::DeadlineExceeded => {
                Self::Cancelled(err.to_string())
            }
            ProvisionerError::RemoteOperationFailed(msg) => {
                Self::RemoteOperationFailed(msg.clone())
            }
            other => Self::RemoteOperationFailed(other.to_string()),
        }
    }
}

/// How a successful node got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciled {
    Created,
    AlreadyExists,
}

/// Terminal success of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Success {
    pub outcome: Reconciled,
    /// Last observed build status, for kinds that build asynchronously.
    pub readiness: Option<IndexStatus>,
    /// What the remote reported about the object.
    pub properties: Value,
}

/// Per-node state machine.
///
/// `Pending → Waiting → InProgress → Succeeded | Failed`. A node whose
/// predecessor failed goes straight from `Pending`/`Waiting` to `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Waiting,
    InProgress,
    Succeeded(Success),
    Failed { reason: FailureReason },
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed { .. })
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn success(&self) -> Option<&Success> {
        match self {
            Self::Succeeded(success) => Some(success),
            _ => None,
        }
    }

    /// One-word summary for output.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Waiting => "waiting",
            Self::InProgress => "in progress",
            Self::Succeeded(Success {
                outcome: Reconciled::Created,
                ..
            }) => "created",
            Self::Succeeded(Success {
                outcome: Reconciled::AlreadyExists,
                ..
            }) => "already exists",
            Self::Failed {
                reason: FailureReason::CascadeSkipped { .. },
            } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A failed or cascaded node, named for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub resource: String,
    pub reason: FailureReason,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.resource, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "failures", rename_all = "snake_case")]
pub enum PlanResult {
    AllSucceeded,
    PartialFailure(Vec<NodeFailure>),
}

impl PlanResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AllSucceeded)
    }
}

/// Terminal state of one manifest entry after a run.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub spec: ResourceSpec,
    pub state: NodeState,
}

impl NodeReport {
    pub fn addr(&self) -> ResourceAddr {
        self.spec.addr()
    }
}

/// Everything a run produced, in manifest order.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub nodes: Vec<NodeReport>,
}

impl PlanReport {
    pub fn result(&self) -> PlanResult {
        let failures: Vec<NodeFailure> = self
            .nodes
            .iter()
            .filter_map(|node| match &node.state {
                NodeState::Succeeded(_) => None,
                NodeState::Failed { reason } => Some(NodeFailure {
                    resource: node.spec.name.clone(),
                    reason: reason.clone(),
                }),
                // A node left open means the run stopped early.
                _ => Some(NodeFailure {
                    resource: node.spec.name.clone(),
                    reason: FailureReason::Cancelled(format!("left {}", node.state.summary())),
                }),
            })
            .collect();

        if failures.is_empty() {
            PlanResult::AllSucceeded
        } else {
            PlanResult::PartialFailure(failures)
        }
    }

    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.spec.name == name)
    }

    pub fn nodes_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(move |n| n.spec.kind() == kind)
    }
}
