use std::time::Duration;

use thiserror::Error;

use crate::plan::NodeFailure;

#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("invalid spec for {resource}: {reason}")]
    InvalidSpec { resource: String, reason: String },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("authentication still failing after {attempts} attempts")]
    AuthExhausted { attempts: u32 },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("remote operation failed: {0}")]
    RemoteOperationFailed(String),

    #[error("{target} not ready after {}s", waited.as_secs())]
    ReadinessTimeout { target: String, waited: Duration },

    #[error("{target} build failed: {detail}")]
    BuildFailed { target: String, detail: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("plan incomplete at {node}: {reason}")]
    PlanIncomplete { node: String, reason: String },

    #[error("plan finished with failures: {}", describe_failures(.0))]
    PartialFailure(Vec<NodeFailure>),

    #[error("state error: {0}")]
    State(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionerError {
    /// Prepend resource identity to the error message.
    pub fn with_resource(self, label: &str, name: &str) -> Self {
        match self {
            Self::Auth(msg) => Self::Auth(format!("{label} ({name}): {msg}")),
            Self::Connect(msg) => Self::Connect(format!("{label} ({name}): {msg}")),
            Self::RemoteOperationFailed(msg) => {
                Self::RemoteOperationFailed(format!("{label} ({name}): {msg}"))
            }
            other => other,
        }
    }

    /// True for the two ways a [`crate::cancel::Cancellation`] ends a wait.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

fn describe_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Walk the full error chain and join all causes into one string.
///
/// Driver and HTTP errors often have terse `Display` impls but useful
/// detail in the source chain.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
