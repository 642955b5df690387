use serde_json::Value;

use crate::cancel::Cancellation;
use crate::error::ProvisionerError;
use crate::manifest::ResourceSpec;
use crate::plan::FailureReason;
use crate::remote::RemoteErrorKind;
use crate::supervisor::ConnectionSupervisor;

/// Outcome of one create attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationResult {
    Created { properties: Value },
    /// Idempotent no-op. Counts as success downstream.
    AlreadyExists,
    Failed(FailureReason),
}

impl ReconciliationResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Ensures a single resource exists.
///
/// Never retries business-level failures and never compensates for a
/// failed creation; the orchestrator decides what a failure means for
/// the rest of the plan.
#[derive(Clone)]
pub struct ResourceProvider {
    supervisor: ConnectionSupervisor,
}

impl ResourceProvider {
    pub fn new(supervisor: ConnectionSupervisor) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub async fn ensure(&self, spec: &ResourceSpec, cancel: &Cancellation) -> ReconciliationResult {
        let addr = spec.addr();

        if let Err(e) = spec.validate() {
            tracing::error!(addr = %addr, "{e}");
            return ReconciliationResult::Failed(FailureReason::from(&e));
        }

        let syncer = spec.syncer();
        let endpoint = syncer.endpoint();
        let mut session = match self.supervisor.acquire(&endpoint, cancel).await {
            Ok(session) => session,
            Err(e) => {
                let e = e.with_resource(spec.kind().label(), &spec.name);
                tracing::warn!(addr = %addr, "could not open session: {e}");
                return ReconciliationResult::Failed(FailureReason::from(&e));
            }
        };

        let command = syncer.command();
        tracing::info!(addr = %addr, command = %command, "ensuring resource");
        let outcome = cancel.run(session.execute(command)).await;
        session.close().await;

        match outcome {
            Err(cancelled) => {
                tracing::warn!(addr = %addr, "creation interrupted: {cancelled}");
                ReconciliationResult::Failed(FailureReason::from(&cancelled))
            }
            Ok(Ok(properties)) => {
                tracing::info!(addr = %addr, "resource created");
                ReconciliationResult::Created { properties }
            }
            Ok(Err(e)) if e.kind == RemoteErrorKind::AlreadyExists => {
                tracing::info!(addr = %addr, "resource already exists, reusing");
                ReconciliationResult::AlreadyExists
            }
            Ok(Err(e)) => {
                let e = ProvisionerError::RemoteOperationFailed(e.message)
                    .with_resource(spec.kind().label(), &spec.name);
                tracing::warn!(addr = %addr, "{e}");
                ReconciliationResult::Failed(FailureReason::from(&e))
            }
        }
    }
}
