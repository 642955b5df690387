use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cancel::Cancellation;
use crate::error::ProvisionerError;
use crate::remote::{Endpoint, Observation, ProbeTarget};
use crate::supervisor::{ConnectionSupervisor, secs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
    #[serde(rename = "interval_secs", with = "secs")]
    pub interval: Duration,
}

impl ReadinessPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Free-tier clusters usually take a few minutes to reach IDLE.
    pub fn cluster() -> Self {
        Self::new(Duration::from_secs(20 * 60), Duration::from_secs(15))
    }

    pub fn search_index() -> Self {
        Self::new(Duration::from_secs(10 * 60), Duration::from_secs(5))
    }
}

/// Waits for asynchronously built objects to settle.
///
/// Purely observational: every poll opens a session, reads status, and
/// closes it again. Nothing is cached between polls.
#[derive(Clone)]
pub struct ReadinessPoller {
    supervisor: ConnectionSupervisor,
    cluster: ReadinessPolicy,
    search_index: ReadinessPolicy,
}

impl ReadinessPoller {
    pub fn new(supervisor: ConnectionSupervisor) -> Self {
        Self {
            supervisor,
            cluster: ReadinessPolicy::cluster(),
            search_index: ReadinessPolicy::search_index(),
        }
    }

    pub fn with_policies(mut self, cluster: ReadinessPolicy, search_index: ReadinessPolicy) -> Self {
        self.cluster = cluster;
        self.search_index = search_index;
        self
    }

    pub fn policy_for(&self, target: &ProbeTarget) -> ReadinessPolicy {
        match target {
            ProbeTarget::Cluster { .. } => self.cluster,
            ProbeTarget::SearchIndex { .. } => self.search_index,
        }
    }

    /// Poll until the target is `Steady` or `Failed`.
    ///
    /// Both terminal states are returned as `Ok`. Failed status reads are
    /// logged and polled again; only cancellation and rejected credentials
    /// end the wait early. A target still building when `policy.timeout`
    /// elapses yields [`ProvisionerError::ReadinessTimeout`]; the object may
    /// still settle later, so callers may poll again.
    pub async fn wait_for_steady(
        &self,
        endpoint: &Endpoint,
        target: &ProbeTarget,
        policy: ReadinessPolicy,
        cancel: &Cancellation,
    ) -> Result<Observation, ProvisionerError> {
        let started = Instant::now();
        let deadline = started + policy.timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self.observe(endpoint, target, cancel).await {
                Ok(observation) => {
                    tracing::debug!(probe = %target, polls, status = ?observation.status, "polled build status");
                    if observation.status.is_terminal() {
                        tracing::info!(
                            probe = %target,
                            polls,
                            status = ?observation.status,
                            elapsed_secs = started.elapsed().as_secs(),
                            "build settled"
                        );
                        return Ok(observation);
                    }
                }
                Err(e) if e.is_cancellation() || matches!(e, ProvisionerError::Auth(_)) => {
                    return Err(e);
                }
                // A failed read says nothing about the build.
                Err(e) => tracing::warn!(probe = %target, polls, error = %e, "status read failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(probe = %target, polls, "still building at readiness deadline");
                return Err(ProvisionerError::ReadinessTimeout {
                    target: target.to_string(),
                    waited: now - started,
                });
            }
            cancel.sleep(policy.interval.min(deadline - now)).await?;
        }
    }

    /// One status read on a fresh session.
    pub async fn observe(
        &self,
        endpoint: &Endpoint,
        target: &ProbeTarget,
        cancel: &Cancellation,
    ) -> Result<Observation, ProvisionerError> {
        let mut session = self.supervisor.acquire(endpoint, cancel).await?;
        let result = cancel.run(session.probe(target)).await;
        session.close().await;

        result?.map_err(|e| {
            ProvisionerError::RemoteOperationFailed(format!("status of {target}: {}", e.message))
        })
    }
}
