use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::Cancellation;
use crate::error::ProvisionerError;
use crate::remote::{Connector, Endpoint, RemoteErrorKind, Session};

/// Bounded retry for the authentication race that follows user creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total connection attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    #[serde(rename = "delay_secs", with = "secs")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(10),
        }
    }
}

/// Opens one session per operation, absorbing transient authentication
/// rejections.
///
/// Sessions are never pooled. Whoever calls [`ConnectionSupervisor::acquire`]
/// owns the session and must close it on every exit path.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
}

impl ConnectionSupervisor {
    pub fn new(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn acquire(
        &self,
        endpoint: &Endpoint,
        cancel: &Cancellation,
    ) -> Result<Box<dyn Session>, ProvisionerError> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            cancel.check()?;

            match cancel.run(self.connector.open(endpoint)).await? {
                Ok(session) => {
                    if attempt > 1 {
                        tracing::info!(
                            endpoint = %endpoint,
                            attempt,
                            "session established after authentication race"
                        );
                    }
                    return Ok(session);
                }
                Err(e) => match e.kind {
                    RemoteErrorKind::AuthRace => {
                        tracing::debug!(
                            endpoint = %endpoint,
                            attempt,
                            max_attempts,
                            "credentials not yet accepted: {e}"
                        );
                        if attempt < max_attempts {
                            cancel.sleep(self.policy.delay).await?;
                        }
                    }
                    RemoteErrorKind::Auth => return Err(ProvisionerError::Auth(e.message)),
                    _ => return Err(ProvisionerError::Connect(e.message)),
                },
            }
        }

        tracing::warn!(endpoint = %endpoint, attempts = max_attempts, "authentication retries exhausted");
        Err(ProvisionerError::AuthExhausted {
            attempts: max_attempts,
        })
    }
}

pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
