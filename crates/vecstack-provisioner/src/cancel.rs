use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ProvisionerError;

/// Aborts a [`Cancellation`] and every clone of it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cooperative cancellation for blocking waits: an explicit abort signal,
/// an optional deadline, or both.
///
/// Every retry delay and poll interval goes through [`Cancellation::sleep`]
/// so that a run stops promptly once either fires.
#[derive(Debug, Clone)]
pub struct Cancellation {
    signal: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            Self {
                signal: rx,
                deadline: None,
            },
        )
    }

    /// A token that is never cancelled and has no deadline.
    pub fn never() -> Self {
        let (_, token) = Self::new();
        token
    }

    /// Add a deadline. An earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the run has already been aborted.
    pub fn check(&self) -> Result<(), ProvisionerError> {
        if *self.signal.borrow() {
            return Err(ProvisionerError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ProvisionerError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ProvisionerError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            err = self.cancelled() => Err(err),
        }
    }

    /// Drive `fut` to completion unless cancelled first. The future is
    /// dropped on cancellation.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ProvisionerError> {
        tokio::select! {
            out = fut => Ok(out),
            err = self.cancelled() => Err(err),
        }
    }

    /// Resolves once the signal fires or the deadline passes.
    async fn cancelled(&self) -> ProvisionerError {
        let mut signal = self.signal.clone();
        let explicit = async move {
            loop {
                if *signal.borrow_and_update() {
                    return;
                }
                if signal.changed().await.is_err() {
                    // Handle dropped without cancelling: never fires.
                    std::future::pending::<()>().await;
                }
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = explicit => ProvisionerError::Cancelled,
            _ = deadline => ProvisionerError::DeadlineExceeded,
        }
    }
}
