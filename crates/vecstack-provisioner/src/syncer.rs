use std::future::Future;
use std::pin::Pin;

use crate::manifest::ResourceKind;
use crate::remote::{Endpoint, ProbeTarget, RemoteCommand};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One impl per resource kind in the manifest.
///
/// A syncer knows how its kind is validated, which endpoint a session must
/// be opened against, which remote command creates it, and whether its
/// build finishes asynchronously.
pub trait ResourceSyncer: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Check required properties. `Err` carries the reason.
    fn validate(&self) -> Result<(), String>;

    fn endpoint(&self) -> Endpoint;

    fn command(&self) -> RemoteCommand<'_>;

    /// What to poll after creation. `None` = ready as soon as created.
    fn readiness(&self) -> Option<ProbeTarget> {
        None
    }
}
