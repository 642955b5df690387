//! Production [`Connector`] for MongoDB Atlas.
//!
//! Control-plane endpoints go through the Atlas Administration API (OAuth
//! service account, one access token per session). Database endpoints go
//! through the official driver, authenticating as a database user.

mod admin;
mod database;

use std::time::Duration;

use crate::error::{ProvisionerError, format_err_chain};
use crate::manifest::{HostRef, Secret};
use crate::remote::{Connector, Endpoint, RemoteError, Session};
use crate::syncer::BoxFuture;

pub use admin::ControlPlaneSession;
pub use database::DatabaseSession;

pub const DEFAULT_BASE_URL: &str = "https://cloud.mongodb.com";
const APP_NAME: &str = "vecstack";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Atlas service-account credentials (client-credentials grant).
#[derive(Debug, Clone)]
pub struct ServiceAccount {
    pub client_id: String,
    pub client_secret: Secret,
}

pub struct AtlasConnector {
    http: reqwest::Client,
    base_url: String,
    account: ServiceAccount,
}

impl AtlasConnector {
    pub fn new(account: ServiceAccount) -> Result<Self, ProvisionerError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("vecstack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionerError::Connect(format_err_chain(&e)))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            account,
        })
    }

    /// Point the admin client somewhere other than the public cloud.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn control_plane(&self, project_id: &str) -> Result<ControlPlaneSession, RemoteError> {
        ControlPlaneSession::open(self.http.clone(), &self.base_url, &self.account, project_id).await
    }
}

impl Connector for AtlasConnector {
    fn open<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, Result<Box<dyn Session>, RemoteError>> {
        Box::pin(async move {
            match endpoint {
                Endpoint::ControlPlane { project_id } => {
                    let session = self.control_plane(project_id).await?;
                    Ok(Box::new(session) as Box<dyn Session>)
                }
                Endpoint::Database(conn) => {
                    let uri = match &conn.host {
                        HostRef::Uri { uri } => uri.clone(),
                        HostRef::Cluster {
                            project_id,
                            cluster_name,
                        } => {
                            let mut admin = self.control_plane(project_id).await?;
                            let srv = admin.standard_srv(cluster_name).await;
                            Box::new(admin).close().await;
                            srv?
                        }
                    };
                    let session = DatabaseSession::open(&uri, conn, APP_NAME).await?;
                    Ok(Box::new(session) as Box<dyn Session>)
                }
            }
        })
    }
}
