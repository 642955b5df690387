use serde::{Deserialize, Serialize};

use crate::manifest::ResourceKind;
use crate::remote::{Endpoint, ProbeTarget, RemoteCommand};
use crate::syncer::ResourceSyncer;
use crate::syncers::require;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub project_id: String,
    pub cluster_name: String,
    /// e.g. "M0" for the free tier
    pub instance_size: String,
    /// "TENANT" for shared tiers, otherwise the cloud provider
    pub provider_name: String,
    /// Only meaningful for TENANT clusters, e.g. "GCP"
    #[serde(default)]
    pub backing_provider_name: String,
    pub region_name: String,
}

impl ClusterSpec {
    /// A free-tier replica set on Google Cloud, matching what the stack
    /// has always deployed by default.
    pub fn free_tier(project_id: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            cluster_name: cluster_name.into(),
            instance_size: "M0".into(),
            provider_name: "TENANT".into(),
            backing_provider_name: "GCP".into(),
            region_name: "CENTRAL_US".into(),
        }
    }
}

impl ResourceSyncer for ClusterSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Cluster
    }

    fn validate(&self) -> Result<(), String> {
        require("project_id", &self.project_id)?;
        require("cluster_name", &self.cluster_name)?;
        require("instance_size", &self.instance_size)?;
        require("provider_name", &self.provider_name)?;
        require("region_name", &self.region_name)?;
        if self.provider_name == "TENANT" {
            require("backing_provider_name", &self.backing_provider_name)?;
        }
        Ok(())
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::ControlPlane {
            project_id: self.project_id.clone(),
        }
    }

    fn command(&self) -> RemoteCommand<'_> {
        RemoteCommand::CreateCluster(self)
    }

    fn readiness(&self) -> Option<ProbeTarget> {
        Some(ProbeTarget::Cluster {
            project_id: self.project_id.clone(),
            cluster_name: self.cluster_name.clone(),
        })
    }
}
