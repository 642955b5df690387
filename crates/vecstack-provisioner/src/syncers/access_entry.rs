use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::manifest::ResourceKind;
use crate::remote::{Endpoint, RemoteCommand};
use crate::syncer::ResourceSyncer;
use crate::syncers::require;

pub const DEFAULT_COMMENT: &str = "Enable local cluster access.";

/// One entry in the project's IP access list. `ip_address` is a single
/// address or a CIDR block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntrySpec {
    pub project_id: String,
    pub ip_address: String,
    #[serde(default)]
    pub comment: String,
}

impl AccessEntrySpec {
    pub fn is_cidr(&self) -> bool {
        self.ip_address.contains('/')
    }
}

fn check_address(value: &str) -> Result<(), String> {
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value, None),
    };
    let ip: IpAddr = addr
        .parse()
        .map_err(|_| format!("ip_address {value:?} is not an IP address or CIDR block"))?;
    if let Some(prefix) = prefix {
        let max = if ip.is_ipv4() { 32 } else { 128 };
        match prefix.parse::<u8>() {
            Ok(bits) if bits <= max => {}
            _ => return Err(format!("ip_address {value:?} has an invalid prefix length")),
        }
    }
    Ok(())
}

impl ResourceSyncer for AccessEntrySpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::AccessEntry
    }

    fn validate(&self) -> Result<(), String> {
        require("project_id", &self.project_id)?;
        require("ip_address", &self.ip_address)?;
        check_address(&self.ip_address)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::ControlPlane {
            project_id: self.project_id.clone(),
        }
    }

    fn command(&self) -> RemoteCommand<'_> {
        RemoteCommand::CreateAccessEntry(self)
    }
}
