use std::fmt;

use serde::{Deserialize, Serialize};

use crate::manifest::ResourceKind;

/// Composite key for addressing a resource in state.
///
/// Two resources of the same kind but different names (e.g. two
/// `access_entry` nodes for different IPs) have distinct addresses.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ResourceAddr {
    pub kind: ResourceKind,
    pub name: String,
}

impl fmt::Display for ResourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}
