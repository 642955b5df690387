use std::path::PathBuf;

use crate::error::ProvisionerError;
use crate::state::ProvisionerState;

/// Local-disk journal of provisioning outcomes.
///
/// The journal is a record for operators; it is never consulted to decide
/// whether a resource exists. The remote stays authoritative.
#[derive(Debug, Clone)]
pub struct StatePersistence {
    pub local_path: PathBuf,
}

impl StatePersistence {
    pub fn new(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
        }
    }

    /// Write state atomically: tmp file + rename.
    pub async fn flush(&self, state: &ProvisionerState) -> Result<(), ProvisionerError> {
        let json = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.local_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.local_path)?;

        tracing::debug!(path = %self.local_path.display(), "state flushed to local disk");
        Ok(())
    }

    /// Load state, or return Default if no journal exists yet.
    pub async fn load(&self) -> Result<ProvisionerState, ProvisionerError> {
        if !self.local_path.exists() {
            tracing::debug!(path = %self.local_path.display(), "no existing state found, starting fresh");
            return Ok(ProvisionerState::default());
        }

        let json = std::fs::read(&self.local_path)?;
        let state: ProvisionerState = serde_json::from_slice(&json).map_err(|e| {
            ProvisionerError::State(format!(
                "corrupt state file {}: {e}",
                self.local_path.display()
            ))
        })?;
        tracing::debug!(path = %self.local_path.display(), "state loaded from local disk");
        Ok(state)
    }
}
