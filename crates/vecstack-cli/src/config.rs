use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vecstack_provisioner::Settings;
use vecstack_provisioner::atlas::ServiceAccount;
use vecstack_provisioner::export::CredentialRef;
use vecstack_provisioner::manifest::{Secret, StackParams};
use vecstack_provisioner::syncers::{ClusterSpec, Quantization, Similarity, VectorField};

/// Current config version. Bump this when adding fields or changing shape.
/// Each bump requires a corresponding entry in [`migrate`].
const CURRENT_VERSION: u32 = 1;

const PASSWORD_VAR: &str = "VECTOR_PASSWORD";

/// Stand-ins used by `plan`, which never contacts anything.
const PLAN_IP_PLACEHOLDER: &str = "0.0.0.0";
const PLAN_PASSWORD_PLACEHOLDER: &str = "unset";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VecstackConfig {
    /// Schema version. Missing or 0 = pre-versioned config.
    #[serde(default)]
    pub config_version: u32,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub service_account: Option<ServiceAccountConfig>,
    /// Access-list address. Discovered at run time when unset.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Connect here instead of the cluster's published address.
    #[serde(default)]
    pub cluster_uri: Option<String>,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub provisioner: Settings,
    #[serde(skip)]
    password_from_env: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountConfig {
    pub client_id: String,
    pub client_secret: Secret,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: String,
    pub instance_size: String,
    pub provider_name: String,
    pub backing_provider_name: String,
    pub region_name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "vector-cluster".into(),
            instance_size: "M0".into(),
            provider_name: "TENANT".into(),
            backing_provider_name: "GCP".into(),
            region_name: "CENTRAL_US".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub database: String,
    pub collection: String,
    pub username: String,
    pub password: Option<Secret>,
    pub index_name: String,
    pub field_path: String,
    pub num_dimensions: u32,
    pub similarity: Similarity,
    pub quantization: Quantization,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            database: "ww".into(),
            collection: "facts".into(),
            username: "vector-user".into(),
            password: None,
            index_name: "vector-index".into(),
            field_path: "embedding".into(),
            num_dimensions: 768,
            similarity: Similarity::DotProduct,
            quantization: Quantization::Scalar,
        }
    }
}

impl Default for VecstackConfig {
    fn default() -> Self {
        Self {
            config_version: CURRENT_VERSION,
            project_id: String::new(),
            service_account: None,
            ip_address: None,
            cluster_uri: None,
            cluster: ClusterConfig::default(),
            vector: VectorConfig::default(),
            provisioner: Settings::default(),
            password_from_env: false,
        }
    }
}

pub fn config_dir() -> eyre::Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| eyre::eyre!("no config directory found"))?;
    Ok(base.join("vecstack"))
}

/// Load the config file, or defaults when the default location has none.
/// An explicitly named file must exist.
pub fn load_config(path: Option<&Path>) -> eyre::Result<VecstackConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_dir()?.join("config.json");
            if !path.exists() {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(VecstackConfig::default());
            }
            path
        }
    };
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| eyre::eyre!("failed to read config at {}: {e}", path.display()))?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> eyre::Result<VecstackConfig> {
    // Parse as raw JSON so we can run migrations before deserializing.
    let json: serde_json::Value = serde_json::from_str(contents)?;
    let on_disk_version = json
        .get("config_version")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    let migrated = migrate(json, on_disk_version)?;
    let config: VecstackConfig = serde_json::from_value(migrated)?;
    Ok(config)
}

/// Run sequential migrations from `from_version` up to [`CURRENT_VERSION`].
fn migrate(mut json: serde_json::Value, from_version: u32) -> eyre::Result<serde_json::Value> {
    if from_version > CURRENT_VERSION {
        return Err(eyre::eyre!(
            "config_version {from_version} is newer than this build supports ({CURRENT_VERSION}). \
             Please update vecstack."
        ));
    }

    // v0 → v1: flat vector_* keys move under "vector"
    if from_version < 1 {
        let obj = json
            .as_object_mut()
            .ok_or_else(|| eyre::eyre!("config is not a JSON object"))?;
        let mut vector = serde_json::Map::new();
        for (old, new) in [
            ("vector_database", "database"),
            ("vector_collection", "collection"),
            ("vector_user", "username"),
            ("vector_password", "password"),
        ] {
            if let Some(value) = obj.remove(old) {
                vector.insert(new.to_string(), value);
            }
        }
        if !vector.is_empty() {
            obj.insert("vector".to_string(), serde_json::Value::Object(vector));
        }
        obj.insert(
            "config_version".to_string(),
            serde_json::Value::Number(1.into()),
        );
        tracing::info!("migrated config v0 → v1 (nested vector settings)");
    }

    Ok(json)
}

impl VecstackConfig {
    /// Overlay environment variables; blank values are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MONGODB_ATLAS_PROJECT_ID") {
            self.project_id = v;
        }
        if let Some(v) = get("MONGODB_ATLAS_CLIENT_ID") {
            self.account_mut().client_id = v;
        }
        if let Some(v) = get("MONGODB_ATLAS_CLIENT_SECRET") {
            self.account_mut().client_secret = Secret::new(v);
        }
        if let Some(v) = get("IP_ADDRESS") {
            self.ip_address = Some(v);
        }
        if let Some(v) = get("VECTOR_CLUSTER_URI") {
            self.cluster_uri = Some(v);
        }
        if let Some(v) = get("VECTOR_DATABASE") {
            self.vector.database = v;
        }
        if let Some(v) = get("VECTOR_COLLECTION") {
            self.vector.collection = v;
        }
        if let Some(v) = get("VECTOR_USER") {
            self.vector.username = v;
        }
        if let Some(v) = get(PASSWORD_VAR) {
            self.vector.password = Some(Secret::new(v));
            self.password_from_env = true;
        }
    }

    fn account_mut(&mut self) -> &mut ServiceAccountConfig {
        self.service_account.get_or_insert_with(|| ServiceAccountConfig {
            client_id: String::new(),
            client_secret: Secret::new(""),
        })
    }

    pub fn service_account(&self) -> eyre::Result<ServiceAccount> {
        match &self.service_account {
            Some(account) if !account.client_id.is_empty() && !account.client_secret.is_empty() => {
                Ok(ServiceAccount {
                    client_id: account.client_id.clone(),
                    client_secret: account.client_secret.clone(),
                })
            }
            _ => Err(eyre::eyre!(
                "missing MongoDB Atlas service account.\n\
                 Set MONGODB_ATLAS_CLIENT_ID and MONGODB_ATLAS_CLIENT_SECRET in your environment,\n\
                 or add a \"service_account\" entry with client_id and client_secret to the config file."
            )),
        }
    }

    /// Where consumers find the database password. Never the value.
    pub fn credential_ref(&self) -> CredentialRef {
        if self.password_from_env {
            CredentialRef::env(PASSWORD_VAR)
        } else {
            CredentialRef::new("config:vector.password")
        }
    }

    pub fn stack_params(&self, ip_address: String) -> eyre::Result<StackParams> {
        self.require_project()?;
        let password = match &self.vector.password {
            Some(password) if !password.is_empty() => password.clone(),
            _ => {
                return Err(eyre::eyre!(
                    "missing {PASSWORD_VAR}.\n\
                     Set the database user's password in your environment \
                     or as \"vector.password\" in the config file."
                ));
            }
        };
        Ok(self.params(ip_address, password))
    }

    /// Params for listing the plan. Nothing is sent anywhere, so an unset
    /// IP or password gets a placeholder instead of a lookup or an error.
    pub fn plan_params(&self) -> eyre::Result<StackParams> {
        self.require_project()?;
        let ip_address = self
            .ip_address
            .clone()
            .unwrap_or_else(|| PLAN_IP_PLACEHOLDER.to_string());
        let password = match &self.vector.password {
            Some(password) if !password.is_empty() => password.clone(),
            _ => Secret::new(PLAN_PASSWORD_PLACEHOLDER),
        };
        Ok(self.params(ip_address, password))
    }

    fn require_project(&self) -> eyre::Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(eyre::eyre!(
                "missing MONGODB_ATLAS_PROJECT_ID.\n\
                 Set it in your environment or as \"project_id\" in the config file."
            ));
        }
        Ok(())
    }

    fn params(&self, ip_address: String, password: Secret) -> StackParams {
        StackParams {
            project_id: self.project_id.clone(),
            cluster: ClusterSpec {
                project_id: self.project_id.clone(),
                cluster_name: self.cluster.name.clone(),
                instance_size: self.cluster.instance_size.clone(),
                provider_name: self.cluster.provider_name.clone(),
                backing_provider_name: self.cluster.backing_provider_name.clone(),
                region_name: self.cluster.region_name.clone(),
            },
            cluster_uri: self.cluster_uri.clone(),
            ip_address,
            username: self.vector.username.clone(),
            password,
            database: self.vector.database.clone(),
            collection: self.vector.collection.clone(),
            index_name: self.vector.index_name.clone(),
            vector_field: VectorField {
                path: self.vector.field_path.clone(),
                num_dimensions: self.vector.num_dimensions,
                similarity: self.vector.similarity,
                quantization: self.vector.quantization,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use vecstack_provisioner::Manifest;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_describe_the_free_tier_stack() {
        let mut config = VecstackConfig::default();
        config.apply_env(env(&[
            ("MONGODB_ATLAS_PROJECT_ID", "proj-1"),
            ("VECTOR_PASSWORD", "pw"),
        ]));

        let params = config.stack_params("203.0.113.7".into()).unwrap();
        assert_eq!(params.cluster, ClusterSpec::free_tier("proj-1", "vector-cluster"));
        assert_eq!(params.database, "ww");
        assert_eq!(params.collection, "facts");
        assert_eq!(params.username, "vector-user");
        assert_eq!(params.index_name, "vector-index");
        assert_eq!(params.vector_field.num_dimensions, 768);
        assert_eq!(params.vector_field.similarity, Similarity::DotProduct);
        assert_eq!(params.vector_field.quantization, Quantization::Scalar);
        assert!(params.cluster_uri.is_none());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = parse_config(
            r#"{
                "config_version": 1,
                "project_id": "from-file",
                "vector": { "database": "filedb", "password": "file-pw" },
                "provisioner": { "retry": { "max_attempts": 3 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.credential_ref().as_str(), "config:vector.password");

        config.apply_env(env(&[
            ("MONGODB_ATLAS_PROJECT_ID", "from-env"),
            ("VECTOR_DATABASE", "  "),
            ("VECTOR_PASSWORD", "env-pw"),
        ]));

        assert_eq!(config.project_id, "from-env");
        assert_eq!(config.vector.database, "filedb");
        assert_eq!(config.credential_ref().as_str(), "env:VECTOR_PASSWORD");
        assert_eq!(config.provisioner.retry.max_attempts, 3);
        assert_eq!(config.provisioner.retry.delay, Duration::from_secs(10));
    }

    #[test]
    fn missing_values_produce_guidance() {
        let config = VecstackConfig::default();

        let err = config.stack_params("203.0.113.7".into()).unwrap_err();
        assert!(err.to_string().contains("MONGODB_ATLAS_PROJECT_ID"));

        let err = config.service_account().unwrap_err();
        assert!(err.to_string().contains("MONGODB_ATLAS_CLIENT_ID"));

        let mut config = VecstackConfig::default();
        config.apply_env(env(&[("MONGODB_ATLAS_PROJECT_ID", "proj-1")]));
        let err = config.stack_params("203.0.113.7".into()).unwrap_err();
        assert!(err.to_string().contains("VECTOR_PASSWORD"));
    }

    #[test]
    fn plan_params_need_no_ip_or_password() {
        let mut config = VecstackConfig::default();
        config.apply_env(env(&[("MONGODB_ATLAS_PROJECT_ID", "proj-1")]));

        let params = config.plan_params().unwrap();
        assert_eq!(params.ip_address, PLAN_IP_PLACEHOLDER);
        assert!(!params.password.is_empty());
        for spec in &Manifest::vector_search(&params).specs {
            spec.validate().unwrap();
        }

        config.ip_address = Some("198.51.100.4".into());
        assert_eq!(config.plan_params().unwrap().ip_address, "198.51.100.4");

        let err = VecstackConfig::default().plan_params().unwrap_err();
        assert!(err.to_string().contains("MONGODB_ATLAS_PROJECT_ID"));
    }

    #[test]
    fn service_account_needs_both_halves() {
        let mut config = VecstackConfig::default();
        config.apply_env(env(&[("MONGODB_ATLAS_CLIENT_ID", "mdb_sa_id")]));
        assert!(config.service_account().is_err());

        config.apply_env(env(&[("MONGODB_ATLAS_CLIENT_SECRET", "mdb_sa_sk")]));
        let account = config.service_account().unwrap();
        assert_eq!(account.client_id, "mdb_sa_id");
        assert_eq!(account.client_secret.expose(), "mdb_sa_sk");
    }

    #[test]
    fn v0_config_is_migrated() {
        let config = parse_config(
            r#"{ "project_id": "p", "vector_database": "legacy", "vector_user": "old-user" }"#,
        )
        .unwrap();
        assert_eq!(config.config_version, 1);
        assert_eq!(config.vector.database, "legacy");
        assert_eq!(config.vector.username, "old-user");
        assert_eq!(config.vector.collection, "facts");
    }

    #[test]
    fn newer_config_is_rejected() {
        let err = parse_config(r#"{ "config_version": 99 }"#).unwrap_err();
        assert!(err.to_string().contains("newer than this build supports"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.json");
        assert!(load_config(Some(&missing)).is_err());

        std::fs::write(&missing, r#"{ "config_version": 1, "project_id": "p" }"#).unwrap();
        assert_eq!(load_config(Some(&missing)).unwrap().project_id, "p");
    }
}
