use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::atlas::ServiceAccount;
use crate::error::format_err_chain;
use crate::remote::{IndexStatus, Observation, ProbeTarget, RemoteCommand, RemoteError, Session};
use crate::syncer::BoxFuture;
use crate::syncers::access_entry::DEFAULT_COMMENT;
use crate::syncers::{AccessEntrySpec, ClusterSpec, DatabaseUserSpec};

const ATLAS_MEDIA_TYPE: &str = "application/vnd.atlas.2023-02-01+json";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    detail: String,
}

/// A bearer-token session against one project's administration API.
pub struct ControlPlaneSession {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    token: String,
}

impl ControlPlaneSession {
    /// Exchange the service-account credentials for an access token.
    pub(crate) async fn open(
        http: reqwest::Client,
        base_url: &str,
        account: &ServiceAccount,
        project_id: &str,
    ) -> Result<Self, RemoteError> {
        let response = http
            .post(format!("{base_url}/api/oauth/token"))
            .basic_auth(&account.client_id, Some(account.client_secret.expose()))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| RemoteError::connect(format_err_chain(&e)))?;

        let status = response.status();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            return Err(RemoteError::auth(format!(
                "service account {} rejected ({status})",
                account.client_id
            )));
        }
        if !status.is_success() {
            return Err(RemoteError::connect(format!("token endpoint returned {status}")));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::connect(format_err_chain(&e)))?;

        tracing::debug!(project_id, "opened control-plane session");
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            project_id: project_id.to_string(),
            token: token.access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/atlas/v2/groups/{}/{path}",
            self.base_url, self.project_id
        )
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, RemoteError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, ATLAS_MEDIA_TYPE)
            .header(CONTENT_TYPE, ATLAS_MEDIA_TYPE)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::operation(format_err_chain(&e)))?;
        read_json(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, RemoteError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, ATLAS_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| RemoteError::operation(format_err_chain(&e)))?;
        read_json(response).await
    }

    /// The cluster's published `mongodb+srv://` string.
    pub(crate) async fn standard_srv(&mut self, cluster_name: &str) -> Result<String, RemoteError> {
        let cluster = self.get(&format!("clusters/{cluster_name}")).await?;
        cluster
            .pointer("/connectionStrings/standardSrv")
            .and_then(Value::as_str)
            .filter(|srv| !srv.is_empty())
            .map(String::from)
            .ok_or_else(|| {
                RemoteError::connect(format!(
                    "cluster {cluster_name} has not published a connection string yet"
                ))
            })
    }

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<Value, RemoteError> {
        let created = self.post("clusters", cluster_body(spec)).await?;
        Ok(json!({
            "id": created.get("id"),
            "name": created.get("name"),
            "state_name": created.get("stateName"),
        }))
    }

    async fn create_database_user(&self, spec: &DatabaseUserSpec) -> Result<Value, RemoteError> {
        let mut created = self
            .post("databaseUsers", database_user_body(spec))
            .await?;
        if let Value::Object(fields) = &mut created {
            fields.remove("password");
        }
        Ok(created)
    }

    async fn create_access_entry(&self, spec: &AccessEntrySpec) -> Result<Value, RemoteError> {
        self.post("accessList", access_list_body(spec)).await?;
        Ok(json!({ "entry": spec.ip_address }))
    }

    async fn cluster_status(&self, cluster_name: &str) -> Result<Observation, RemoteError> {
        let cluster = self.get(&format!("clusters/{cluster_name}")).await?;
        let state_name = cluster
            .get("stateName")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let status = match state_name {
            "IDLE" => IndexStatus::Steady,
            "DELETING" | "DELETED" => IndexStatus::Failed,
            _ => IndexStatus::Building,
        };
        let mut properties = json!({ "state_name": state_name });
        if let Some(srv) = cluster.pointer("/connectionStrings/standardSrv") {
            properties["standard_srv"] = srv.clone();
        }
        if status == IndexStatus::Failed {
            properties["message"] = json!(format!("cluster is {}", state_name.to_ascii_lowercase()));
        }
        Ok(Observation { status, properties })
    }
}

impl Session for ControlPlaneSession {
    fn execute<'a>(
        &'a mut self,
        command: RemoteCommand<'a>,
    ) -> BoxFuture<'a, Result<Value, RemoteError>> {
        Box::pin(async move {
            tracing::debug!(project_id = %self.project_id, %command, "admin api call");
            match command {
                RemoteCommand::CreateCluster(spec) => self.create_cluster(spec).await,
                RemoteCommand::CreateDatabaseUser(spec) => self.create_database_user(spec).await,
                RemoteCommand::CreateAccessEntry(spec) => self.create_access_entry(spec).await,
                other => Err(RemoteError::operation(format!(
                    "{other} is not an administration API command"
                ))),
            }
        })
    }

    fn probe<'a>(
        &'a mut self,
        target: &'a ProbeTarget,
    ) -> BoxFuture<'a, Result<Observation, RemoteError>> {
        Box::pin(async move {
            match target {
                ProbeTarget::Cluster { cluster_name, .. } => self.cluster_status(cluster_name).await,
                other => Err(RemoteError::operation(format!(
                    "{other} cannot be observed through the administration API"
                ))),
            }
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

async fn read_json(response: Response) -> Result<Value, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| RemoteError::operation(format_err_chain(&e)));
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_response(status, &body))
}

fn classify_response(status: StatusCode, body: &str) -> RemoteError {
    let api: ApiError = serde_json::from_str(body).unwrap_or_default();
    let message = if api.detail.is_empty() {
        format!("{status}: {}", body.chars().take(200).collect::<String>())
    } else {
        format!("{status} {}: {}", api.error_code, api.detail)
    };

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        RemoteError::auth(message)
    } else if status == StatusCode::CONFLICT
        || api.error_code.ends_with("ALREADY_EXISTS")
        || api.error_code.starts_with("DUPLICATE_")
    {
        RemoteError::already_exists(message)
    } else {
        RemoteError::operation(message)
    }
}

fn cluster_body(spec: &ClusterSpec) -> Value {
    let mut region = json!({
        "providerName": spec.provider_name,
        "regionName": spec.region_name,
        "priority": 7,
        "electableSpecs": { "instanceSize": spec.instance_size },
    });
    if spec.provider_name == "TENANT" {
        region["backingProviderName"] = json!(spec.backing_provider_name);
    } else {
        region["electableSpecs"]["nodeCount"] = json!(3);
    }
    json!({
        "name": spec.cluster_name,
        "clusterType": "REPLICASET",
        "replicationSpecs": [{
            "zoneName": "vecstack managed",
            "regionConfigs": [region],
        }],
    })
}

fn database_user_body(spec: &DatabaseUserSpec) -> Value {
    json!({
        "groupId": spec.project_id,
        "databaseName": "admin",
        "username": spec.username,
        "password": spec.password.expose(),
        "roles": [{
            "roleName": "readWrite",
            "databaseName": spec.database,
            "collectionName": spec.collection,
        }],
        "scopes": [{ "name": spec.cluster_name, "type": "CLUSTER" }],
    })
}

fn access_list_body(spec: &AccessEntrySpec) -> Value {
    let comment = if spec.comment.is_empty() {
        DEFAULT_COMMENT
    } else {
        spec.comment.as_str()
    };
    let key = if spec.is_cidr() { "cidrBlock" } else { "ipAddress" };
    json!([{ key: spec.ip_address, "comment": comment }])
}
