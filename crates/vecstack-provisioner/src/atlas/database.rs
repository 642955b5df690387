use std::time::Duration;

use futures::TryStreamExt;
use mongodb::Client;
use mongodb::bson::{Document, doc};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, Credential};
use serde_json::{Value, json};

use crate::error::format_err_chain;
use crate::export::strip_credentials;
use crate::manifest::DatabaseConnection;
use crate::remote::{IndexStatus, Observation, ProbeTarget, RemoteCommand, RemoteError, Session};
use crate::syncer::BoxFuture;
use crate::syncers::SearchIndexSpec;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server codes for "namespace exists" and "index already exists".
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_ALREADY_EXISTS: i32 = 68;

/// A driver client authenticated as a database user against `admin`.
pub struct DatabaseSession {
    client: Client,
    /// Connection string the session resolved, without credentials.
    host: String,
}

impl DatabaseSession {
    /// Build the client and ping `admin` so authentication problems
    /// surface here rather than on the first command.
    pub(crate) async fn open(
        uri: &str,
        conn: &DatabaseConnection,
        app_name: &str,
    ) -> Result<Self, RemoteError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| RemoteError::connect(format_err_chain(&e)))?;

        let mut credential = Credential::default();
        credential.username = Some(conn.username.clone());
        credential.password = Some(conn.password.expose().to_string());
        credential.source = Some("admin".to_string());
        options.credential = Some(credential);
        options.app_name = Some(app_name.to_string());
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);

        let client = Client::with_options(options)
            .map_err(|e| RemoteError::classify_open(format_err_chain(&e)))?;

        let ping = client.database("admin").run_command(doc! { "ping": 1 }).await;
        if let Err(e) = ping {
            client.shutdown().await;
            return Err(RemoteError::classify_open(format_err_chain(&e)));
        }

        let host = strip_credentials(uri);
        tracing::debug!(%host, username = %conn.username, "opened database session");
        Ok(Self { client, host })
    }

    async fn create_collection(&self, database: &str, collection: &str) -> Result<Value, RemoteError> {
        self.client
            .database(database)
            .create_collection(collection)
            .await
            .map_err(|e| command_error(&e, NAMESPACE_EXISTS))?;
        Ok(json!({
            "namespace": format!("{database}.{collection}"),
            "host": self.host,
        }))
    }

    async fn create_search_index(&self, spec: &SearchIndexSpec) -> Result<Value, RemoteError> {
        let definition = mongodb::bson::to_document(&spec.definition())
            .map_err(|e| RemoteError::operation(format_err_chain(&e)))?;
        let command = doc! {
            "createSearchIndexes": spec.collection.as_str(),
            "indexes": [{
                "name": spec.index_name.as_str(),
                "type": "vectorSearch",
                "definition": definition,
            }],
        };
        let reply = self
            .client
            .database(&spec.database)
            .run_command(command)
            .await
            .map_err(|e| command_error(&e, INDEX_ALREADY_EXISTS))?;

        let id = reply
            .get_array("indexesCreated")
            .ok()
            .and_then(|created| created.first())
            .and_then(|entry| entry.as_document())
            .and_then(|entry| entry.get_str("id").ok())
            .map(String::from);
        Ok(json!({
            "index_id": id,
            "index_name": spec.index_name,
            "host": self.host,
        }))
    }

    async fn search_index_status(
        &self,
        database: &str,
        collection: &str,
        index_name: &str,
    ) -> Result<Observation, RemoteError> {
        let mut cursor = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .aggregate(vec![doc! { "$listSearchIndexes": { "name": index_name } }])
            .await
            .map_err(|e| RemoteError::operation(format_err_chain(&e)))?;

        let Some(index) = cursor
            .try_next()
            .await
            .map_err(|e| RemoteError::operation(format_err_chain(&e)))?
        else {
            return Ok(Observation {
                status: IndexStatus::Building,
                properties: json!({ "host": self.host }),
            });
        };

        let reported = index.get_str("status").unwrap_or("PENDING");
        let status = match reported {
            "READY" => IndexStatus::Steady,
            "FAILED" => IndexStatus::Failed,
            _ => IndexStatus::Building,
        };
        let mut properties = json!({
            "index_status": reported,
            "queryable": index.get_bool("queryable").unwrap_or(false),
            "host": self.host,
        });
        if let Ok(message) = index.get_str("message") {
            properties["message"] = json!(message);
        }
        Ok(Observation { status, properties })
    }
}

impl Session for DatabaseSession {
    fn execute<'a>(
        &'a mut self,
        command: RemoteCommand<'a>,
    ) -> BoxFuture<'a, Result<Value, RemoteError>> {
        Box::pin(async move {
            tracing::debug!(%command, "database command");
            match command {
                RemoteCommand::CreateCollection {
                    database,
                    collection,
                } => self.create_collection(database, collection).await,
                RemoteCommand::CreateSearchIndex(spec) => self.create_search_index(spec).await,
                other => Err(RemoteError::operation(format!(
                    "{other} is not a database command"
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
                ProbeTarget::SearchIndex {
                    database,
                    collection,
                    index_name,
                } => {
                    self.search_index_status(database, collection, index_name)
                        .await
                }
                other => Err(RemoteError::operation(format!(
                    "{other} cannot be observed through a database session"
                ))),
            }
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        let Self { client, .. } = *self;
        Box::pin(async move {
            client.shutdown().await;
        })
    }
}

/// Map a command failure, treating `exists_code` (or the message saying
/// so) as already-exists.
fn command_error(err: &MongoError, exists_code: i32) -> RemoteError {
    let message = format_err_chain(err);
    if let ErrorKind::Command(command) = err.kind.as_ref()
        && command.code == exists_code
    {
        return RemoteError::already_exists(message);
    }
    RemoteError::classify(message)
}
