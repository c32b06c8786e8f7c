use serde_json::{json, Map, Value};

use crate::{
    client::Method,
    config::StorageSettings,
    connector::CouchDbConnector,
    error::{Error, Result, StorageReason},
    storage::CouchDbStorageAdapter,
};

/// Map function indexing commit documents by `[streamId, sequence]`.
pub const COMMIT_STREAM_MAP: &str = r#"function (doc) {
  if (doc.streamId && doc.sequence) {
    emit([doc.streamId, doc.sequence], null);
  }
}"#;

/// `views` object declaring the commit stream view under `view_name`.
pub fn commit_stream_views(view_name: &str) -> Value {
    let mut views = Map::new();
    views.insert(
        view_name.to_owned(),
        json!({
            "map": COMMIT_STREAM_MAP,
            "reduce": "_count",
        }),
    );

    Value::Object(views)
}

/// Schema operations available to migrations targeting a CouchDB database.
///
/// Implementors only provide the connector; every operation is idempotent.
pub trait CouchDbMigration {
    fn connector(&self) -> &CouchDbConnector;

    fn database_name(&self) -> &str {
        self.connector().database()
    }

    fn create_database(&self) -> Result<()> {
        let connector = self.connector();
        let database = connector.database();
        let response = connector
            .send(connector.database_request(Method::Put))
            .map_err(|err| Error::storage(database, err))?;

        match response.status {
            409 | 412 => {
                tracing::debug!("database `{}` already exists", database);
                Ok(())
            }
            _ if response.is_success() => Ok(()),
            status => Err(Error::storage(
                database,
                StorageReason::UnexpectedStatus {
                    status,
                    body: response.body,
                },
            )),
        }
    }

    fn delete_database(&self) -> Result<()> {
        let connector = self.connector();
        let database = connector.database();
        let response = connector
            .send(connector.database_request(Method::Delete))
            .map_err(|err| Error::storage(database, err))?;

        match response.status {
            404 => Ok(()),
            _ if response.is_success() => Ok(()),
            status => Err(Error::storage(
                database,
                StorageReason::UnexpectedStatus {
                    status,
                    body: response.body,
                },
            )),
        }
    }

    /// Creates or replaces design document `name`.
    fn create_design_doc(&self, name: &str, views: Value) -> Result<()> {
        let identifier = format!("_design/{name}");
        let storage = design_storage(self.connector());
        let revision = storage.head_revision(&identifier)?;

        storage.put(
            &identifier,
            json!({
                "language": "javascript",
                "views": views,
            }),
            revision.as_ref(),
        )?;

        Ok(())
    }

    fn delete_design_doc(&self, name: &str) -> Result<()> {
        let identifier = format!("_design/{name}");
        let storage = design_storage(self.connector());

        let Some(revision) = storage.head_revision(&identifier)? else {
            return Ok(());
        };

        match storage.delete(&identifier, &revision) {
            Err(Error::NotFound(_)) => Ok(()),
            result => result,
        }
    }

    /// Declares the view [`CouchDbStorageAdapter::load`] queries.
    fn create_commit_stream_view(&self, settings: &StorageSettings) -> Result<()> {
        self.create_design_doc(
            &settings.design_doc,
            commit_stream_views(&settings.view_name),
        )
    }
}

impl CouchDbMigration for CouchDbConnector {
    fn connector(&self) -> &CouchDbConnector {
        self
    }
}

fn design_storage(connector: &CouchDbConnector) -> CouchDbStorageAdapter {
    CouchDbStorageAdapter::new(connector.clone(), StorageSettings::default())
}
