use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    client::{Method, Request, Response},
    commit::{Commit, CommitSequence, Sequence},
    config::StorageSettings,
    connector::CouchDbConnector,
    error::{Error, Result, StorageReason},
};

/// Opaque version marker the database assigns to every document write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(revision: impl Into<String>) -> Self {
        Self(revision.into())
    }

    /// Parses the quoted form carried by the `ETag` header.
    pub fn from_etag(etag: &str) -> Option<Self> {
        let revision = etag.trim().trim_matches('"');

        if revision.is_empty() {
            None
        } else {
            Some(Self(revision.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Deserialize)]
struct Acknowledgement {
    ok: Option<bool>,
    rev: Option<Revision>,
}

/// Reads and writes individual documents and the commit stream view.
///
/// Every HTTP outcome is classified into [`Error::NotFound`],
/// [`Error::DocumentConflict`] or [`Error::Storage`]. A write without a
/// revision never replaces an existing document: the database answers with a
/// conflict instead.
#[derive(Clone)]
pub struct CouchDbStorageAdapter {
    connector: CouchDbConnector,
    settings: StorageSettings,
}

impl CouchDbStorageAdapter {
    pub fn new(connector: CouchDbConnector, settings: StorageSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    pub fn connector(&self) -> &CouchDbConnector {
        &self.connector
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// Loads the commits of stream `identifier` with `from <= sequence <= to`.
    ///
    /// Rows are requested newest first, bounded by the configured limit, and
    /// returned ascending. A missing view or database, or `from > to`, yields
    /// an empty sequence.
    pub fn load(
        &self,
        identifier: &str,
        from: Option<Sequence>,
        to: Option<Sequence>,
    ) -> Result<CommitSequence> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Ok(CommitSequence::empty());
            }
        }

        let startkey = match to {
            Some(to) => json!([identifier, to]),
            None => json!([identifier, {}]),
        };
        let endkey = match from {
            Some(from) => json!([identifier, from]),
            None => json!([identifier, null]),
        };
        let limit = self.settings.page_limit();

        let request = Request::new(
            Method::Get,
            [
                self.connector.database(),
                "_design",
                self.settings.design_doc.as_str(),
                "_view",
                self.settings.view_name.as_str(),
            ],
        )
        .query("startkey", startkey.to_string())
        .query("endkey", endkey.to_string())
        .query("include_docs", "true")
        .query("reduce", "false")
        .query("descending", "true")
        // one extra row tells a truncated load apart from an exact fit
        .query("limit", (u64::from(limit) + 1).to_string());

        let response = self.send(identifier, request)?;

        if response.status == 404 {
            return Ok(CommitSequence::empty());
        }

        if !response.is_success() {
            return Err(unexpected_status(identifier, response));
        }

        let body = response
            .json::<Value>()
            .map_err(|err| Error::storage(identifier, err))?;

        let Some(rows) = body.get("rows").and_then(Value::as_array) else {
            return Err(Error::storage(
                identifier,
                StorageReason::MalformedResponse("missing `rows` in view result".to_owned()),
            ));
        };

        let truncated = rows.len() > limit as usize;
        if truncated {
            tracing::warn!(
                "stream `{}` reached the page limit of {} commits, older commits were not loaded",
                identifier,
                limit
            );
        }

        let commits = rows
            .iter()
            .take(limit as usize)
            .rev()
            .map(|row| {
                let doc = row.get("doc").filter(|doc| doc.is_object()).ok_or_else(|| {
                    Error::storage(
                        identifier,
                        StorageReason::MalformedResponse(format!(
                            "row {} carries no document",
                            row.get("id").unwrap_or(&Value::Null)
                        )),
                    )
                })?;

                serde_json::from_value::<Commit>(doc.clone())
                    .map_err(|err| Error::storage(identifier, err))
            })
            .collect::<Result<Vec<_>>>()?;

        CommitSequence::new(commits).map_err(|err| Error::storage(identifier, err))
    }

    /// Creates the document `identifier`. Never overwrites.
    pub fn append(&self, identifier: &str, body: Value) -> Result<()> {
        self.put(identifier, body, None).map(|_| ())
    }

    /// Removal is not supported: commits are immutable.
    pub fn purge(&self, identifier: &str) -> Result<()> {
        Err(Error::storage(
            identifier,
            StorageReason::NotImplemented("purge"),
        ))
    }

    pub fn get(&self, identifier: &str) -> Result<Option<Value>> {
        let request = self.connector.document_request(Method::Get, identifier);
        let response = self.send(identifier, request)?;

        match response.status {
            404 => Ok(None),
            _ if response.is_success() => response
                .json()
                .map(Some)
                .map_err(|err| Error::storage(identifier, err)),
            _ => Err(unexpected_status(identifier, response)),
        }
    }

    /// Current revision of `identifier` without fetching its body.
    pub fn head_revision(&self, identifier: &str) -> Result<Option<Revision>> {
        let request = self.connector.document_request(Method::Head, identifier);
        let response = self.send(identifier, request)?;

        match response.status {
            404 => Ok(None),
            _ if response.is_success() => response
                .header("ETag")
                .and_then(Revision::from_etag)
                .map(Some)
                .ok_or_else(|| {
                    Error::storage(
                        identifier,
                        StorageReason::MalformedResponse("missing `ETag` header".to_owned()),
                    )
                }),
            _ => Err(unexpected_status(identifier, response)),
        }
    }

    /// Writes the full document `identifier`.
    ///
    /// `revision` must be the current revision to replace an existing
    /// document, and `None` to create one.
    pub fn put(
        &self,
        identifier: &str,
        mut body: Value,
        revision: Option<&Revision>,
    ) -> Result<Revision> {
        let Some(object) = body.as_object_mut() else {
            return Err(Error::storage(identifier, StorageReason::InvalidBody));
        };

        match revision {
            Some(revision) => {
                object.insert("_rev".to_owned(), Value::String(revision.to_string()));
            }
            None => {
                object.remove("_rev");
            }
        }

        let request = self
            .connector
            .document_request(Method::Put, identifier)
            .json(body);
        let response = self.send(identifier, request)?;

        if response.status == 409 {
            tracing::warn!("document conflict while writing `{}`", identifier);

            return Err(Error::DocumentConflict(identifier.to_owned()));
        }

        if !response.is_success() {
            return Err(unexpected_status(identifier, response));
        }

        let acknowledgement = response
            .json::<Acknowledgement>()
            .map_err(|err| Error::storage(identifier, err))?;

        match acknowledgement {
            Acknowledgement {
                ok: Some(true),
                rev: Some(rev),
            } => Ok(rev),
            _ => {
                tracing::warn!("write of `{}` was not acknowledged", identifier);

                Err(Error::storage(identifier, StorageReason::Unacknowledged))
            }
        }
    }

    pub fn delete(&self, identifier: &str, revision: &Revision) -> Result<()> {
        let request = self
            .connector
            .document_request(Method::Delete, identifier)
            .query("rev", revision.as_str());
        let response = self.send(identifier, request)?;

        match response.status {
            404 => Err(Error::NotFound(identifier.to_owned())),
            409 => Err(Error::DocumentConflict(identifier.to_owned())),
            _ if response.is_success() => Ok(()),
            _ => Err(unexpected_status(identifier, response)),
        }
    }

    fn send(&self, identifier: &str, request: Request) -> Result<Response> {
        self.connector
            .send(request)
            .map_err(|err| Error::storage(identifier, err))
    }
}

fn unexpected_status(identifier: &str, response: Response) -> Error {
    Error::storage(
        identifier,
        StorageReason::UnexpectedStatus {
            status: response.status,
            body: response.body,
        },
    )
}
