use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::client::{Client, Method, Request, Response, TransportError};

#[derive(Debug, Clone)]
struct StoredDocument {
    generation: u64,
    revision: String,
    body: Value,
}

type Database = BTreeMap<String, StoredDocument>;

/// In-process stand-in for a CouchDB server.
///
/// Reproduces the status codes and revision rules the adapters depend on.
/// Views are not evaluated from their javascript source: every view declared
/// in a design document indexes documents carrying `streamId` and `sequence`
/// under the key `[streamId, sequence]`.
#[derive(Debug, Clone, Default)]
pub struct MemoryCouchDb(Arc<RwLock<HashMap<String, Database>>>);

impl MemoryCouchDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(name: impl Into<String>) -> Self {
        let server = Self::default();
        server.0.write().insert(name.into(), Database::new());
        server
    }

    /// Stored body of a document, including `_id` and `_rev`.
    pub fn document(&self, database: &str, id: &str) -> Option<Value> {
        self.0
            .read()
            .get(database)
            .and_then(|db| db.get(id))
            .map(|doc| doc.body.clone())
    }

    pub fn document_ids(&self, database: &str) -> Vec<String> {
        self.0
            .read()
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_database(&self, database: &str) -> bool {
        self.0.read().contains_key(database)
    }

    fn handle(&self, request: &Request) -> Response {
        let segments = request
            .segments
            .iter()
            .map(String::as_str)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();

        match segments.as_slice() {
            [] => Response::new(200).with_json(&json!({ "couchdb": "Welcome" })),
            [db] => self.database(request.method, db),
            [db, "_design", ddoc, "_view", view] => self.view(request, db, ddoc, view),
            [db, prefix @ ("_design" | "_local"), name] => {
                self.handle_document(request, db, &format!("{prefix}/{name}"))
            }
            [db, id] => self.handle_document(request, db, id),
            _ => not_found("missing"),
        }
    }

    fn database(&self, method: Method, name: &str) -> Response {
        match method {
            Method::Put => {
                let mut databases = self.0.write();
                if databases.contains_key(name) {
                    return Response::new(412).with_json(&json!({
                        "error": "file_exists",
                        "reason": "The database could not be created, the file already exists."
                    }));
                }

                databases.insert(name.to_owned(), Database::new());
                Response::new(201).with_json(&json!({ "ok": true }))
            }
            Method::Delete => match self.0.write().remove(name) {
                Some(_) => Response::new(200).with_json(&json!({ "ok": true })),
                None => not_found("Database does not exist."),
            },
            Method::Get | Method::Head => match self.0.read().get(name) {
                Some(db) => Response::new(200).with_json(&json!({
                    "db_name": name,
                    "doc_count": db.len(),
                })),
                None => not_found("Database does not exist."),
            },
        }
    }

    fn handle_document(&self, request: &Request, db: &str, id: &str) -> Response {
        match request.method {
            Method::Get | Method::Head => {
                let databases = self.0.read();
                let Some(database) = databases.get(db) else {
                    return not_found("Database does not exist.");
                };

                match (request.method, database.get(id)) {
                    (Method::Head, Some(doc)) => {
                        Response::new(200).with_header("ETag", format!("\"{}\"", doc.revision))
                    }
                    (_, Some(doc)) => Response::new(200)
                        .with_header("ETag", format!("\"{}\"", doc.revision))
                        .with_json(&doc.body),
                    (Method::Head, None) => Response::new(404),
                    (_, None) => not_found("missing"),
                }
            }
            Method::Put => self.put(request, db, id),
            Method::Delete => {
                let mut databases = self.0.write();
                let Some(database) = databases.get_mut(db) else {
                    return not_found("Database does not exist.");
                };

                let Some(existing) = database.get(id) else {
                    return not_found("missing");
                };

                if request.query_value("rev") != Some(existing.revision.as_str()) {
                    return conflict();
                }

                let revision = next_revision(existing.generation + 1);
                database.remove(id);

                Response::new(200).with_json(&json!({ "ok": true, "id": id, "rev": revision }))
            }
        }
    }

    fn put(&self, request: &Request, db: &str, id: &str) -> Response {
        let Some(mut body) = request.body.clone().filter(Value::is_object) else {
            return Response::new(400).with_json(&json!({
                "error": "bad_request",
                "reason": "Document must be a JSON object"
            }));
        };

        let mut databases = self.0.write();
        let Some(database) = databases.get_mut(db) else {
            return not_found("Database does not exist.");
        };

        let provided = body
            .get("_rev")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| request.query_value("rev").map(str::to_owned));

        let generation = match (database.get(id), provided) {
            (None, None) => 1,
            (Some(existing), Some(rev)) if existing.revision == rev => existing.generation + 1,
            _ => return conflict(),
        };

        let revision = next_revision(generation);

        if let Some(object) = body.as_object_mut() {
            object.insert("_id".to_owned(), Value::String(id.to_owned()));
            object.insert("_rev".to_owned(), Value::String(revision.clone()));
        }

        database.insert(
            id.to_owned(),
            StoredDocument {
                generation,
                revision: revision.clone(),
                body,
            },
        );

        Response::new(201).with_json(&json!({ "ok": true, "id": id, "rev": revision }))
    }

    fn view(&self, request: &Request, db: &str, ddoc: &str, view: &str) -> Response {
        let databases = self.0.read();
        let Some(database) = databases.get(db) else {
            return not_found("Database does not exist.");
        };

        let declared = database
            .get(&format!("_design/{ddoc}"))
            .and_then(|design| design.body.get("views"))
            .and_then(|views| views.get(view))
            .is_some();

        if !declared {
            return not_found("missing_named_view");
        }

        let mut rows = database
            .iter()
            .filter(|(id, _)| !id.starts_with("_design/") && !id.starts_with("_local/"))
            .filter_map(|(id, doc)| {
                let stream_id = doc.body.get("streamId")?.as_str()?;
                let sequence = doc.body.get("sequence").filter(|v| v.is_number())?;
                Some((json!([stream_id, sequence]), id, doc))
            })
            .collect::<Vec<_>>();

        let total_rows = rows.len();
        rows.sort_by(|a, b| collate(&a.0, &b.0).then_with(|| a.1.cmp(b.1)));

        let descending = request.query_value("descending") == Some("true");
        if descending {
            rows.reverse();
        }

        let (startkey, endkey) = match (
            parse_key(request.query_value("startkey")),
            parse_key(request.query_value("endkey")),
        ) {
            (Ok(startkey), Ok(endkey)) => (startkey, endkey),
            _ => {
                return Response::new(400).with_json(&json!({
                    "error": "bad_request",
                    "reason": "invalid key"
                }))
            }
        };

        let inverted = match (&startkey, &endkey) {
            (Some(startkey), Some(endkey)) => {
                let order = collate(startkey, endkey);
                (descending && order == Ordering::Less) || (!descending && order == Ordering::Greater)
            }
            _ => false,
        };

        if inverted {
            return Response::new(400).with_json(&json!({
                "error": "query_parse_error",
                "reason": "No rows can match your key range, reverse your start_key and end_key or set descending=false"
            }));
        }

        let limit = request
            .query_value("limit")
            .and_then(|limit| limit.parse::<usize>().ok())
            .unwrap_or(usize::MAX);

        let include_docs = request.query_value("include_docs") == Some("true");

        let in_range = |key: &Value| {
            let (low, high) = if descending {
                (endkey.as_ref(), startkey.as_ref())
            } else {
                (startkey.as_ref(), endkey.as_ref())
            };

            low.map(|low| collate(key, low) != Ordering::Less)
                .unwrap_or(true)
                && high
                    .map(|high| collate(key, high) != Ordering::Greater)
                    .unwrap_or(true)
        };

        let rows = rows
            .into_iter()
            .filter(|(key, _, _)| in_range(key))
            .take(limit)
            .map(|(key, id, doc)| {
                let mut row = json!({ "id": id, "key": key, "value": null });
                if include_docs {
                    row["doc"] = doc.body.clone();
                }
                row
            })
            .collect::<Vec<_>>();

        Response::new(200).with_json(&json!({
            "total_rows": total_rows,
            "offset": 0,
            "rows": rows,
        }))
    }
}

impl Client for MemoryCouchDb {
    fn send(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.handle(&request))
    }
}

fn next_revision(generation: u64) -> String {
    format!("{generation}-{}", Uuid::new_v4().simple())
}

fn not_found(reason: &str) -> Response {
    Response::new(404).with_json(&json!({ "error": "not_found", "reason": reason }))
}

fn conflict() -> Response {
    Response::new(409).with_json(&json!({
        "error": "conflict",
        "reason": "Document update conflict."
    }))
}

fn parse_key(raw: Option<&str>) -> serde_json::Result<Option<Value>> {
    raw.map(serde_json::from_str).transpose()
}

/// CouchDB view collation: null < booleans < numbers < strings < arrays < objects.
fn collate(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| collate(l, r))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y.iter())
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| collate(lv, rv)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}
