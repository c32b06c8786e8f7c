//! CouchDB storage for evento commit streams and migration ledgers.
//!
//! This crate persists append-only commit streams and tracks executed
//! migrations using CouchDB as the only storage.
//!
//! # Features
//!
//! - **`http`** (default) - Blocking HTTP transport via [`UreqClient`](client::UreqClient)
//! - **`memory`** (default) - In-process [`MemoryCouchDb`](client::MemoryCouchDb) for tests
//!
//! # Data Model
//!
//! Every commit is its own immutable document with id `{streamId}-{sequence}`:
//!
//! ```json
//! {
//!   "_id": "order#42-3",
//!   "streamId": "order#42",
//!   "sequence": 3,
//!   "events": [{ "name": "shipped" }],
//!   "recordedAt": "2024-05-01T10:00:00Z"
//! }
//! ```
//!
//! Streams are reconstructed through a view keyed by `[streamId, sequence]`
//! (see [`commit_stream_views`](migration::commit_stream_views)). A migration
//! ledger is one document per target listing the executed migrations.
//!
//! # Concurrency
//!
//! Writes rely on CouchDB revisions only. Creating a commit document that
//! already exists, or replacing a document with a stale revision, is a
//! conflict. There is no multi-document transaction: an append that conflicts
//! midway keeps the commits it already wrote, and retrying it is safe because
//! document ids are deterministic.
//!
//! # Example
//!
//! ```rust,ignore
//! use evento_couchdb::{
//!     ConnectionSettings, CouchDbConnector, CouchDbStorageAdapter, CouchDbStreamStorage,
//!     Sequence, StorageSettings, Stream,
//! };
//!
//! let connector = CouchDbConnector::connect(
//!     ConnectionSettings::builder("events").credentials("admin", "secret").build(),
//! );
//! let storage = CouchDbStreamStorage::new(CouchDbStorageAdapter::new(
//!     connector,
//!     StorageSettings::default(),
//! ));
//!
//! let stream = storage.load("order#42", None, None)?;
//! let known_head = stream.head_sequence();
//! let stream = stream.with_commit(vec![serde_json::json!({ "name": "shipped" })]);
//!
//! if !storage.append(&stream, known_head)?.is_success() {
//!     // reload, recompute, retry
//! }
//! ```

#![forbid(unsafe_code)]

pub mod client;
pub mod migration;
pub mod storage;

mod commit;
mod config;
mod connector;
mod error;

pub use commit::*;
pub use config::*;
pub use connector::*;
pub use error::*;
pub use migration::{CouchDbMigration, CouchDbMigrationAdapter, MigrationRecord};
pub use storage::{CouchDbStorageAdapter, CouchDbStreamStorage, Revision, StorageResult};
