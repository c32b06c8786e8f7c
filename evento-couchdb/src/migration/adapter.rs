use serde::{Deserialize, Serialize};

use crate::{
    config::StorageSettings,
    connector::CouchDbConnector,
    error::{Error, Result, StorageReason},
    migration::MigrationRecord,
    storage::{CouchDbStorageAdapter, Revision},
};

#[derive(Serialize, Deserialize)]
struct LedgerDocument {
    target: String,
    migrations: Vec<MigrationRecord>,
}

/// Ledger of executed migrations, one document per target.
///
/// Writes replace the whole document and are guarded by its revision: when
/// two writers race on a target exactly one succeeds, the other gets a
/// storage error with [`StorageReason::Conflict`]. Nothing is retried here.
#[derive(Clone)]
pub struct CouchDbMigrationAdapter {
    storage: CouchDbStorageAdapter,
}

impl CouchDbMigrationAdapter {
    pub fn new(connector: CouchDbConnector) -> Self {
        Self {
            storage: CouchDbStorageAdapter::new(connector, StorageSettings::default()),
        }
    }

    pub fn connector(&self) -> &CouchDbConnector {
        self.storage.connector()
    }

    /// Executed migrations of `target`, sorted by version. Empty when the
    /// ledger does not exist yet.
    pub fn read(&self, target: &str) -> Result<Vec<MigrationRecord>> {
        let Some(doc) = self.storage.get(target)? else {
            return Ok(Vec::new());
        };

        let ledger = serde_json::from_value::<LedgerDocument>(doc)
            .map_err(|err| Error::storage(target, err))?;

        let mut migrations = ledger.migrations;
        migrations.sort();

        Ok(migrations)
    }

    /// Replaces the ledger of `target` with `migrations`.
    ///
    /// An empty list is a no-op and never creates a ledger.
    pub fn write(&self, target: &str, migrations: Vec<MigrationRecord>) -> Result<()> {
        if migrations.is_empty() {
            return Ok(());
        }

        let revision = self.current_revision(target)?;

        self.write_with_revision(target, migrations, revision.as_ref())
    }

    /// Same as [`write`](Self::write) with a caller-supplied revision.
    pub fn write_with_revision(
        &self,
        target: &str,
        mut migrations: Vec<MigrationRecord>,
        revision: Option<&Revision>,
    ) -> Result<()> {
        if migrations.is_empty() {
            return Ok(());
        }

        migrations.sort();

        let body = serde_json::to_value(LedgerDocument {
            target: target.to_owned(),
            migrations,
        })
        .map_err(|err| Error::storage(target, err))?;

        match self.storage.put(target, body, revision) {
            Ok(_) => Ok(()),
            Err(Error::DocumentConflict(_)) => {
                Err(Error::storage(target, StorageReason::Conflict))
            }
            Err(err) => Err(err),
        }
    }

    pub fn current_revision(&self, target: &str) -> Result<Option<Revision>> {
        self.storage.head_revision(target)
    }
}
