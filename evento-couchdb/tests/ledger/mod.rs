use evento_couchdb::{
    CouchDbConnector, CouchDbMigration, CouchDbMigrationAdapter, CouchDbStorageAdapter, Error,
    MigrationRecord, StorageReason, StorageSettings,
};
use serde_json::json;

pub fn init(connector: &CouchDbConnector) -> anyhow::Result<CouchDbMigrationAdapter> {
    connector.create_database()?;

    Ok(CouchDbMigrationAdapter::new(connector.clone()))
}

fn versions(records: &[MigrationRecord]) -> Vec<u64> {
    records.iter().map(|r| r.version).collect()
}

pub fn test_read_missing_ledger(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let ledger = init(connector)?;

    assert!(ledger.read("projections")?.is_empty());

    Ok(())
}

pub fn test_write_empty_is_noop(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let ledger = init(connector)?;

    ledger.write("projections", vec![])?;

    assert!(ledger.read("projections")?.is_empty());
    assert_eq!(ledger.current_revision("projections")?, None);

    Ok(())
}

pub fn test_write_sorts_by_version(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let ledger = init(connector)?;

    ledger.write(
        "event_store",
        vec![
            MigrationRecord::new("CreateSnapshots", 3),
            MigrationRecord::new("CreateDatabase", 1),
            MigrationRecord::new("CreateCommitStreamView", 2),
        ],
    )?;

    let records = ledger.read("event_store")?;
    assert_eq!(versions(&records), vec![1, 2, 3]);
    assert_eq!(records[0].migration_type, "CreateDatabase");

    ledger.write(
        "event_store",
        vec![
            MigrationRecord::new("CreateDatabase", 1),
            MigrationRecord::new("CreateCommitStreamView", 2),
        ],
    )?;

    // full replacement, not a merge
    assert_eq!(versions(&ledger.read("event_store")?), vec![1, 2]);

    Ok(())
}

pub fn test_stale_revision_conflicts(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let ledger = init(connector)?;
    let first = MigrationRecord::new("CreateDatabase", 1);
    let second = MigrationRecord::new("CreateCommitStreamView", 2);
    let third = MigrationRecord::new("CreateSnapshots", 3);

    ledger.write("event_store", vec![first.clone()])?;
    let stale = ledger.current_revision("event_store")?;
    assert!(stale.is_some());

    ledger.write("event_store", vec![first.clone(), second.clone()])?;

    let err = ledger
        .write_with_revision(
            "event_store",
            vec![first.clone(), second.clone(), third.clone()],
            stale.as_ref(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Storage {
            ref identifier,
            reason: StorageReason::Conflict,
        } if identifier == "event_store"
    ));
    assert_eq!(versions(&ledger.read("event_store")?), vec![1, 2]);

    let fresh = ledger.current_revision("event_store")?;
    ledger.write_with_revision(
        "event_store",
        vec![third, second, first],
        fresh.as_ref(),
    )?;

    assert_eq!(versions(&ledger.read("event_store")?), vec![1, 2, 3]);

    Ok(())
}

pub fn test_concurrent_creation_conflicts(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let ledger = init(connector)?;

    // both writers saw no ledger
    ledger.write_with_revision("projections", vec![MigrationRecord::new("A", 1)], None)?;
    let err = ledger
        .write_with_revision("projections", vec![MigrationRecord::new("B", 1)], None)
        .unwrap_err();

    assert!(matches!(err.reason(), Some(StorageReason::Conflict)));
    assert_eq!(ledger.read("projections")?[0].migration_type, "A");

    Ok(())
}

pub fn test_malformed_ledger(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let ledger = init(connector)?;
    let adapter = CouchDbStorageAdapter::new(connector.clone(), StorageSettings::default());

    adapter.append("broken", json!({ "target": "broken", "migrations": "nope" }))?;

    let err = ledger.read("broken").unwrap_err();
    assert!(matches!(
        err,
        Error::Storage {
            ref identifier,
            reason: StorageReason::SerdeJson(_),
        } if identifier == "broken"
    ));

    Ok(())
}
