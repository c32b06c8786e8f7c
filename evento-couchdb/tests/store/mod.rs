use evento_couchdb::{
    Commit, CouchDbConnector, CouchDbMigration, CouchDbStorageAdapter, CouchDbStreamStorage,
    Error, Sequence, StorageReason, StorageResult, StorageSettings, Stream,
};
use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Display, FromStr, Debug, PartialEq)]
#[display(style = "kebab-case")]
pub enum OrderEvent {
    Placed,
    ItemAdded,
    Shipped,
    Cancelled,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct RecordedEvent {
    pub name: String,
    pub data: Value,
}

pub fn event(kind: OrderEvent, data: Value) -> Value {
    json!({ "name": kind.to_string(), "data": data })
}

pub fn init(connector: &CouchDbConnector) -> anyhow::Result<CouchDbStreamStorage> {
    init_with(connector, StorageSettings::default())
}

pub fn init_with(
    connector: &CouchDbConnector,
    settings: StorageSettings,
) -> anyhow::Result<CouchDbStreamStorage> {
    connector.create_database()?;
    connector.create_commit_stream_view(&settings)?;

    Ok(CouchDbStreamStorage::new(CouchDbStorageAdapter::new(
        connector.clone(),
        settings,
    )))
}

pub fn test_load_missing_stream(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let storage = init(connector)?;

    let stream = storage.load("order#missing", None, None)?;

    assert_eq!(stream.stream_id(), "order#missing");
    assert!(stream.commit_sequence().is_empty());
    assert_eq!(stream.head_sequence(), Sequence::initial());

    Ok(())
}

pub fn test_load_without_view(connector: &CouchDbConnector) -> anyhow::Result<()> {
    connector.create_database()?;
    let storage = CouchDbStreamStorage::new(CouchDbStorageAdapter::new(
        connector.clone(),
        StorageSettings::new("not_declared"),
    ));

    let stream = storage.load("order#1", None, None)?;

    assert!(stream.commit_sequence().is_empty());

    Ok(())
}

pub fn test_append_and_load(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let storage = init(connector)?;
    let payloads = [
        event(OrderEvent::Placed, json!({ "customer": "john.doe" })),
        event(OrderEvent::ItemAdded, json!({ "sku": "A-1", "qty": 2 })),
        event(OrderEvent::Shipped, json!({ "carrier": "ups" })),
    ];

    let mut stream = storage.load("order#1", None, None)?;
    for payload in payloads.iter() {
        let known_head = stream.head_sequence();
        stream = stream.with_commit(vec![payload.clone()]);

        assert_eq!(
            storage.append(&stream, known_head)?,
            StorageResult::Success
        );
    }

    // unrelated stream sharing the index
    let other = Stream::new("order#10").with_commit(vec![event(OrderEvent::Placed, json!({}))]);
    assert!(storage.append(&other, Sequence::initial())?.is_success());

    let loaded = storage.load("order#1", None, None)?;

    assert_eq!(loaded.commit_sequence().len(), 3);
    assert_eq!(loaded.head_sequence(), Sequence::new(3));
    assert_eq!(
        loaded
            .commit_sequence()
            .iter()
            .map(|c| c.sequence.value())
            .collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(loaded.commit_sequence(), stream.commit_sequence());

    let names = loaded
        .commit_sequence()
        .iter()
        .map(|c| c.to_events::<RecordedEvent>())
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .map(|e| e.name.parse::<OrderEvent>())
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        names,
        vec![OrderEvent::Placed, OrderEvent::ItemAdded, OrderEvent::Shipped]
    );

    let tail = storage.load("order#1", Some(Sequence::new(2)), None)?;
    assert_eq!(
        tail.commit_sequence()
            .iter()
            .map(|c| c.sequence.value())
            .collect::<Vec<_>>(),
        vec![2, 3]
    );

    let middle = storage.load("order#1", Some(Sequence::new(2)), Some(Sequence::new(2)))?;
    assert_eq!(middle.commit_sequence().len(), 1);
    assert_eq!(middle.head_sequence(), Sequence::new(2));

    Ok(())
}

pub fn test_append_existing_document_conflicts(
    connector: &CouchDbConnector,
) -> anyhow::Result<()> {
    let storage = init(connector)?;
    let adapter = storage.adapter();
    let first = Commit::new("s1", Sequence::new(1), vec![event(OrderEvent::Placed, json!(1))]);
    let second = Commit::new("s1", Sequence::new(1), vec![event(OrderEvent::Cancelled, json!(2))]);

    adapter.append("s1-1", serde_json::to_value(&first)?)?;

    let err = adapter
        .append("s1-1", serde_json::to_value(&second)?)
        .unwrap_err();
    assert!(matches!(err, Error::DocumentConflict(ref id) if id == "s1-1"));

    let stored = adapter.get("s1-1")?.expect("first commit is stored");
    assert_eq!(serde_json::from_value::<Commit>(stored)?, first);

    Ok(())
}

pub fn test_partial_append_keeps_written_commits(
    connector: &CouchDbConnector,
) -> anyhow::Result<()> {
    let storage = init(connector)?;
    let stream = Stream::new("order#4")
        .with_commit(vec![event(OrderEvent::Placed, json!({}))])
        .with_commit(vec![event(OrderEvent::ItemAdded, json!({ "sku": "A-1" }))])
        .with_commit(vec![event(OrderEvent::ItemAdded, json!({ "sku": "B-2" }))]);

    assert!(storage.append(&stream, Sequence::initial())?.is_success());

    let known_head = stream.head_sequence();
    let stream = stream
        .with_commit(vec![event(OrderEvent::ItemAdded, json!({ "sku": "C-3" }))])
        .with_commit(vec![event(OrderEvent::Shipped, json!({}))]);

    // a concurrent writer already owns sequence 5
    let rival = Commit::new(
        "order#4",
        Sequence::new(5),
        vec![event(OrderEvent::Cancelled, json!({}))],
    );
    storage.adapter().append(
        &CouchDbStreamStorage::commit_identifier("order#4", Sequence::new(5)),
        serde_json::to_value(&rival)?,
    )?;

    let result = storage.append(&stream, known_head)?;
    assert_eq!(
        result,
        StorageResult::Conflict {
            identifier: "order#4-5".to_owned(),
            sequence: Sequence::new(5),
        }
    );

    let loaded = storage.load("order#4", None, None)?;
    assert_eq!(loaded.head_sequence(), Sequence::new(5));
    assert_eq!(
        loaded.commit_sequence().get(Sequence::new(4)),
        stream.commit_sequence().get(Sequence::new(4))
    );
    assert_eq!(loaded.commit_sequence().get(Sequence::new(5)), Some(&rival));

    Ok(())
}

pub fn test_retry_is_idempotent(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let storage = init(connector)?;
    let stream = Stream::new("order#5")
        .with_commit(vec![event(OrderEvent::Placed, json!({}))])
        .with_commit(vec![event(OrderEvent::Shipped, json!({}))]);

    assert!(storage.append(&stream, Sequence::initial())?.is_success());

    // same delta again: already persisted commits are not conflicts
    assert!(storage.append(&stream, Sequence::initial())?.is_success());

    let loaded = storage.load("order#5", None, None)?;
    assert_eq!(loaded.commit_sequence(), stream.commit_sequence());

    // a different history for the same sequences is
    let diverged = Stream::new("order#5").with_commit(vec![event(OrderEvent::Cancelled, json!({}))]);
    assert_eq!(
        storage.append(&diverged, Sequence::initial())?,
        StorageResult::Conflict {
            identifier: "order#5-1".to_owned(),
            sequence: Sequence::new(1),
        }
    );

    Ok(())
}

pub fn test_append_without_delta(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let storage = init(connector)?;
    let stream = Stream::new("order#6").with_commit(vec![event(OrderEvent::Placed, json!({}))]);

    assert!(storage.append(&stream, stream.head_sequence())?.is_success());
    assert!(storage.append(&stream, Sequence::new(u64::MAX))?.is_success());
    assert!(storage.load("order#6", None, None)?.commit_sequence().is_empty());

    Ok(())
}

pub fn test_load_respects_page_limit(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let storage = init_with(connector, StorageSettings::default().limit(2))?;
    let stream = Stream::new("order#7")
        .with_commit(vec![event(OrderEvent::Placed, json!({}))])
        .with_commit(vec![event(OrderEvent::ItemAdded, json!({}))])
        .with_commit(vec![event(OrderEvent::Shipped, json!({}))]);

    assert!(storage.append(&stream, Sequence::initial())?.is_success());

    let loaded = storage.load("order#7", None, None)?;

    assert_eq!(
        loaded
            .commit_sequence()
            .iter()
            .map(|c| c.sequence.value())
            .collect::<Vec<_>>(),
        vec![2, 3]
    );

    Ok(())
}

pub fn test_load_exact_page_limit(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let storage = init_with(connector, StorageSettings::default().limit(2))?;
    let stream = Stream::new("order#8")
        .with_commit(vec![event(OrderEvent::Placed, json!({}))])
        .with_commit(vec![event(OrderEvent::Shipped, json!({}))]);

    assert!(storage.append(&stream, Sequence::initial())?.is_success());

    let loaded = storage.load("order#8", None, None)?;
    assert_eq!(loaded.commit_sequence(), stream.commit_sequence());

    Ok(())
}

pub fn test_load_inverted_range(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let storage = init(connector)?;
    let stream = Stream::new("order#9")
        .with_commit(vec![event(OrderEvent::Placed, json!({}))])
        .with_commit(vec![event(OrderEvent::Shipped, json!({}))]);

    assert!(storage.append(&stream, Sequence::initial())?.is_success());

    let loaded = storage.load("order#9", Some(Sequence::new(2)), Some(Sequence::new(1)))?;
    assert!(loaded.commit_sequence().is_empty());

    Ok(())
}

pub fn test_purge_is_not_implemented(connector: &CouchDbConnector) -> anyhow::Result<()> {
    let storage = init(connector)?;

    let err = storage.adapter().purge("order#1").unwrap_err();

    assert!(matches!(
        err,
        Error::Storage {
            ref identifier,
            reason: StorageReason::NotImplemented("purge"),
        } if identifier == "order#1"
    ));

    Ok(())
}
