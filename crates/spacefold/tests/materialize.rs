//! End-to-end pipeline tests: feeds in, materialized object graph out.

use std::time::Duration;

use ciborium::value::Value;

use spacefold::core::{MutationBatch, ObjectId};
use spacefold::engine::{record_payload, ModelRegistry};
use spacefold::feed::{IngestOutcome, MemoryFeedStorage};
use spacefold::{Space, SpaceConfig, SpaceError};
use spacefold_testkit::fixtures::TestWriter;

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn field(item: &spacefold::Item, name: &str) -> Option<Value> {
    match &item.state {
        Value::Map(entries) => entries
            .iter()
            .find(|(k, _)| *k == text(name))
            .map(|(_, v)| v.clone()),
        _ => None,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn open_space(founder: &TestWriter) -> Space<MemoryFeedStorage> {
    init_tracing();
    Space::open_memory(
        founder.keypair.clone(),
        TestWriter::SPACE_NAME,
        ModelRegistry::with_defaults(),
        SpaceConfig::default(),
    )
    .await
    .unwrap()
}

/// Poll a condition until it holds or a generous deadline passes.
async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn genesis_then_update_materializes() {
    let founder = TestWriter::founder_with_seed([0x01; 32]);
    let space = open_space(&founder).await;

    let id = space
        .create_object("record", record_payload([("title", text("x"))]))
        .await
        .unwrap();
    space
        .update_object(id, record_payload([("title", text("y"))]))
        .await
        .unwrap();

    let item = tokio::time::timeout(
        Duration::from_secs(5),
        space.wait_for_item(id, |item| field(item, "title") == Some(text("y"))),
    )
    .await
    .expect("item should materialize")
    .unwrap();

    assert_eq!(field(&item, "title"), Some(text("y")));
    assert!(item.is_live());

    space.close().await.unwrap();
}

#[tokio::test]
async fn wait_for_resolves_immediately_when_already_true() {
    let founder = TestWriter::founder_with_seed([0x02; 32]);
    let space = open_space(&founder).await;

    let id = space
        .create_object("register", spacefold::engine::encode_payload(&text("v")))
        .await
        .unwrap();
    space.wait_for_item(id, |_| true).await.unwrap();

    // The item exists; no further event will fire. Must still resolve.
    let item = tokio::time::timeout(
        Duration::from_millis(500),
        space.wait_for_item(id, |item| item.is_live()),
    )
    .await
    .expect("already-true predicate must resolve without a new event")
    .unwrap();
    assert_eq!(item.id, id);

    space.close().await.unwrap();
}

#[tokio::test]
async fn unadmitted_writer_is_dropped_then_resubmission_applies() {
    let founder = TestWriter::founder_with_seed([0x03; 32]);
    let writer = TestWriter::join(founder.space_id, [0x33; 32]);
    let space = open_space(&founder).await;

    let id = ObjectId::from_bytes([0x10; 32]);
    let batch = MutationBatch::genesis(
        id,
        "record",
        record_payload([("title", text("early"))]),
    );

    // Batch arrives before any credential admits the writer
    let entry = writer.make_mutation(0, &batch);
    assert_eq!(space.ingest(&entry).await.unwrap(), IngestOutcome::Stored);

    eventually(|| space.stats().batches_rejected >= 1).await;
    assert!(space.item(&id).is_none(), "admission gate must hold");
    assert!(space
        .stats()
        .rejected_writers
        .contains(&writer.public_key()));

    // The admitting credential arrives afterwards
    space.authorize_device(writer.public_key()).await.unwrap();
    eventually(|| space.is_admitted(&writer.public_key())).await;

    // The consumed slot is not retried automatically
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(space.item(&id).is_none());

    // Explicit resubmission of the same batch under a new seq applies
    let resubmitted = writer.make_mutation(1, &batch);
    space.ingest(&resubmitted).await.unwrap();

    let item = tokio::time::timeout(
        Duration::from_secs(5),
        space.wait_for_item(id, |item| item.is_live()),
    )
    .await
    .expect("resubmitted batch should materialize")
    .unwrap();
    assert_eq!(field(&item, "title"), Some(text("early")));

    space.close().await.unwrap();
}

#[tokio::test]
async fn duplicate_genesis_keeps_first() {
    let founder = TestWriter::founder_with_seed([0x04; 32]);
    let space = open_space(&founder).await;

    let id = ObjectId::from_bytes([0x11; 32]);
    space
        .append_batch(&MutationBatch::genesis(
            id,
            "register",
            spacefold::engine::encode_payload(&text("first")),
        ))
        .await
        .unwrap();
    space
        .append_batch(&MutationBatch::genesis(
            id,
            "register",
            spacefold::engine::encode_payload(&text("second")),
        ))
        .await
        .unwrap();

    eventually(|| space.stats().mutations_rejected >= 1).await;

    let item = space.item(&id).unwrap();
    assert_eq!(item.state, text("first"));
    assert_eq!(space.items_where(|_| true).len(), 1);

    space.close().await.unwrap();
}

#[tokio::test]
async fn update_before_genesis_is_dropped() {
    let founder = TestWriter::founder_with_seed([0x05; 32]);
    let space = open_space(&founder).await;

    let orphan = ObjectId::from_bytes([0x12; 32]);
    space
        .update_object(orphan, record_payload([("k", text("v"))]))
        .await
        .unwrap();

    eventually(|| space.stats().mutations_rejected >= 1).await;
    assert!(space.item(&orphan).is_none());

    // The pipeline keeps flowing afterwards
    let id = space
        .create_object("record", record_payload([("k", text("v"))]))
        .await
        .unwrap();
    space.wait_for_item(id, |item| item.is_live()).await.unwrap();

    space.close().await.unwrap();
}

#[tokio::test]
async fn redelivered_entry_has_no_observable_effect() {
    let founder = TestWriter::founder_with_seed([0x06; 32]);
    let space = open_space(&founder).await;

    let id = space
        .create_object("record", record_payload([("n", text("1"))]))
        .await
        .unwrap();
    space.wait_for_item(id, |item| item.is_live()).await.unwrap();

    let before = space.items_where(|_| true);

    // Redeliver the already-consumed entry through the ingest boundary
    let entries = space
        .store()
        .read_range(&space.local_feed(), 0, 10)
        .await
        .unwrap();
    assert!(!entries.is_empty());
    for entry in &entries {
        assert_eq!(
            space.ingest(entry).await.unwrap(),
            IngestOutcome::Duplicate
        );
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(space.items_where(|_| true), before);

    space.close().await.unwrap();
}

#[tokio::test]
async fn per_feed_seq_order_is_preserved() {
    let founder = TestWriter::founder_with_seed([0x07; 32]);
    let space = open_space(&founder).await;

    let id = space
        .create_object("register", spacefold::engine::encode_payload(&text("v0")))
        .await
        .unwrap();
    for n in 1..=9 {
        space
            .update_object(
                id,
                spacefold::engine::encode_payload(&text(&format!("v{}", n))),
            )
            .await
            .unwrap();
    }

    let item = space
        .wait_for_item(id, |item| item.state == text("v9"))
        .await
        .unwrap();
    // Last write in feed order wins; nothing applied out of order.
    assert_eq!(item.state, text("v9"));

    space.close().await.unwrap();
}

#[tokio::test]
async fn delete_is_logical_and_state_retained() {
    let founder = TestWriter::founder_with_seed([0x08; 32]);
    let space = open_space(&founder).await;

    let id = space
        .create_object("record", record_payload([("title", text("keep me"))]))
        .await
        .unwrap();
    space.wait_for_item(id, |item| item.is_live()).await.unwrap();

    space.delete_object(id).await.unwrap();
    let item = space
        .wait_for_item(id, |item| item.deleted)
        .await
        .unwrap();

    assert!(item.deleted);
    assert_eq!(field(&item, "title"), Some(text("keep me")));

    space.close().await.unwrap();
}

#[tokio::test]
async fn replaying_accepted_entries_yields_identical_graph() {
    let founder = TestWriter::founder_with_seed([0x09; 32]);

    // First run: a handful of operations
    let space_a = open_space(&founder).await;
    let doc = space_a
        .create_object("record", record_payload([("title", text("doc"))]))
        .await
        .unwrap();
    let note = space_a
        .create_object("register", spacefold::engine::encode_payload(&text("n1")))
        .await
        .unwrap();
    space_a
        .update_object(doc, record_payload([("title", text("doc v2"))]))
        .await
        .unwrap();
    space_a
        .update_object(note, spacefold::engine::encode_payload(&text("n2")))
        .await
        .unwrap();
    space_a.delete_object(note).await.unwrap();

    space_a
        .wait_for_item(note, |item| item.deleted)
        .await
        .unwrap();
    space_a
        .wait_for_item(doc, |item| field(item, "title") == Some(text("doc v2")))
        .await
        .unwrap();

    let graph_a = space_a.items_where(|_| true);
    let entries = space_a
        .store()
        .read_range(&space_a.local_feed(), 0, 100)
        .await
        .unwrap();
    space_a.close().await.unwrap();

    // Fresh replica: replay the identical ordered entry sequence
    let space_b = open_space(&founder).await;
    for entry in &entries {
        space_b.ingest(entry).await.unwrap();
    }

    space_b
        .wait_for_item(doc, |item| field(item, "title") == Some(text("doc v2")))
        .await
        .unwrap();
    space_b
        .wait_for_item(note, |item| item.deleted)
        .await
        .unwrap();

    let graph_b = space_b.items_where(|_| true);
    assert_eq!(graph_a, graph_b);

    space_b.close().await.unwrap();
}

#[tokio::test]
async fn multi_writer_interleave_materializes_both_feeds() {
    let founder = TestWriter::founder_with_seed([0x0A; 32]);
    let writer = TestWriter::join(founder.space_id, [0x44; 32]);
    let space = open_space(&founder).await;

    space.authorize_device(writer.public_key()).await.unwrap();
    eventually(|| space.is_admitted(&writer.public_key())).await;

    let local_id = space
        .create_object("record", record_payload([("owner", text("founder"))]))
        .await
        .unwrap();

    let remote_id = ObjectId::from_bytes([0x20; 32]);
    let genesis = writer.make_mutation(
        0,
        &MutationBatch::genesis(
            remote_id,
            "record",
            record_payload([("owner", text("writer"))]),
        ),
    );
    let update = writer.make_mutation(
        1,
        &MutationBatch::update(remote_id, record_payload([("status", text("done"))])),
    );
    // Out-of-order delivery: seq 1 lands first and waits for seq 0
    space.ingest(&update).await.unwrap();
    space.ingest(&genesis).await.unwrap();

    space
        .wait_for_item(local_id, |item| item.is_live())
        .await
        .unwrap();
    let remote_item = space
        .wait_for_item(remote_id, |item| {
            field(item, "status") == Some(text("done"))
        })
        .await
        .unwrap();

    assert_eq!(field(&remote_item, "owner"), Some(text("writer")));
    assert_eq!(space.items_where(|item| item.is_live()).len(), 2);

    space.close().await.unwrap();
}

#[tokio::test]
async fn sqlite_space_rematerializes_after_restart() {
    init_tracing();
    let founder = TestWriter::founder_with_seed([0x0B; 32]);
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let space = Space::open(
            founder.keypair.clone(),
            TestWriter::SPACE_NAME,
            dir.path(),
            ModelRegistry::with_defaults(),
            SpaceConfig::default(),
        )
        .await
        .unwrap();

        let id = space
            .create_object("record", record_payload([("title", text("durable"))]))
            .await
            .unwrap();
        space.wait_for_item(id, |item| item.is_live()).await.unwrap();
        space.close().await.unwrap();
        id
    };

    // Same directory, fresh process state: the graph rebuilds from feeds
    let space = Space::open(
        founder.keypair.clone(),
        TestWriter::SPACE_NAME,
        dir.path(),
        ModelRegistry::with_defaults(),
        SpaceConfig::default(),
    )
    .await
    .unwrap();

    let item = tokio::time::timeout(
        Duration::from_secs(5),
        space.wait_for_item(id, |item| item.is_live()),
    )
    .await
    .expect("durable entries should rematerialize")
    .unwrap();
    assert_eq!(field(&item, "title"), Some(text("durable")));

    space.close().await.unwrap();
}

#[tokio::test]
async fn second_process_cannot_open_locked_space() {
    init_tracing();
    let founder = TestWriter::founder_with_seed([0x0C; 32]);
    let dir = tempfile::tempdir().unwrap();

    let space = Space::open(
        founder.keypair.clone(),
        TestWriter::SPACE_NAME,
        dir.path(),
        ModelRegistry::with_defaults(),
        SpaceConfig::default(),
    )
    .await
    .unwrap();

    let second = Space::open(
        founder.keypair.clone(),
        TestWriter::SPACE_NAME,
        dir.path(),
        ModelRegistry::with_defaults(),
        SpaceConfig::default(),
    )
    .await;

    assert!(matches!(
        second,
        Err(SpaceError::Feed(spacefold::feed::FeedError::Locked(_)))
    ));

    space.close().await.unwrap();
}

#[tokio::test]
async fn device_ready_resolves_for_founding_identity() {
    let founder = TestWriter::founder_with_seed([0x0D; 32]);
    let space = open_space(&founder).await;

    // The founding identity is its own genesis device.
    tokio::time::timeout(Duration::from_millis(500), space.device_ready())
        .await
        .expect("founding device must be ready immediately")
        .unwrap();

    space.close().await.unwrap();
}
