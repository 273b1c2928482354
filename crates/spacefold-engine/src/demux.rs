//! The item demuxer: ordering and admission core.
//!
//! One demuxer drives one item manager. Given N feeds (1 local + M
//! remote) it produces a single deterministic, causally consistent stream
//! of accepted mutation batches:
//!
//! - a cursor per feed plus a running [`Timeframe`] dedupe marker;
//! - strict seq order within a feed, round-robin interleave across feeds;
//! - credential entries are routed to the credential authority as they
//!   are consumed, so admissions take effect before later mutations;
//! - the writer identity of a batch is its feed's key. A batch from a
//!   non-admitted writer is dropped and the timeframe advances anyway —
//!   the slot is never retried, even if the admitting credential arrives
//!   later. Clients are expected to resubmit under a new seq; the demuxer
//!   records such writers in [`DemuxStats::rejected_writers`] so the race
//!   is visible to operators.
//! - the timeframe advances only after every mutation in a batch has been
//!   forwarded, so a crash mid-batch redelivers the whole batch
//!   (at-least-once; the timeframe check makes redelivery a no-op).
//!
//! Cancellation is cooperative and lands between batches, never inside
//! one. Transient storage read errors back off and retry; they are not
//! pipeline-fatal.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use spacefold_auth::{Credential, CredentialAuthority, Processed};
use spacefold_core::{EntryKind, FeedEntry, FeedKey, MutationBatch, Timeframe};
use spacefold_feed::FeedStorage;

use crate::error::Result;
use crate::manager::{Applied, ItemManager};

/// Tuning knobs for the consumer loop.
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// Max entries pulled from one feed per round.
    pub read_batch: u64,
    /// Fallback poll interval when idle and no wake arrives.
    pub poll_interval: Duration,
    /// First retry delay after a transient storage error.
    pub backoff_base: Duration,
    /// Retry delay ceiling.
    pub backoff_max: Duration,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            read_batch: 64,
            poll_interval: Duration::from_millis(250),
            backoff_base: Duration::from_millis(50),
            backoff_max: Duration::from_secs(5),
        }
    }
}

/// Observability counters for one demuxer.
///
/// Rejections are counted, not raised: per-record failures are an
/// observability concern by design.
#[derive(Debug, Clone, Default)]
pub struct DemuxStats {
    /// Batches forwarded to the item manager.
    pub batches_applied: u64,
    /// Batches dropped because their writer was not admitted.
    pub batches_rejected: u64,
    /// Individual mutations applied.
    pub mutations_applied: u64,
    /// Individual mutations rejected by the item manager.
    pub mutations_rejected: u64,
    /// Credentials handed to the authority.
    pub credentials_processed: u64,
    /// Credentials held by the authority for a missing chain link.
    pub credentials_deferred: u64,
    /// Entries skipped because the timeframe already covered them.
    pub duplicates_skipped: u64,
    /// Entries whose payload failed to decode or verify.
    pub corrupt_skipped: u64,
    /// Entries of unknown kind, skipped for forward compatibility.
    pub unknown_skipped: u64,
    /// Writers that had batches dropped while unadmitted. A writer here
    /// that is admitted now hit the known write-before-admission race.
    pub rejected_writers: HashSet<FeedKey>,
}

/// Merges per-feed entries into one admitted, ordered mutation stream.
pub struct ItemDemuxer<S: FeedStorage> {
    storage: Arc<S>,
    feeds: Arc<Mutex<Vec<FeedKey>>>,
    authority: Arc<Mutex<CredentialAuthority>>,
    manager: Arc<RwLock<ItemManager>>,
    timeframe: Timeframe,
    stats: Arc<Mutex<DemuxStats>>,
    config: DemuxConfig,
    shutdown: watch::Receiver<bool>,
    wake: Arc<Notify>,
    consecutive_errors: u32,
}

impl<S: FeedStorage> ItemDemuxer<S> {
    /// Create a demuxer over a storage backend.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<S>,
        feeds: Arc<Mutex<Vec<FeedKey>>>,
        authority: Arc<Mutex<CredentialAuthority>>,
        manager: Arc<RwLock<ItemManager>>,
        stats: Arc<Mutex<DemuxStats>>,
        config: DemuxConfig,
        shutdown: watch::Receiver<bool>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            storage,
            feeds,
            authority,
            manager,
            timeframe: Timeframe::new(),
            stats,
            config,
            shutdown,
            wake,
            consecutive_errors: 0,
        }
    }

    /// The running timeframe (highest consumed seq per feed).
    pub fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    /// Drive the consumer loop until cancelled.
    ///
    /// Returns the final timeframe so callers can log or persist how far
    /// consumption got.
    pub async fn run(mut self) -> Timeframe {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.pump_round().await {
                Ok(true) => {
                    self.consecutive_errors = 0;
                }
                Ok(false) => {
                    self.consecutive_errors = 0;
                    let wake = Arc::clone(&self.wake);
                    tokio::select! {
                        _ = wake.notified() => {}
                        _ = self.shutdown.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    let delay = backoff_delay(
                        self.config.backoff_base,
                        self.config.backoff_max,
                        self.consecutive_errors,
                    );
                    warn!(error = %e, ?delay, "storage error in consumer loop, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
            }
        }

        info!(timeframe = %self.timeframe, "consumer loop stopped");
        self.timeframe
    }

    /// One round-robin pass over all feeds. Returns whether any entry was
    /// consumed.
    async fn pump_round(&mut self) -> Result<bool> {
        let feeds: Vec<FeedKey> = self.feeds.lock().expect("feeds lock poisoned").clone();
        let mut progressed = false;

        for feed in feeds {
            if *self.shutdown.borrow() {
                break;
            }

            let next = self.timeframe.next_seq(&feed);
            let entries = self
                .storage
                .entries_range(&feed, next, next + self.config.read_batch)
                .await?;

            let mut expected = next;
            for entry in entries {
                if entry.seq() < expected {
                    continue;
                }
                if entry.seq() > expected {
                    // Gap: the missing entry has not replicated yet.
                    // Within a feed, strict seq order is non-negotiable.
                    break;
                }

                self.process_entry(&feed, &entry);
                expected += 1;
                progressed = true;

                // Cooperative cancellation lands between batches only.
                if *self.shutdown.borrow() {
                    return Ok(progressed);
                }
            }
        }

        Ok(progressed)
    }

    /// Consume one entry and advance the timeframe past it.
    fn process_entry(&mut self, feed: &FeedKey, entry: &FeedEntry) {
        let seq = entry.seq();

        if self.timeframe.includes(feed, seq) {
            // Redelivery of a consumed slot: no observable effect.
            self.stats.lock().expect("stats lock poisoned").duplicates_skipped += 1;
            return;
        }

        match entry.kind() {
            EntryKind::Credential => self.handle_credential(feed, entry),
            EntryKind::Mutation => self.handle_mutation(feed, entry),
            EntryKind::Unknown(tag) => {
                debug!(feed = %feed, seq, tag, "skipping entry of unknown kind");
                self.stats.lock().expect("stats lock poisoned").unknown_skipped += 1;
            }
        }

        // The slot is consumed in every path above, including rejections:
        // a dropped batch is not retried.
        self.timeframe.advance(*feed, seq);
    }

    fn handle_credential(&mut self, feed: &FeedKey, entry: &FeedEntry) {
        let credential = match Credential::from_bytes(&entry.payload) {
            Ok(c) => c,
            Err(e) => {
                warn!(feed = %feed, seq = entry.seq(), error = %e, "dropping undecodable credential");
                self.stats.lock().expect("stats lock poisoned").corrupt_skipped += 1;
                return;
            }
        };

        let outcome = self
            .authority
            .lock()
            .expect("authority lock poisoned")
            .process(&credential);

        let mut stats = self.stats.lock().expect("stats lock poisoned");
        match outcome {
            Ok(Processed::Deferred) => {
                stats.credentials_processed += 1;
                stats.credentials_deferred += 1;
            }
            Ok(_) => {
                stats.credentials_processed += 1;
            }
            Err(e) => {
                warn!(feed = %feed, seq = entry.seq(), error = %e, "dropping invalid credential");
                stats.corrupt_skipped += 1;
            }
        }
    }

    fn handle_mutation(&mut self, feed: &FeedKey, entry: &FeedEntry) {
        // The writer identity of a batch is its feed's key.
        let writer = *entry.feed_key();

        let batch = match MutationBatch::from_bytes(&entry.payload) {
            Ok(b) => b,
            Err(e) => {
                warn!(feed = %feed, seq = entry.seq(), error = %e, "dropping undecodable batch");
                self.stats.lock().expect("stats lock poisoned").corrupt_skipped += 1;
                return;
            }
        };

        let admitted = self
            .authority
            .lock()
            .expect("authority lock poisoned")
            .is_admitted(&writer);

        if !admitted {
            warn!(
                feed = %feed,
                seq = entry.seq(),
                writer = %writer,
                "dropping batch from non-admitted writer"
            );
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.batches_rejected += 1;
            stats.rejected_writers.insert(writer);
            return;
        }

        // Forward every mutation in order; the manager serializes state
        // transitions behind its write lock (one apply in flight).
        let source = (*feed, entry.seq());
        let mut applied = 0u64;
        let mut rejected = 0u64;
        {
            let mut manager = self.manager.write().expect("manager lock poisoned");
            for mutation in &batch.objects {
                match manager.apply(source, mutation) {
                    Applied::Rejected(_) => rejected += 1,
                    _ => applied += 1,
                }
            }
        }

        let mut stats = self.stats.lock().expect("stats lock poisoned");
        stats.batches_applied += 1;
        stats.mutations_applied += applied;
        stats.mutations_rejected += rejected;
    }
}

/// Capped exponential backoff delay for the nth consecutive error.
fn backoff_delay(base: Duration, max: Duration, errors: u32) -> Duration {
    let shift = errors.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{encode_payload, ModelRegistry};
    use ciborium::value::Value;
    use spacefold_auth::AssertionKind;
    use spacefold_core::{
        canonical_entry_bytes, EntryBuilder, Keypair, ObjectId, SpaceId,
    };
    use spacefold_feed::MemoryFeedStorage;

    struct Rig {
        storage: Arc<MemoryFeedStorage>,
        feeds: Arc<Mutex<Vec<FeedKey>>>,
        authority: Arc<Mutex<CredentialAuthority>>,
        manager: Arc<RwLock<ItemManager>>,
        stats: Arc<Mutex<DemuxStats>>,
        shutdown_tx: watch::Sender<bool>,
        wake: Arc<Notify>,
        space_id: SpaceId,
        identity: Keypair,
    }

    impl Rig {
        fn new() -> Self {
            let identity = Keypair::from_seed(&[0xAA; 32]);
            let space_id = SpaceId::derive(&identity.public_key(), "test");
            let authority = CredentialAuthority::new(
                space_id,
                identity.public_key(),
                identity.public_key(),
            );
            let (shutdown_tx, _) = watch::channel(false);

            Self {
                storage: Arc::new(MemoryFeedStorage::new()),
                feeds: Arc::new(Mutex::new(vec![identity.public_key()])),
                authority: Arc::new(Mutex::new(authority)),
                manager: Arc::new(RwLock::new(ItemManager::new(Arc::new(
                    ModelRegistry::with_defaults(),
                )))),
                stats: Arc::new(Mutex::new(DemuxStats::default())),
                shutdown_tx,
                wake: Arc::new(Notify::new()),
                space_id,
                identity,
            }
        }

        fn demuxer(&self) -> ItemDemuxer<MemoryFeedStorage> {
            ItemDemuxer::new(
                Arc::clone(&self.storage),
                Arc::clone(&self.feeds),
                Arc::clone(&self.authority),
                Arc::clone(&self.manager),
                Arc::clone(&self.stats),
                DemuxConfig::default(),
                self.shutdown_tx.subscribe(),
                Arc::clone(&self.wake),
            )
        }

        fn add_feed(&self, key: FeedKey) {
            self.feeds.lock().unwrap().push(key);
        }

        async fn store_mutation(&self, writer: &Keypair, seq: u64, batch: &MutationBatch) {
            let entry = EntryBuilder::new(writer.public_key(), self.space_id, seq)
                .timestamp(1_000 + seq as i64)
                .kind(EntryKind::Mutation)
                .payload(batch.to_bytes())
                .sign(writer);
            self.storage
                .append_entry(&entry, &canonical_entry_bytes(&entry))
                .await
                .unwrap();
        }

        async fn store_credential(&self, writer: &Keypair, seq: u64, credential: &Credential) {
            let entry = EntryBuilder::new(writer.public_key(), self.space_id, seq)
                .timestamp(1_000 + seq as i64)
                .kind(EntryKind::Credential)
                .payload(credential.to_bytes())
                .sign(writer);
            self.storage
                .append_entry(&entry, &canonical_entry_bytes(&entry))
                .await
                .unwrap();
        }
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_local_batches_materialize_in_seq_order() {
        let rig = Rig::new();
        let id = ObjectId::from_bytes([1; 32]);

        rig.store_mutation(
            &rig.identity,
            0,
            &MutationBatch::genesis(id, "register", encode_payload(&text("a"))),
        )
        .await;
        rig.store_mutation(
            &rig.identity,
            1,
            &MutationBatch::update(id, encode_payload(&text("b"))),
        )
        .await;

        let mut demux = rig.demuxer();
        assert!(demux.pump_round().await.unwrap());

        let manager = rig.manager.read().unwrap();
        assert_eq!(manager.get(&id).unwrap().state, text("b"));
        assert_eq!(demux.timeframe().get(&rig.identity.public_key()), Some(1));
    }

    #[tokio::test]
    async fn test_non_admitted_writer_dropped_and_slot_consumed() {
        let rig = Rig::new();
        let stranger = Keypair::from_seed(&[0xBB; 32]);
        rig.add_feed(stranger.public_key());

        let id = ObjectId::from_bytes([2; 32]);
        rig.store_mutation(
            &stranger,
            0,
            &MutationBatch::genesis(id, "register", encode_payload(&text("x"))),
        )
        .await;

        let mut demux = rig.demuxer();
        demux.pump_round().await.unwrap();

        // Graph unchanged, slot consumed, writer recorded
        assert!(rig.manager.read().unwrap().is_empty());
        assert_eq!(demux.timeframe().get(&stranger.public_key()), Some(0));
        let stats = rig.stats.lock().unwrap();
        assert_eq!(stats.batches_rejected, 1);
        assert!(stats.rejected_writers.contains(&stranger.public_key()));
    }

    #[tokio::test]
    async fn test_late_admission_does_not_retry_consumed_slot() {
        let rig = Rig::new();
        let stranger = Keypair::from_seed(&[0xBB; 32]);
        rig.add_feed(stranger.public_key());

        let id = ObjectId::from_bytes([3; 32]);
        let batch = MutationBatch::genesis(id, "register", encode_payload(&text("x")));
        rig.store_mutation(&stranger, 0, &batch).await;

        let mut demux = rig.demuxer();
        demux.pump_round().await.unwrap();
        assert!(rig.manager.read().unwrap().is_empty());

        // Admitting credential arrives afterwards
        let cred = Credential::issue(
            &rig.identity,
            stranger.public_key(),
            AssertionKind::AuthorizedDevice,
        );
        rig.store_credential(&rig.identity, 0, &cred).await;
        demux.pump_round().await.unwrap();

        // The dropped slot is not retried...
        assert!(rig.manager.read().unwrap().is_empty());

        // ...but an explicit resubmission under a new seq applies cleanly.
        rig.store_mutation(&stranger, 1, &batch).await;
        demux.pump_round().await.unwrap();
        assert!(rig.manager.read().unwrap().get(&id).is_some());
    }

    #[tokio::test]
    async fn test_credential_entries_drive_authority() {
        let rig = Rig::new();
        let device = Keypair::from_seed(&[0xCC; 32]);

        let cred = Credential::issue(
            &rig.identity,
            device.public_key(),
            AssertionKind::AuthorizedDevice,
        );
        rig.store_credential(&rig.identity, 0, &cred).await;

        let mut demux = rig.demuxer();
        demux.pump_round().await.unwrap();

        assert!(rig
            .authority
            .lock()
            .unwrap()
            .is_admitted(&device.public_key()));
        assert_eq!(rig.stats.lock().unwrap().credentials_processed, 1);
    }

    #[tokio::test]
    async fn test_gap_blocks_feed_until_filled() {
        let rig = Rig::new();
        let id0 = ObjectId::from_bytes([4; 32]);
        let id2 = ObjectId::from_bytes([5; 32]);

        rig.store_mutation(
            &rig.identity,
            0,
            &MutationBatch::genesis(id0, "register", encode_payload(&text("a"))),
        )
        .await;
        // seq 1 missing; seq 2 present
        rig.store_mutation(
            &rig.identity,
            2,
            &MutationBatch::genesis(id2, "register", encode_payload(&text("c"))),
        )
        .await;

        let mut demux = rig.demuxer();
        demux.pump_round().await.unwrap();

        // Only seq 0 consumed
        assert_eq!(demux.timeframe().get(&rig.identity.public_key()), Some(0));
        assert!(rig.manager.read().unwrap().get(&id2).is_none());

        // Fill the gap; the feed drains in order
        let id1 = ObjectId::from_bytes([6; 32]);
        rig.store_mutation(
            &rig.identity,
            1,
            &MutationBatch::genesis(id1, "register", encode_payload(&text("b"))),
        )
        .await;
        demux.pump_round().await.unwrap();

        assert_eq!(demux.timeframe().get(&rig.identity.public_key()), Some(2));
        assert!(rig.manager.read().unwrap().get(&id1).is_some());
        assert!(rig.manager.read().unwrap().get(&id2).is_some());
    }

    #[tokio::test]
    async fn test_corrupt_batch_skipped_not_fatal() {
        let rig = Rig::new();

        let entry = EntryBuilder::new(rig.identity.public_key(), rig.space_id, 0)
            .timestamp(1)
            .kind(EntryKind::Mutation)
            .payload(b"garbage".to_vec())
            .sign(&rig.identity);
        rig.storage
            .append_entry(&entry, &canonical_entry_bytes(&entry))
            .await
            .unwrap();

        let id = ObjectId::from_bytes([7; 32]);
        rig.store_mutation(
            &rig.identity,
            1,
            &MutationBatch::genesis(id, "register", encode_payload(&text("ok"))),
        )
        .await;

        let mut demux = rig.demuxer();
        demux.pump_round().await.unwrap();

        // The bad record was consumed and the feed kept flowing
        assert_eq!(rig.stats.lock().unwrap().corrupt_skipped, 1);
        assert!(rig.manager.read().unwrap().get(&id).is_some());
    }

    #[tokio::test]
    async fn test_unknown_kind_skipped() {
        let rig = Rig::new();

        let entry = EntryBuilder::new(rig.identity.public_key(), rig.space_id, 0)
            .timestamp(1)
            .kind(EntryKind::Unknown(0x7777))
            .payload(b"future".to_vec())
            .sign(&rig.identity);
        rig.storage
            .append_entry(&entry, &canonical_entry_bytes(&entry))
            .await
            .unwrap();

        let mut demux = rig.demuxer();
        demux.pump_round().await.unwrap();

        assert_eq!(rig.stats.lock().unwrap().unknown_skipped, 1);
        assert_eq!(demux.timeframe().get(&rig.identity.public_key()), Some(0));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let rig = Rig::new();
        let demux = rig.demuxer();

        let handle = tokio::spawn(demux.run());
        rig.shutdown_tx.send(true).unwrap();

        let timeframe = handle.await.unwrap();
        assert!(timeframe.is_empty());
    }

    #[test]
    fn test_backoff_is_capped() {
        let base = Duration::from_millis(50);
        let max = Duration::from_secs(5);

        assert_eq!(backoff_delay(base, max, 1), Duration::from_millis(50));
        assert_eq!(backoff_delay(base, max, 2), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, max, 3), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, max, 30), max);
    }
}
