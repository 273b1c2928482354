//! The Space: unified API over feeds, credentials, and materialization.
//!
//! A space is one replicated object graph. Opening a space assembles the
//! whole pipeline — feed store, credential authority, item manager — and
//! spawns the demuxer as its single consumer loop. Multiple spaces in one
//! process are fully independent pipelines; nothing is shared between
//! them.
//!
//! This process's keypair acts as both the space identity and the local
//! device: its feed is the one local writable feed, and the credentials
//! it issues admit further devices.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use spacefold_auth::{AssertionKind, Credential, CredentialAuthority};
use spacefold_core::{
    EntryKind, FeedEntry, FeedKey, Keypair, MutationBatch, ObjectId, SpaceId, Timeframe,
};
use spacefold_engine::{
    DemuxConfig, DemuxStats, Item, ItemDemuxer, ItemManager, ModelRegistry, ResultSet,
};
use spacefold_feed::{
    FeedStorage, FeedStore, IngestOutcome, MemoryFeedStorage, ProcessLock, SqliteFeedStorage,
};

use crate::error::{Result, SpaceError};

/// Configuration for a Space.
#[derive(Debug, Clone)]
pub struct SpaceConfig {
    /// Whether to verify signatures on replication-delivered entries.
    pub validate_on_ingest: bool,
    /// Consumer loop tuning.
    pub demux: DemuxConfig,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            validate_on_ingest: true,
            demux: DemuxConfig::default(),
        }
    }
}

/// One replicated space: a set of feeds materialized into an object graph.
pub struct Space<S: FeedStorage + 'static> {
    id: SpaceId,
    keypair: Keypair,
    config: SpaceConfig,
    store: Arc<FeedStore<S>>,
    authority: Arc<Mutex<CredentialAuthority>>,
    manager: Arc<RwLock<ItemManager>>,
    feeds: Arc<Mutex<Vec<FeedKey>>>,
    stats: Arc<Mutex<DemuxStats>>,
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    demux_task: JoinHandle<Timeframe>,
    _lock: Option<ProcessLock>,
}

impl Space<MemoryFeedStorage> {
    /// Open a space over in-memory storage (tests, ephemeral replicas).
    pub async fn open_memory(
        keypair: Keypair,
        name: &str,
        registry: ModelRegistry,
        config: SpaceConfig,
    ) -> Result<Self> {
        Self::assemble(MemoryFeedStorage::new(), keypair, name, registry, config, None).await
    }
}

impl Space<SqliteFeedStorage> {
    /// Open a space whose feeds live in a directory on disk.
    ///
    /// Acquires the directory's process lock first; another process
    /// holding it is a startup-fatal error, enforcing single-writer-
    /// per-key across processes.
    pub async fn open(
        keypair: Keypair,
        name: &str,
        dir: impl AsRef<Path>,
        registry: ModelRegistry,
        config: SpaceConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let lock = ProcessLock::acquire(dir)?;
        let storage = SqliteFeedStorage::open(dir.join("feeds.db"))?;
        Self::assemble(storage, keypair, name, registry, config, Some(lock)).await
    }
}

impl<S: FeedStorage + 'static> Space<S> {
    /// Wire up the pipeline and spawn the consumer loop.
    async fn assemble(
        storage: S,
        keypair: Keypair,
        name: &str,
        registry: ModelRegistry,
        config: SpaceConfig,
        lock: Option<ProcessLock>,
    ) -> Result<Self> {
        let id = SpaceId::derive(&keypair.public_key(), name);
        let store = Arc::new(FeedStore::new(storage, id));
        store.register_writer(&keypair).await?;

        // Resume with every feed already known to storage.
        let mut feed_keys: Vec<FeedKey> =
            store.list().await?.into_iter().map(|m| m.key).collect();
        if !feed_keys.contains(&keypair.public_key()) {
            feed_keys.push(keypair.public_key());
        }

        let authority = Arc::new(Mutex::new(CredentialAuthority::new(
            id,
            keypair.public_key(),
            keypair.public_key(),
        )));
        let manager = Arc::new(RwLock::new(ItemManager::new(Arc::new(registry))));
        let feeds = Arc::new(Mutex::new(feed_keys));
        let stats = Arc::new(Mutex::new(DemuxStats::default()));
        let wake = Arc::new(Notify::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let demux = ItemDemuxer::new(
            store.storage(),
            Arc::clone(&feeds),
            Arc::clone(&authority),
            Arc::clone(&manager),
            Arc::clone(&stats),
            config.demux.clone(),
            shutdown_rx,
            Arc::clone(&wake),
        );
        let demux_task = tokio::spawn(demux.run());

        debug!(space = %id, "space pipeline started");

        Ok(Self {
            id,
            keypair,
            config,
            store,
            authority,
            manager,
            feeds,
            stats,
            wake,
            shutdown,
            demux_task,
            _lock: lock,
        })
    }

    /// The space's identifier.
    pub fn id(&self) -> &SpaceId {
        &self.id
    }

    /// The local writer's key (this space instance's feed).
    pub fn local_feed(&self) -> FeedKey {
        self.keypair.public_key()
    }

    /// The feed store.
    pub fn store(&self) -> &FeedStore<S> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────
    // Local write path
    // ─────────────────────────────────────────────────────────────────────

    /// Append a mutation batch to the local feed. Returns the entry seq.
    ///
    /// Local mutations take the same path as remote ones: through the
    /// feed and the demuxer. There is exactly one way state changes.
    pub async fn append_batch(&self, batch: &MutationBatch) -> Result<u64> {
        let seq = self
            .store
            .append(
                &self.keypair.public_key(),
                EntryKind::Mutation,
                batch.to_bytes(),
            )
            .await?;
        self.wake.notify_one();
        Ok(seq)
    }

    /// Create a new object. Returns its freshly minted id.
    pub async fn create_object(
        &self,
        model_type: &str,
        payload: Vec<u8>,
    ) -> Result<ObjectId> {
        let id = ObjectId::random();
        self.append_batch(&MutationBatch::genesis(id, model_type, payload))
            .await?;
        Ok(id)
    }

    /// Append an update mutation for an object.
    pub async fn update_object(&self, id: ObjectId, payload: Vec<u8>) -> Result<u64> {
        self.append_batch(&MutationBatch::update(id, payload)).await
    }

    /// Append a delete mutation for an object.
    pub async fn delete_object(&self, id: ObjectId) -> Result<u64> {
        self.append_batch(&MutationBatch::delete(id)).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Credentials
    // ─────────────────────────────────────────────────────────────────────

    /// Issue and append a credential admitting a device key.
    pub async fn authorize_device(&self, device: FeedKey) -> Result<u64> {
        self.append_credential(AssertionKind::AuthorizedDevice, device)
            .await
    }

    /// Issue and append a credential revoking a device key.
    pub async fn revoke_device(&self, device: FeedKey) -> Result<u64> {
        self.append_credential(AssertionKind::RevokeDevice, device)
            .await
    }

    async fn append_credential(&self, kind: AssertionKind, subject: FeedKey) -> Result<u64> {
        let credential = Credential::issue(&self.keypair, subject, kind);
        let seq = self
            .store
            .append(
                &self.keypair.public_key(),
                EntryKind::Credential,
                credential.to_bytes(),
            )
            .await?;
        self.wake.notify_one();
        Ok(seq)
    }

    /// Whether a writer is currently admitted.
    pub fn is_admitted(&self, writer: &FeedKey) -> bool {
        self.authority
            .lock()
            .expect("authority lock poisoned")
            .is_admitted(writer)
    }

    /// Wait until a credential has admitted this process's own device.
    pub async fn device_ready(&self) -> Result<()> {
        let mut ready = self
            .authority
            .lock()
            .expect("authority lock poisoned")
            .ready_signal();

        while !*ready.borrow() {
            ready.changed().await.map_err(|_| SpaceError::Closed)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Replication boundary
    // ─────────────────────────────────────────────────────────────────────

    /// Register a remote feed so the demuxer consumes it.
    pub async fn admit_feed(&self, key: FeedKey) -> Result<()> {
        self.store.open(key).await?;
        {
            let mut feeds = self.feeds.lock().expect("feeds lock poisoned");
            if !feeds.contains(&key) {
                feeds.push(key);
            }
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Ingest a replication-delivered entry.
    ///
    /// Verifies the signature (unless disabled in config), stores the
    /// entry, registers its feed, and wakes the consumer loop.
    pub async fn ingest(&self, entry: &FeedEntry) -> Result<IngestOutcome> {
        let outcome = self
            .store
            .ingest(entry, self.config.validate_on_ingest)
            .await?;
        self.admit_feed(*entry.feed_key()).await?;
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read path
    // ─────────────────────────────────────────────────────────────────────

    /// Get a materialized item by id (deleted items included).
    pub fn item(&self, id: &ObjectId) -> Option<Item> {
        self.manager
            .read()
            .expect("manager lock poisoned")
            .get(id)
            .cloned()
    }

    /// Snapshot the items matching a predicate.
    pub fn items_where(&self, predicate: impl FnMut(&Item) -> bool) -> Vec<Item> {
        self.manager
            .read()
            .expect("manager lock poisoned")
            .select(predicate)
    }

    /// Build a reactive result set from a getter over the item manager.
    pub fn query<T, F>(&self, getter: F) -> ResultSet<T>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(&ItemManager) -> T + Send + Sync + 'static,
    {
        let manager = Arc::clone(&self.manager);
        let events = self
            .manager
            .read()
            .expect("manager lock poisoned")
            .events();
        ResultSet::new(events, move || {
            getter(&manager.read().expect("manager lock poisoned"))
        })
    }

    /// Wait for an item to exist and match a predicate.
    pub async fn wait_for_item<F>(&self, id: ObjectId, predicate: F) -> Result<Item>
    where
        F: Fn(&Item) -> bool + Send + Sync + 'static,
    {
        let result_set = self.query(move |manager| manager.get(&id).cloned());
        let item = result_set
            .wait_for(|item| item.as_ref().map(|i| predicate(i)).unwrap_or(false))
            .await
            .map_err(SpaceError::Engine)?;
        item.ok_or(SpaceError::Closed)
    }

    /// Snapshot of the consumer loop's counters.
    pub fn stats(&self) -> DemuxStats {
        self.stats.lock().expect("stats lock poisoned").clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Stop the consumer loop (between batches) and wait for it to exit.
    ///
    /// Returns the final timeframe: how far consumption got per feed.
    pub async fn close(self) -> Result<Timeframe> {
        let _ = self.shutdown.send(true);
        self.wake.notify_one();
        self.demux_task
            .await
            .map_err(|e| SpaceError::Join(e.to_string()))
    }
}

impl<S: FeedStorage + 'static> std::fmt::Debug for Space<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("id", &self.id)
            .field("local_feed", &self.keypair.public_key())
            .finish()
    }
}
