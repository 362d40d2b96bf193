//! The local store.
//!
//! [`LocalStore`] owns the index store, the retrieval, pull and gc indices,
//! the gc size counter and the garbage collector's lifecycle. Uploads, sync
//! confirmations and requests go through the mode accessors returned by
//! [`LocalStore::putter`], [`LocalStore::setter`] and [`LocalStore::getter`].

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::{Notify, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};
use vertex_storage::{Batch, DatabaseError, IndexStore};

use crate::{
    ChunkAddress, Getter, LocalStoreConfig, LocalStoreError, LocalStoreResult, ModeGet, ModePut,
    ModeSet, Putter, RetrievalLayout, Setter,
    gc::{GcObserver, NoopGcObserver, run_collector},
    index::{GcIndex, PullIndex, RetrievalIndex, SeqKey, prefix, retrieval_index},
    metrics::LocalStoreMetrics,
};

/// Key of the persisted sequence high-water mark.
const LAST_SEQ_KEY: &[u8] = &[prefix::META, b's', b'e', b'q'];

/// Key of the retrieval layout the database was created with.
const LAYOUT_KEY: &[u8] = &[prefix::META, b'l', b'a', b'y', b'o', b'u', b't'];

/// Source of insertion and access sequences.
///
/// Only reachable through [`Shared::write_lock`], so allocation order equals
/// commit order.
#[derive(Debug)]
pub(crate) struct Sequence {
    last: u64,
}

impl Sequence {
    /// Allocate the next sequence and record it in the batch that uses it.
    pub(crate) fn next(&mut self, batch: &mut Batch) -> u64 {
        self.last += 1;
        batch.put(LAST_SEQ_KEY, self.last.to_be_bytes());
        self.last
    }
}

/// State shared by all handles and the garbage collector task.
pub(crate) struct Shared<S: IndexStore> {
    pub(crate) store: S,
    pub(crate) retrieval: Box<dyn RetrievalIndex<S>>,
    pub(crate) pull: PullIndex,
    pub(crate) gc: GcIndex,
    pub(crate) capacity: u64,
    pub(crate) gc_target: u64,
    pub(crate) gc_batch_size: u64,
    /// Cardinality of the gc index. Only changed right after the batch that
    /// changed the index, while holding `write_lock`.
    pub(crate) gc_size: AtomicU64,
    /// Serializes every index mutation.
    pub(crate) write_lock: Mutex<Sequence>,
    pub(crate) gc_trigger: Notify,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) observer: Arc<dyn GcObserver>,
    pub(crate) metrics: LocalStoreMetrics,
}

impl<S: IndexStore> Shared<S> {
    pub(crate) fn gc_size(&self) -> u64 {
        self.gc_size.load(Ordering::Acquire)
    }

    /// Schedule a garbage collection run if the gc size reached capacity.
    ///
    /// Pending triggers coalesce into a single run.
    pub(crate) fn maybe_trigger_gc(&self, gc_size: u64) {
        if gc_size >= self.capacity {
            self.gc_trigger.notify_one();
        }
    }

    pub(crate) fn is_closing(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Garbage collector task handle. Signals shutdown when the last store handle
/// is dropped.
struct Collector {
    shutdown: watch::Sender<bool>,
    /// Set once the collector task has exited.
    stopped: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Entry counts of the three indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCounts {
    /// Stored chunks.
    pub retrieval: u64,
    /// Synced chunks, by insertion sequence.
    pub pull: u64,
    /// Synced chunks, by access sequence.
    pub gc: u64,
}

/// A pull index entry as seen by sync cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullItem {
    /// Insertion sequence assigned when the chunk was synced.
    pub seq: u64,
    /// Chunk address.
    pub address: ChunkAddress,
}

/// Local chunk store with capacity-bound garbage collection.
///
/// Cloning is cheap; all clones share the same indices and collector.
pub struct LocalStore<S: IndexStore> {
    shared: Arc<Shared<S>>,
    collector: Arc<Collector>,
}

impl<S: IndexStore> Clone for LocalStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            collector: Arc::clone(&self.collector),
        }
    }
}

impl<S: IndexStore> std::fmt::Debug for LocalStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("capacity", &self.shared.capacity)
            .field("gc_target", &self.shared.gc_target)
            .field("gc_batch_size", &self.shared.gc_batch_size)
            .field("gc_size", &self.shared.gc_size())
            .field("layout", &self.shared.retrieval.layout())
            .finish_non_exhaustive()
    }
}

impl<S: IndexStore> LocalStore<S> {
    /// Open a local store on top of `store`.
    ///
    /// Must be called from within a tokio runtime; the garbage collector is
    /// spawned on it.
    pub fn new(store: S, config: &impl LocalStoreConfig) -> LocalStoreResult<Self> {
        Self::with_observer(store, config, NoopGcObserver)
    }

    /// Open a local store that reports every collected gc batch to `observer`.
    pub fn with_observer(
        store: S,
        config: &impl LocalStoreConfig,
        observer: impl GcObserver + 'static,
    ) -> LocalStoreResult<Self> {
        let capacity = config.capacity();
        let gc_batch_size = config.gc_batch_size();
        if capacity == 0 {
            return Err(LocalStoreError::InvalidConfig("capacity must be non-zero".into()));
        }
        if gc_batch_size == 0 {
            return Err(LocalStoreError::InvalidConfig("gc batch size must be non-zero".into()));
        }

        let runtime = Handle::try_current().map_err(|e| LocalStoreError::NoRuntime(e.to_string()))?;

        let layout = config.retrieval_layout();
        check_layout(&store, layout)?;

        let gc = GcIndex::new(prefix::GC, "gc");
        let pull = PullIndex::new(prefix::PULL, "pull");

        // Restore the gc size and the sequence high-water mark.
        let mut gc_size = 0u64;
        let mut last_seq = read_last_seq(&store)?;
        gc.iterate(&store, None, |key, value| {
            gc_size += 1;
            last_seq = last_seq.max(key.seq).max(value.pull_seq);
            Ok(true)
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = LocalStoreMetrics::default();
        metrics.set_gc_size(gc_size);

        let shared = Arc::new(Shared {
            store,
            retrieval: retrieval_index(layout),
            pull,
            gc,
            capacity,
            gc_target: crate::gc_target(capacity),
            gc_batch_size,
            gc_size: AtomicU64::new(gc_size),
            write_lock: Mutex::new(Sequence { last: last_seq }),
            gc_trigger: Notify::new(),
            shutdown: shutdown_rx,
            observer: Arc::new(observer),
            metrics,
        });

        let (stopped_tx, stopped_rx) = watch::channel(false);
        let collector = run_collector(Arc::clone(&shared));
        let task = runtime.spawn(async move {
            collector.await;
            stopped_tx.send_replace(true);
        });

        debug!(
            capacity,
            gc_target = shared.gc_target,
            gc_batch_size,
            gc_size,
            last_seq,
            %layout,
            index = shared.gc.name(),
            "Opened local store"
        );

        // A store reopened at or over capacity collects right away.
        shared.maybe_trigger_gc(gc_size);

        Ok(Self {
            shared,
            collector: Arc::new(Collector {
                shutdown: shutdown_tx,
                stopped: stopped_rx,
                task: Mutex::new(Some(task)),
            }),
        })
    }

    /// Accessor for storing chunks.
    pub fn putter(&self, mode: ModePut) -> Putter<S> {
        Putter::new(self.clone(), mode)
    }

    /// Accessor for changing the state of stored chunks.
    pub fn setter(&self, mode: ModeSet) -> Setter<S> {
        Setter::new(self.clone(), mode)
    }

    /// Accessor for reading chunks.
    pub fn getter(&self, mode: ModeGet) -> Getter<S> {
        Getter::new(self.clone(), mode)
    }

    pub(crate) fn shared(&self) -> &Shared<S> {
        &self.shared
    }

    /// Check if a chunk is stored, without touching it.
    pub fn has(&self, address: &ChunkAddress) -> LocalStoreResult<bool> {
        Ok(self.shared.retrieval.has(&self.shared.store, address)?)
    }

    /// Maximum number of synced chunks before garbage collection starts.
    pub fn capacity(&self) -> u64 {
        self.shared.capacity
    }

    /// Number of synced chunks a garbage collection run reduces the store to.
    pub fn gc_target(&self) -> u64 {
        self.shared.gc_target
    }

    /// Maximum number of chunks evicted per gc batch.
    pub fn gc_batch_size(&self) -> u64 {
        self.shared.gc_batch_size
    }

    /// Current number of gc-eligible chunks.
    pub fn gc_size(&self) -> u64 {
        self.shared.gc_size()
    }

    /// Retrieval index layout in use.
    pub fn retrieval_layout(&self) -> RetrievalLayout {
        self.shared.retrieval.layout()
    }

    /// Count the entries of every index by scanning them.
    pub fn index_counts(&self) -> LocalStoreResult<IndexCounts> {
        let shared = &self.shared;
        Ok(IndexCounts {
            retrieval: shared.retrieval.count(&shared.store)?,
            pull: shared.pull.count(&shared.store)?,
            gc: shared.gc.count(&shared.store)?,
        })
    }

    /// Synced chunks with an insertion sequence `>= since`, in insertion order,
    /// at most `limit` of them.
    pub fn pull_items(&self, since: u64, limit: usize) -> LocalStoreResult<Vec<PullItem>> {
        let mut items = Vec::new();
        if limit == 0 {
            return Ok(items);
        }

        self.shared.pull.iterate(
            &self.shared.store,
            Some(SeqKey::first_at(since)),
            |key, _| {
                items.push(PullItem {
                    seq: key.seq,
                    address: key.address,
                });
                Ok(items.len() < limit)
            },
        )?;

        Ok(items)
    }

    /// Stop the garbage collector.
    ///
    /// A batch in progress is finished; no further batch is started. Returns
    /// once the collector task has exited, for every handle that calls it.
    /// Foreground operations keep working but the store is no longer bounded
    /// by its capacity.
    pub async fn close(&self) {
        self.collector.shutdown.send_replace(true);

        let task = self.collector.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(%e, "Garbage collector task failed");
            }
        }

        // another handle may own the join handle; a dropped sender means the
        // task is gone as well
        let mut stopped = self.collector.stopped.clone();
        let _ = stopped.wait_for(|stopped| *stopped).await;

        debug!(gc_size = self.gc_size(), "Closed local store");
    }
}

/// Record the layout of a fresh database, or reject a layout that differs
/// from the one the database was created with.
fn check_layout<S: IndexStore>(store: &S, layout: RetrievalLayout) -> LocalStoreResult<()> {
    let Some(value) = store.get(LAYOUT_KEY)? else {
        store.put(LAYOUT_KEY, layout.to_string().as_bytes())?;
        return Ok(());
    };

    let stored: RetrievalLayout = std::str::from_utf8(&value)
        .ok()
        .and_then(|name| name.parse().ok())
        .ok_or(DatabaseError::Decode)?;
    if stored != layout {
        return Err(LocalStoreError::InvalidConfig(format!(
            "retrieval layout {layout} does not match the stored layout {stored}"
        )));
    }
    Ok(())
}

fn read_last_seq<S: IndexStore>(store: &S) -> Result<u64, DatabaseError> {
    match store.get(LAST_SEQ_KEY)? {
        Some(value) => {
            let bytes: [u8; 8] = value.as_slice().try_into().map_err(|_| DatabaseError::Decode)?;
            Ok(u64::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}
