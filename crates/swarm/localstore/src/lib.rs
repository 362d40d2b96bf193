//! Swarm local chunk store.
//!
//! Content-addressed chunk storage bounded by a capacity of synced chunks.
//! Chunks are uploaded, confirmed synced and read through mode accessors;
//! once the number of synced chunks reaches capacity a background collector
//! evicts the least recently accessed ones in batches until the gc target is
//! reached.
//!
//! # Architecture
//!
//! ```text
//! Putter(Upload)  ─┐
//! Setter(Sync)    ─┤
//! Setter(Remove)  ─┼─► LocalStore ─► IndexStore (memory, redb)
//! Getter(Request) ─┤      │             ├─ retrieval  address              -> data, stored_at, access_seq
//! Getter(Lookup)  ─┘      │             ├─ pull       pull_seq | address   -> ()
//!                         │             └─ gc         access_seq | address -> pull_seq
//!                         │
//!                         └─ gc trigger ─► collector task ─► batched evictions
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let db = LocalStore::new(MemoryStore::new(), &LocalStoreArgs::default())?;
//!
//! db.putter(ModePut::Upload).put(&chunk)?;
//! db.setter(ModeSet::Sync).set(chunk.address())?;
//! let chunk = db.getter(ModeGet::Request).get(chunk.address())?;
//!
//! db.close().await;
//! ```

#![warn(missing_docs)]

mod args;
mod chunk;
mod error;
mod gc;
mod index;
mod metrics;
mod mode;
mod store;

pub use args::{
    DEFAULT_CAPACITY, DEFAULT_GC_BATCH_SIZE, GC_TARGET_PERCENT, LocalStoreArgs, LocalStoreConfig,
    RetrievalLayout, gc_target,
};
pub use chunk::{Chunk, ChunkAddress};
pub use error::LocalStoreError;
pub use gc::{GcObserver, NoopGcObserver};
pub use mode::{Getter, ModeGet, ModePut, ModeSet, Putter, Setter};
pub use store::{IndexCounts, LocalStore, PullItem};

/// Result type for local store operations.
pub type LocalStoreResult<T> = Result<T, LocalStoreError>;
