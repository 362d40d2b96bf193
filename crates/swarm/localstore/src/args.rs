//! Local store CLI arguments.

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Default capacity in synced chunks (2^22).
pub const DEFAULT_CAPACITY: u64 = 1 << 22;

/// Default maximum number of chunks evicted in a single gc batch.
pub const DEFAULT_GC_BATCH_SIZE: u64 = 1_000;

/// Percentage of capacity a garbage collection run reduces the gc size to.
pub const GC_TARGET_PERCENT: u64 = 90;

/// Low-water mark for a given capacity.
///
/// Always `<= capacity`, so a run started at capacity makes room for at least
/// `capacity / 10` new chunks before the next one is triggered.
pub const fn gc_target(capacity: u64) -> u64 {
    // split the product to avoid overflow near u64::MAX
    capacity / 100 * GC_TARGET_PERCENT + capacity % 100 * GC_TARGET_PERCENT / 100
}

/// How retrieval entries are laid out in the index store.
///
/// Both layouts behave identically for callers.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    ValueEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RetrievalLayout {
    /// Payload and access metadata in one entry.
    Composite,
    /// Payload and access metadata in separate index regions.
    #[default]
    Split,
}

/// Configuration for the local store.
pub trait LocalStoreConfig {
    /// Maximum number of synced chunks before garbage collection starts.
    fn capacity(&self) -> u64;

    /// Maximum number of chunks evicted per gc batch.
    fn gc_batch_size(&self) -> u64;

    /// Retrieval index layout.
    fn retrieval_layout(&self) -> RetrievalLayout;
}

/// Local store configuration arguments.
#[derive(Debug, Args, Clone, Serialize, Deserialize)]
#[command(next_help_heading = "Local Store")]
#[serde(default)]
pub struct LocalStoreArgs {
    /// Capacity in number of synced chunks.
    #[arg(long = "localstore.capacity", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: u64,

    /// Maximum number of chunks evicted in one garbage collection batch.
    #[arg(long = "localstore.gc-batch-size", default_value_t = DEFAULT_GC_BATCH_SIZE)]
    pub gc_batch_size: u64,

    /// Retrieval index layout.
    #[arg(long = "localstore.retrieval-layout", value_enum, default_value_t = RetrievalLayout::Split)]
    pub retrieval_layout: RetrievalLayout,
}

impl LocalStoreArgs {
    /// Arguments with the given capacity and defaults otherwise.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Set the gc batch size.
    pub fn with_gc_batch_size(mut self, gc_batch_size: u64) -> Self {
        self.gc_batch_size = gc_batch_size;
        self
    }

    /// Set the retrieval layout.
    pub fn with_retrieval_layout(mut self, layout: RetrievalLayout) -> Self {
        self.retrieval_layout = layout;
        self
    }
}

impl Default for LocalStoreArgs {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            gc_batch_size: DEFAULT_GC_BATCH_SIZE,
            retrieval_layout: RetrievalLayout::default(),
        }
    }
}

impl LocalStoreConfig for LocalStoreArgs {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn gc_batch_size(&self) -> u64 {
        self.gc_batch_size
    }

    fn retrieval_layout(&self) -> RetrievalLayout {
        self.retrieval_layout
    }
}
