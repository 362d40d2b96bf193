//! Local store metrics

use metrics::{Counter, Gauge};

/// Local store metrics
#[derive(Clone, Debug)]
pub(crate) struct LocalStoreMetrics {
    /// Current number of entries in the gc index
    pub(crate) gc_size: Gauge,
    /// Number of garbage collection runs
    pub(crate) gc_runs_total: Counter,
    /// Number of garbage collection batches
    pub(crate) gc_batches_total: Counter,
    /// Number of chunks evicted by the garbage collector
    pub(crate) gc_collected_total: Counter,
    /// Number of scanned gc entries that were gone before they could be evicted
    pub(crate) gc_skipped_total: Counter,
    /// Number of garbage collection runs that ended with an error
    pub(crate) gc_errors_total: Counter,
    /// Number of uploaded chunks
    pub(crate) put_upload_total: Counter,
    /// Number of synced chunks
    pub(crate) set_sync_total: Counter,
    /// Number of removed chunks
    pub(crate) set_remove_total: Counter,
    /// Number of gc index refreshes on request
    pub(crate) get_touch_total: Counter,
    /// Number of lookups for missing chunks
    pub(crate) get_not_found_total: Counter,
}

impl Default for LocalStoreMetrics {
    fn default() -> Self {
        Self {
            gc_size: metrics::gauge!("localstore.gc.size"),
            gc_runs_total: metrics::counter!("localstore.gc.runs_total"),
            gc_batches_total: metrics::counter!("localstore.gc.batches_total"),
            gc_collected_total: metrics::counter!("localstore.gc.collected_total"),
            gc_skipped_total: metrics::counter!("localstore.gc.skipped_total"),
            gc_errors_total: metrics::counter!("localstore.gc.errors_total"),
            put_upload_total: metrics::counter!("localstore.put.upload_total"),
            set_sync_total: metrics::counter!("localstore.set.sync_total"),
            set_remove_total: metrics::counter!("localstore.set.remove_total"),
            get_touch_total: metrics::counter!("localstore.get.touch_total"),
            get_not_found_total: metrics::counter!("localstore.get.not_found_total"),
        }
    }
}

impl LocalStoreMetrics {
    /// Records the current gc size.
    pub(crate) fn set_gc_size(&self, size: u64) {
        self.gc_size.set(size as f64);
    }
}
