//! Garbage collection.
//!
//! Once the gc size reaches capacity, the collector evicts synced chunks in
//! ascending access order until the gc size is down to the gc target. Each
//! batch is scanned without holding the write lock and then deleted under it,
//! skipping entries a concurrent request has moved or a removal has dropped
//! in between.

use std::sync::{Arc, atomic::Ordering};

use tracing::{debug, error, trace, warn};
use vertex_storage::{Batch, IndexStore};

use crate::{
    LocalStoreResult,
    index::{GcValue, SeqKey},
    store::Shared,
};

/// Observer of garbage collection progress.
pub trait GcObserver: Send + Sync {
    /// Called once per completed gc batch with the number of chunks it evicted.
    fn on_batch_collected(&self, collected: u64);
}

impl<F> GcObserver for F
where
    F: Fn(u64) + Send + Sync,
{
    fn on_batch_collected(&self, collected: u64) {
        self(collected)
    }
}

/// Observer that ignores every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGcObserver;

impl GcObserver for NoopGcObserver {
    fn on_batch_collected(&self, _collected: u64) {}
}

/// Outcome of one gc batch.
#[derive(Debug, Clone, Copy, Default)]
struct BatchOutcome {
    scanned: u64,
    collected: u64,
    skipped: u64,
}

/// Outcome of one gc run.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct GcRun {
    pub(crate) batches: u64,
    pub(crate) collected: u64,
    pub(crate) skipped: u64,
}

/// Background collector loop. Waits for triggers and runs collections on the
/// blocking pool until shutdown is signalled.
pub(crate) async fn run_collector<S: IndexStore>(shared: Arc<Shared<S>>) {
    let mut shutdown = shared.shutdown.clone();

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                // sender gone or shutdown signalled
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = shared.gc_trigger.notified() => {}
        }

        let run = Arc::clone(&shared);
        match tokio::task::spawn_blocking(move || run.collect_garbage()).await {
            Ok(Ok(run)) => {
                if run.batches > 0 {
                    debug!(
                        batches = run.batches,
                        collected = run.collected,
                        skipped = run.skipped,
                        gc_size = shared.gc_size(),
                        "Garbage collection done"
                    );
                }
            }
            Ok(Err(e)) => {
                shared.metrics.gc_errors_total.increment(1);
                error!(%e, "Garbage collection failed");
            }
            Err(e) => {
                shared.metrics.gc_errors_total.increment(1);
                error!(%e, "Garbage collection task panicked");
            }
        }
    }

    debug!(gc_size = shared.gc_size(), "Garbage collector stopped");
}

impl<S: IndexStore> Shared<S> {
    /// Evict oldest-accessed chunks until the gc size is at the gc target.
    ///
    /// Stops early when the gc index runs out or shutdown is signalled.
    pub(crate) fn collect_garbage(&self) -> LocalStoreResult<GcRun> {
        let mut run = GcRun::default();
        self.metrics.gc_runs_total.increment(1);

        loop {
            if self.is_closing() {
                debug!("Garbage collection interrupted by shutdown");
                break;
            }

            let deficit = self.gc_size().saturating_sub(self.gc_target);
            if deficit == 0 {
                break;
            }

            let outcome = self.collect_batch(deficit.min(self.gc_batch_size))?;
            if outcome.scanned == 0 {
                warn!(
                    gc_size = self.gc_size(),
                    gc_target = self.gc_target,
                    "Gc index exhausted before reaching the gc target"
                );
                break;
            }

            run.batches += 1;
            run.collected += outcome.collected;
            run.skipped += outcome.skipped;
            self.observer.on_batch_collected(outcome.collected);
        }

        Ok(run)
    }

    /// Evict up to `limit` of the oldest gc entries in one atomic batch.
    fn collect_batch(&self, limit: u64) -> LocalStoreResult<BatchOutcome> {
        let mut candidates: Vec<(SeqKey, GcValue)> = Vec::new();
        self.gc.iterate(&self.store, None, |key, value| {
            candidates.push((key, value));
            Ok((candidates.len() as u64) < limit)
        })?;

        if candidates.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut outcome = BatchOutcome {
            scanned: candidates.len() as u64,
            ..Default::default()
        };

        let _guard = self.write_lock.lock();

        let mut batch = Batch::new();
        for (key, value) in &candidates {
            // touched or removed since the scan
            if !self.gc.has(&self.store, *key)? {
                outcome.skipped += 1;
                continue;
            }

            self.gc.delete(&mut batch, *key);
            self.pull.delete(&mut batch, SeqKey::new(value.pull_seq, key.address));
            self.retrieval.delete(&mut batch, &key.address);
            outcome.collected += 1;
            trace!(address = %key.address, access_seq = key.seq, "Evicting chunk");
        }

        if outcome.collected > 0 {
            self.store.write_batch(batch)?;
            let gc_size = self.gc_size.fetch_sub(outcome.collected, Ordering::AcqRel) - outcome.collected;
            self.metrics.set_gc_size(gc_size);
        }

        self.metrics.gc_batches_total.increment(1);
        self.metrics.gc_collected_total.increment(outcome.collected);
        self.metrics.gc_skipped_total.increment(outcome.skipped);

        Ok(outcome)
    }
}
