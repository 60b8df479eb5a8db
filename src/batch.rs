//! Batch orchestrator.
//!
//! Fetches many stations without tripping provider rate limits:
//! - items run in fixed-size batches, all items of a batch concurrently
//! - a batch completes fully before the pause and the next batch
//! - a failing, timed-out or empty item is skipped, never fatal
//! - progress is reported per resolved item, cancellation is cooperative

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::models::{BatchConfig, MAX_BATCH_SIZE};

/// Receives `(loaded, total)` as items resolve.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, loaded: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, loaded: usize, total: usize) {
        self(loaded, total)
    }
}

/// Observer that ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _loaded: usize, _total: usize) {}
}

/// Result of one orchestrated run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    /// Successful items, in completion order
    pub items: Vec<T>,
    pub total: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    size: usize,
    delay: Duration,
    item_timeout: Duration,
}

impl BatchOrchestrator {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            size: config.size.clamp(1, MAX_BATCH_SIZE),
            delay: config.delay(),
            item_timeout: config.item_timeout(),
        }
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.size
    }

    /// Run `fetch_one` over `items` batch by batch.
    ///
    /// `Ok(None)` means the item had nothing to report and counts as skipped.
    pub async fn run<I, T, E, F, Fut>(
        &self,
        items: Vec<I>,
        fetch_one: F,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> BatchOutcome<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        let total = items.len();
        let mut outcome = BatchOutcome {
            items: Vec::with_capacity(total),
            total,
            failed: 0,
            cancelled: false,
        };

        let item_timeout = self.item_timeout;
        let mut pending = items.into_iter().enumerate();
        let mut loaded = 0;
        let mut batch_number = 0;

        loop {
            let batch: Vec<(usize, I)> = pending.by_ref().take(self.size).collect();
            if batch.is_empty() {
                break;
            }

            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if batch_number > 0 && !self.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        outcome.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            batch_number += 1;
            log::debug!(
                "Batch {}: {} items ({}/{} done)",
                batch_number,
                batch.len(),
                loaded,
                total
            );

            let concurrency = batch.len();
            let mut results = stream::iter(batch)
                .map(|(index, item)| {
                    let request = fetch_one(item);
                    async move { (index, tokio::time::timeout(item_timeout, request).await) }
                })
                .buffer_unordered(concurrency);

            while let Some((index, result)) = results.next().await {
                loaded += 1;
                match result {
                    Ok(Ok(Some(value))) => outcome.items.push(value),
                    Ok(Ok(None)) => {
                        outcome.failed += 1;
                        log::debug!("Item {} returned no data, skipped", index);
                    }
                    Ok(Err(e)) => {
                        outcome.failed += 1;
                        log::warn!("Item {} failed, skipped: {}", index, e);
                    }
                    Err(_) => {
                        outcome.failed += 1;
                        log::warn!("Item {} timed out after {:?}, skipped", index, item_timeout);
                    }
                }

                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                } else {
                    observer.on_progress(loaded, total);
                }
            }

            if outcome.cancelled {
                break;
            }
        }

        if outcome.cancelled {
            log::info!("Batch run cancelled after {}/{} items", loaded, total);
        } else {
            log::info!(
                "Batch run finished: {} ok, {} skipped",
                outcome.items.len(),
                outcome.failed
            );
        }
        outcome
    }
}
