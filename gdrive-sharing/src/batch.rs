use std::mem;

use gdrive_core::{BatchItemResult, DriveError, Mutation};
use tracing::{debug, warn};

use crate::remote::RemoteObjectService;

/// Lowest batch-size ceiling among the Drive endpoints we call.
pub const DEFAULT_BATCH_CAPACITY: usize = 800;

pub type ItemCallback = fn(&BatchItemResult);

/// Queues mutations and sends them as batches.
///
/// Capacity policy: the `add` that brings the queue to `capacity` executes the
/// whole queue before returning. `flush` executes whatever is left. Item
/// results are handed to the callback one by one; a failed item never stops
/// its siblings. When the batch call itself fails, every queued item is
/// reported to the callback as not sent before the error is returned.
pub struct BatchAggregator<'a, S, F = ItemCallback> {
    service: &'a S,
    capacity: usize,
    pending: Vec<Mutation>,
    on_item: F,
    batches_executed: usize,
    failed_items: usize,
}

impl<'a, S: RemoteObjectService> BatchAggregator<'a, S> {
    pub fn new(service: &'a S, capacity: usize) -> Self {
        Self::with_callback(service, capacity, log_item_failure)
    }
}

impl<'a, S, F> BatchAggregator<'a, S, F>
where
    S: RemoteObjectService,
    F: FnMut(&BatchItemResult),
{
    pub fn with_callback(service: &'a S, capacity: usize, on_item: F) -> Self {
        Self {
            service,
            capacity: capacity.max(1),
            pending: Vec::new(),
            on_item,
            batches_executed: 0,
            failed_items: 0,
        }
    }

    pub async fn add(&mut self, mutation: Mutation) -> Result<(), DriveError> {
        self.pending.push(mutation);
        if self.pending.len() >= self.capacity {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), DriveError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = mem::take(&mut self.pending);
        debug!(items = batch.len(), "executing batch");
        let results = match self.service.execute_batch(&batch).await {
            Ok(results) => results,
            Err(err) => {
                self.report_unsent(&batch, &err);
                return Err(err);
            }
        };
        self.batches_executed += 1;
        for result in &results {
            if result.result.is_err() {
                self.failed_items += 1;
            }
            (self.on_item)(result);
        }
        Ok(())
    }

    fn report_unsent(&mut self, batch: &[Mutation], err: &DriveError) {
        let reason = err.to_string();
        for (index, mutation) in batch.iter().enumerate() {
            self.failed_items += 1;
            (self.on_item)(&BatchItemResult {
                index,
                content_id: format!("item-{index}"),
                result: Err(DriveError::NotSent {
                    file_id: mutation.file_id().to_string(),
                    reason: reason.clone(),
                }),
            });
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn batches_executed(&self) -> usize {
        self.batches_executed
    }

    pub fn failed_items(&self) -> usize {
        self.failed_items
    }
}

pub fn log_item_failure(item: &BatchItemResult) {
    if let Err(err) = &item.result {
        warn!(
            request = %item.content_id,
            retryable = err.is_retryable(),
            "batch item failed: {err}"
        );
    }
}
