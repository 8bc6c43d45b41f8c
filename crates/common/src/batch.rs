//! Batch planning and aggregation
//!
//! A collection of `N` items run with batch size `B` is split into
//! `ceil(N / B)` contiguous batches. Batch `i` covers `[i*B, min((i+1)*B, N))`.
//! Batches are executed strictly one after another: the runner behind a batch
//! is a heavyweight single-tenant process and is never run concurrently with
//! itself.

use std::ops::Range;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{
    BatchProgress, BatchResponse, BatchSummary, Collection, CollectionInfo, FailedEndpoint,
    SuccessEndpoint,
};

/// Batch size used when a caller does not pick one
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Partition of a collection into fixed-size batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    total_items: usize,
    batch_size: usize,
}

impl BatchPlan {
    pub fn new(total_items: usize, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidRequest("batchSize must be at least 1".to_string()));
        }
        Ok(Self {
            total_items,
            batch_size,
        })
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn total_batches(&self) -> usize {
        self.total_items.div_ceil(self.batch_size)
    }

    /// Item range of batch `index`, or `None` once past the end
    pub fn range(&self, index: usize) -> Option<Range<usize>> {
        let start = index.checked_mul(self.batch_size)?;
        if start >= self.total_items {
            return None;
        }
        let end = start.saturating_add(self.batch_size).min(self.total_items);
        Some(start..end)
    }

    pub fn is_final(&self, range: &Range<usize>) -> bool {
        range.end >= self.total_items
    }

    /// Progress after running batch `index` over `range`
    pub fn progress(&self, index: usize, range: &Range<usize>) -> BatchProgress {
        BatchProgress {
            current_batch: index + 1,
            total_batches: self.total_batches(),
            tested_so_far: range.end,
            total_tests: self.total_items,
        }
    }

    /// Progress reported for a batch index past the end: everything is tested.
    pub fn exhausted_progress(&self) -> BatchProgress {
        BatchProgress {
            current_batch: self.total_batches(),
            total_batches: self.total_batches(),
            tested_so_far: self.total_items,
            total_tests: self.total_items,
        }
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.total_batches()).filter_map(|i| self.range(i))
    }
}

/// Identifier a batch runs under, keeping its artifacts apart from the parent run
pub fn batch_run_id(run_id: &str, batch_index: usize) -> String {
    format!("{}-batch-{}", run_id, batch_index)
}

/// Build the sub-collection for one batch.
///
/// The copy keeps the parent's variables and metadata but carries only the
/// batch's items and a name that tells batches apart in runner output.
pub fn batch_collection(parent: &Collection, range: Range<usize>, batch_index: usize) -> Collection {
    Collection {
        info: CollectionInfo {
            name: Some(format!("{} - Batch {}", parent.name(), batch_index + 1)),
            extra: parent.info.extra.clone(),
        },
        item: parent.item[range].to_vec(),
        variable: parent.variable.clone(),
        extra: parent.extra.clone(),
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Running total of batch summaries for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub success_endpoints: Vec<SuccessEndpoint>,
    pub failed_endpoints: Vec<FailedEndpoint>,
    pub batches: usize,
}

impl AggregatedResult {
    pub fn absorb(&mut self, summary: BatchSummary) {
        self.total += summary.total;
        self.passed += summary.passed;
        self.failed += summary.failed;
        self.success_endpoints.extend(summary.success_endpoints);
        self.failed_endpoints.extend(summary.failed_endpoints);
        self.batches += 1;
    }

    pub fn into_summary(self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            passed: self.passed,
            failed: self.failed,
            success_endpoints: self.success_endpoints,
            failed_endpoints: self.failed_endpoints,
        }
    }
}

/// Anything that can run one batch of a stored collection
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute_batch(
        &self,
        run_id: &str,
        batch_index: usize,
        batch_size: usize,
    ) -> Result<BatchResponse>;
}

/// Run every batch of `run_id` in order and sum the summaries.
///
/// `on_batch` sees each response as it arrives. The first error stops the
/// loop and is returned; the partial aggregate is dropped.
pub async fn drain_batches<E, F>(
    executor: &E,
    run_id: &str,
    batch_size: usize,
    mut on_batch: F,
) -> Result<AggregatedResult>
where
    E: BatchExecutor + ?Sized,
    F: FnMut(&BatchResponse),
{
    let mut aggregate = AggregatedResult::default();
    let mut batch_index = 0;

    loop {
        let response = executor.execute_batch(run_id, batch_index, batch_size).await?;
        debug!(
            run_id,
            batch_index,
            tested = response.progress.tested_so_far,
            total = response.progress.total_tests,
            "batch finished"
        );
        on_batch(&response);

        let complete = response.is_complete;
        let total_batches = response.progress.total_batches;
        aggregate.absorb(response.summary);

        if complete {
            break;
        }
        batch_index += 1;
        if batch_index > total_batches {
            return Err(Error::Internal(format!(
                "run {} reported {} batches but never completed",
                run_id, total_batches
            )));
        }
    }

    info!(
        run_id,
        batches = aggregate.batches,
        passed = aggregate.passed,
        failed = aggregate.failed,
        "all batches drained"
    );
    Ok(aggregate)
}
