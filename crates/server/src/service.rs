//! Run lifecycle: generate, edit, execute and execute-batch
//!
//! Every operation is keyed by a run id. The service owns no in-memory state;
//! everything it knows about a run comes from the store.

use std::sync::Arc;

use apirun_common::api::{
    CollectionResponse, ExecuteResponse, GenerateResponse, MessageResponse, TestCountResponse,
};
use apirun_common::batch::{batch_collection, batch_run_id};
use apirun_common::{
    link_test_cases, BatchExecutor, BatchPlan, BatchResponse, BatchSummary, Collection, Error,
    Result, RunStore, RunSummaryRecord,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::ReportAnalyzer;
use crate::runner::CollectionRunner;
use crate::worker::TestGenerator;

/// Orchestrates the store, the worker and the runner for each run
pub struct RunsService {
    store: RunStore,
    generator: Arc<dyn TestGenerator>,
    runner: Arc<dyn CollectionRunner>,
    analyzer: Arc<dyn ReportAnalyzer>,
    default_batch_size: usize,
}

impl RunsService {
    pub fn new(
        store: RunStore,
        generator: Arc<dyn TestGenerator>,
        runner: Arc<dyn CollectionRunner>,
        analyzer: Arc<dyn ReportAnalyzer>,
    ) -> Self {
        Self {
            store,
            generator,
            runner,
            analyzer,
            default_batch_size: apirun_common::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_default_batch_size(mut self, batch_size: usize) -> Self {
        self.default_batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn default_batch_size(&self) -> usize {
        self.default_batch_size
    }

    // ------------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------------

    /// Generate a collection from the document at `swagger_url`
    pub async fn generate(&self, swagger_url: &str) -> Result<GenerateResponse> {
        if swagger_url.trim().is_empty() {
            return Err(Error::InvalidRequest("swaggerUrl is required".to_string()));
        }
        let parsed = self.generator.parse_swagger_url(swagger_url).await?;
        self.store_generated(&parsed).await
    }

    /// Generate a collection from an inline document
    pub async fn generate_from_spec(&self, spec: &Value) -> Result<GenerateResponse> {
        if !spec.is_object() {
            return Err(Error::InvalidRequest("spec must be a JSON object".to_string()));
        }
        let parsed = self.generator.parse_swagger_spec(spec).await?;
        self.store_generated(&parsed).await
    }

    async fn store_generated(&self, parsed: &Value) -> Result<GenerateResponse> {
        let generated = self.generator.generate_tests(parsed).await?;
        let run_id = Uuid::new_v4().to_string();

        let mut collection = generated.collection;
        self.store.put_collection(&run_id, &mut collection).await?;

        let mut testcases = generated.testcases;
        link_test_cases(&mut testcases, &collection);

        info!(
            run_id = %run_id,
            testcases = testcases.len(),
            items = collection.len(),
            "Generated collection"
        );

        Ok(GenerateResponse {
            run_id,
            testcases,
            message: "Testcases generated and stored".to_string(),
        })
    }

    // ------------------------------------------------------------------------
    // Collection access
    // ------------------------------------------------------------------------

    /// Replace the stored collection of `run_id`
    pub async fn update(&self, run_id: &str, mut collection: Collection) -> Result<MessageResponse> {
        self.store.put_collection(run_id, &mut collection).await?;
        info!(run_id, items = collection.len(), "Updated collection");
        Ok(MessageResponse {
            message: "Testcases updated".to_string(),
        })
    }

    pub async fn collection(&self, run_id: &str) -> Result<CollectionResponse> {
        let collection = self.store.get_collection(run_id).await?;
        Ok(CollectionResponse {
            run_id: run_id.to_string(),
            collection,
        })
    }

    pub async fn test_count(&self, run_id: &str) -> Result<TestCountResponse> {
        let collection = self.store.get_collection(run_id).await?;
        Ok(TestCountResponse {
            run_id: run_id.to_string(),
            total_tests: collection.len(),
        })
    }

    pub async fn summary(&self, run_id: &str) -> Result<RunSummaryRecord> {
        self.store.get_summary(run_id).await
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Run the whole collection in one runner invocation and persist the summary
    pub async fn execute(&self, run_id: &str) -> Result<ExecuteResponse> {
        let collection = self.store.get_collection(run_id).await?;

        let output = self.runner.run(run_id, &collection).await?;
        let summary = self.analyzer.analyze(&output.report).await?;

        self.store
            .put_summary(&RunSummaryRecord {
                run_id: run_id.to_string(),
                executed_at: chrono::Utc::now(),
                summary: summary.clone(),
            })
            .await?;

        info!(
            run_id,
            passed = summary.passed,
            failed = summary.failed,
            report = %output.report_path.display(),
            "Execution finished"
        );

        Ok(ExecuteResponse {
            run_id: run_id.to_string(),
            summary,
        })
    }

    /// Run batch `batch_index` of the stored collection.
    ///
    /// An index past the end is answered immediately as complete with an empty
    /// summary; nothing is run and nothing is written.
    pub async fn execute_batch(
        &self,
        run_id: &str,
        batch_index: usize,
        batch_size: usize,
    ) -> Result<BatchResponse> {
        let collection = self.store.get_collection(run_id).await?;
        let plan = BatchPlan::new(collection.len(), batch_size)?;

        let Some(range) = plan.range(batch_index) else {
            return Ok(BatchResponse {
                run_id: run_id.to_string(),
                batch_index,
                is_complete: true,
                summary: BatchSummary::default(),
                progress: plan.exhausted_progress(),
            });
        };

        info!(
            run_id,
            batch = batch_index + 1,
            of = plan.total_batches(),
            "Running items {} to {} of {}",
            range.start + 1,
            range.end,
            plan.total_items()
        );

        let batch = batch_collection(&collection, range.clone(), batch_index);
        let output = self
            .runner
            .run(&batch_run_id(run_id, batch_index), &batch)
            .await?;
        let summary = self.analyzer.analyze(&output.report).await?;
        debug!(
            run_id,
            batch = batch_index + 1,
            report = %output.report_path.display(),
            "Batch report analysed"
        );

        Ok(BatchResponse {
            run_id: run_id.to_string(),
            batch_index,
            is_complete: plan.is_final(&range),
            summary,
            progress: plan.progress(batch_index, &range),
        })
    }
}

#[async_trait]
impl BatchExecutor for RunsService {
    async fn execute_batch(
        &self,
        run_id: &str,
        batch_index: usize,
        batch_size: usize,
    ) -> Result<BatchResponse> {
        RunsService::execute_batch(self, run_id, batch_index, batch_size).await
    }
}
