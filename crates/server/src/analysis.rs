//! Report analysis backends

use apirun_common::{summarize_report, BatchSummary, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Summarises a runner report into pass/fail counts
#[async_trait]
pub trait ReportAnalyzer: Send + Sync {
    async fn analyze(&self, report: &Value) -> Result<BatchSummary>;
}

/// In-process analyzer over Newman's JSON report
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAnalyzer;

#[async_trait]
impl ReportAnalyzer for LocalAnalyzer {
    async fn analyze(&self, report: &Value) -> Result<BatchSummary> {
        Ok(summarize_report(report))
    }
}
