//! Request and response bodies of the runs HTTP API

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{BatchSummary, Collection, TestCase};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub swagger_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateFromSpecRequest {
    pub spec: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub run_id: String,
    pub testcases: Vec<TestCase>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub run_id: String,
    pub collection: Collection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResponse {
    pub run_id: String,
    pub collection: Collection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCountResponse {
    pub run_id: String,
    pub total_tests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub run_id: String,
    pub summary: BatchSummary,
}

/// Body of `POST /api/runs/:runId/execute-batch`.
///
/// A missing `batchSize` means the server default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBatchRequest {
    #[serde(default)]
    pub batch_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub source: String,
}
