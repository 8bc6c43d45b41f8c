//! Worker service client
//!
//! The worker parses OpenAPI documents, generates test cases with an LLM,
//! compiles them into a Postman collection and summarises runner reports.
//! This module only speaks its HTTP protocol.

use std::time::Duration;

use apirun_common::{BatchSummary, Collection, Error, Result, TestCase};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::analysis::ReportAnalyzer;
use crate::config::WorkerConfig;

const SERVICE: &str = "worker";

/// Output of test generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTests {
    #[serde(default)]
    pub testcases: Vec<TestCase>,
    pub collection: Collection,
}

/// Turns an API description into test cases and a runnable collection
#[async_trait]
pub trait TestGenerator: Send + Sync {
    /// Fetch and parse the document at `swagger_url`
    async fn parse_swagger_url(&self, swagger_url: &str) -> Result<Value>;

    /// Parse an inline document
    async fn parse_swagger_spec(&self, spec: &Value) -> Result<Value>;

    /// Generate test cases and their collection from a parsed document
    async fn generate_tests(&self, parsed: &Value) -> Result<GeneratedTests>;
}

/// HTTP client for the worker
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
}

impl WorkerClient {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            health_timeout: config.health_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Worker health endpoint
    pub async fn health(&self) -> Result<Value> {
        let url = format!("{}/health", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(send_error)?;
        decode(resp).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(send_error)?;
        decode(resp).await
    }
}

/// Connection failures and timeouts mean the worker is unavailable
fn send_error(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() {
        warn!("worker unreachable: {}", e);
        Error::unavailable(SERVICE, e)
    } else {
        Error::upstream(SERVICE, e.status().map(|s| s.as_u16()), e.to_string())
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = error_message(&text).unwrap_or_else(|| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });
        warn!("worker returned {}: {}", status, message);
        return Err(Error::upstream(SERVICE, Some(status.as_u16()), message));
    }
    resp.json::<T>()
        .await
        .map_err(|e| Error::upstream(SERVICE, None, format!("invalid response body: {}", e)))
}

/// Pull a human-readable message out of an error body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| match value.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
}

#[async_trait]
impl TestGenerator for WorkerClient {
    async fn parse_swagger_url(&self, swagger_url: &str) -> Result<Value> {
        self.post("/parse-swagger", &json!({ "swaggerUrl": swagger_url }))
            .await
    }

    async fn parse_swagger_spec(&self, spec: &Value) -> Result<Value> {
        self.post("/parse-swagger-spec", &json!({ "spec": spec })).await
    }

    async fn generate_tests(&self, parsed: &Value) -> Result<GeneratedTests> {
        self.post("/generate-tests", &json!({ "parsed": parsed })).await
    }
}

#[async_trait]
impl ReportAnalyzer for WorkerClient {
    async fn analyze(&self, report: &Value) -> Result<BatchSummary> {
        self.post("/analyze-report", &json!({ "report": report })).await
    }
}
