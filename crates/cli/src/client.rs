//! HTTP client for the apirun server

use std::time::Duration;

use apirun_common::api::{
    CollectionResponse, ErrorBody, ExecuteBatchRequest, ExecuteResponse, GenerateFromSpecRequest,
    GenerateRequest, GenerateResponse, MessageResponse, TestCountResponse, UpdateRequest,
};
use apirun_common::{BatchExecutor, BatchResponse, Collection, Error, Result, RunSummaryRecord};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

const SERVICE: &str = "apirun-server";

/// Client for communicating with the apirun server
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client. Generation and whole-run execution can take
    /// minutes, so `timeout` should be generous.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::unavailable(SERVICE, e)
            } else {
                Error::upstream(SERVICE, None, e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(error_from_response(status, &text));
        }
        resp.json::<T>()
            .await
            .map_err(|e| Error::upstream(SERVICE, None, format!("invalid response body: {}", e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn health(&self) -> Result<Value> {
        self.get("/health").await
    }

    pub async fn generate(&self, swagger_url: &str) -> Result<GenerateResponse> {
        let body = GenerateRequest {
            swagger_url: swagger_url.to_string(),
        };
        self.post("/api/runs/generate", &body).await
    }

    pub async fn generate_from_spec(&self, spec: Value) -> Result<GenerateResponse> {
        self.post("/api/runs/generate-from-spec", &GenerateFromSpecRequest { spec })
            .await
    }

    pub async fn update(&self, run_id: &str, collection: Collection) -> Result<MessageResponse> {
        let body = UpdateRequest {
            run_id: run_id.to_string(),
            collection,
        };
        self.post("/api/runs/update", &body).await
    }

    pub async fn collection(&self, run_id: &str) -> Result<CollectionResponse> {
        self.get(&format!("/api/runs/{}", run_id)).await
    }

    pub async fn test_count(&self, run_id: &str) -> Result<TestCountResponse> {
        self.get(&format!("/api/runs/{}/count", run_id)).await
    }

    pub async fn summary(&self, run_id: &str) -> Result<RunSummaryRecord> {
        self.get(&format!("/api/runs/{}/summary", run_id)).await
    }

    pub async fn execute(&self, run_id: &str) -> Result<ExecuteResponse> {
        self.post(&format!("/api/runs/{}/execute", run_id), &Value::Null)
            .await
    }
}

#[async_trait]
impl BatchExecutor for ApiClient {
    async fn execute_batch(
        &self,
        run_id: &str,
        batch_index: usize,
        batch_size: usize,
    ) -> Result<BatchResponse> {
        let body = ExecuteBatchRequest {
            batch_index,
            batch_size: Some(batch_size),
        };
        self.post(&format!("/api/runs/{}/execute-batch", run_id), &body)
            .await
    }
}

/// Rebuild a server-side error from its status and `{error, source}` body
fn error_from_response(status: StatusCode, text: &str) -> Error {
    let (message, source) = match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => (body.error, body.source),
        Err(_) if text.is_empty() => (status.to_string(), SERVICE.to_string()),
        Err(_) => (text.to_string(), SERVICE.to_string()),
    };
    match status {
        StatusCode::BAD_REQUEST => Error::InvalidRequest(message),
        StatusCode::SERVICE_UNAVAILABLE => Error::unavailable(source, message),
        StatusCode::NOT_FOUND => match parse_not_found(&message) {
            Some((kind, id)) => Error::not_found(kind, id),
            None => Error::upstream(source, Some(status.as_u16()), message),
        },
        _ => Error::upstream(source, Some(status.as_u16()), message),
    }
}

/// Split "Resource not found: <kind> with id <id>" back into its parts
fn parse_not_found(message: &str) -> Option<(&str, &str)> {
    message
        .strip_prefix("Resource not found: ")?
        .split_once(" with id ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_is_preserved() {
        let err = error_from_response(
            StatusCode::NOT_FOUND,
            r#"{"error": "Resource not found: collection with id abc", "source": "filesystem"}"#,
        );
        match err {
            Error::NotFound { kind, id } => {
                assert_eq!(kind, "collection");
                assert_eq!(id, "abc");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            error_from_response(
                StatusCode::NOT_FOUND,
                r#"{"error": "Resource not found: summary with id run-1", "source": "filesystem"}"#,
            )
            .to_string(),
            "Resource not found: summary with id run-1"
        );
    }

    #[test]
    fn test_unrecognised_404_stays_upstream() {
        assert!(matches!(
            error_from_response(StatusCode::NOT_FOUND, "no route"),
            Error::Upstream { status: Some(404), .. }
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            error_from_response(StatusCode::BAD_REQUEST, r#"{"error": "bad", "source": "request"}"#),
            Error::InvalidRequest(m) if m == "bad"
        ));
        assert!(matches!(
            error_from_response(StatusCode::SERVICE_UNAVAILABLE, "{}"),
            Error::UpstreamUnavailable { .. }
        ));
        assert!(matches!(
            error_from_response(StatusCode::BAD_GATEWAY, ""),
            Error::Upstream { status: Some(502), .. }
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable { .. }));
    }
}
