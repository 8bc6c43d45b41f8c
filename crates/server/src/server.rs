//! HTTP API

use std::net::SocketAddr;
use std::sync::Arc;

use apirun_common::api::{
    CollectionResponse, ErrorBody, ExecuteBatchRequest, ExecuteResponse, GenerateFromSpecRequest,
    GenerateRequest, GenerateResponse, MessageResponse, TestCountResponse, UpdateRequest,
};
use apirun_common::{BatchResponse, Error, RunSummaryRecord};
use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::service::RunsService;
use crate::worker::WorkerClient;

/// Shared handler state
pub struct AppState {
    pub service: Arc<RunsService>,
    /// Probed by `/health` when present
    pub worker: Option<WorkerClient>,
}

type SharedState = Arc<AppState>;

/// Error wrapper that renders as `{error, source}` with a mapped status
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Upstream { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self.0);
        } else {
            warn!(status = status.as_u16(), "{}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            source: self.0.source_label().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `Json` extractor whose rejections render as [`ApiError`]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(Error::InvalidRequest(rejection.body_text()))),
        }
    }
}

/// Build the application router
pub fn router(state: SharedState, max_body_bytes: usize) -> Router {
    let runs = Router::new()
        .route("/generate", post(generate_handler))
        .route("/generate-from-spec", post(generate_from_spec_handler))
        .route("/update", post(update_handler))
        .route("/:run_id", get(collection_handler))
        .route("/:run_id/count", get(count_handler))
        .route("/:run_id/summary", get(summary_handler))
        .route("/:run_id/execute", post(execute_handler))
        .route("/:run_id/execute-batch", post(execute_batch_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/runs", runs)
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(addr: SocketAddr, state: SharedState, max_body_bytes: usize) -> anyhow::Result<()> {
    let app = router(state, max_body_bytes);

    info!("apirun server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let worker = match &state.worker {
        None => json!(null),
        Some(worker) => match worker.health().await {
            Ok(_) => json!("ok"),
            Err(e) => json!(format!("unavailable: {}", e)),
        },
    };
    Json(json!({
        "status": "ok",
        "service": "apirun-server",
        "version": apirun_common::VERSION,
        "worker": worker,
    }))
}

async fn not_found_handler() -> ApiError {
    ApiError(Error::not_found("route", "requested path"))
}

async fn generate_handler(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> ApiResult<GenerateResponse> {
    Ok(Json(state.service.generate(&req.swagger_url).await?))
}

async fn generate_from_spec_handler(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<GenerateFromSpecRequest>,
) -> ApiResult<GenerateResponse> {
    Ok(Json(state.service.generate_from_spec(&req.spec).await?))
}

async fn update_handler(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<UpdateRequest>,
) -> ApiResult<MessageResponse> {
    Ok(Json(state.service.update(&req.run_id, req.collection).await?))
}

async fn collection_handler(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> ApiResult<CollectionResponse> {
    Ok(Json(state.service.collection(&run_id).await?))
}

async fn count_handler(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> ApiResult<TestCountResponse> {
    Ok(Json(state.service.test_count(&run_id).await?))
}

async fn summary_handler(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> ApiResult<RunSummaryRecord> {
    Ok(Json(state.service.summary(&run_id).await?))
}

async fn execute_handler(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> ApiResult<ExecuteResponse> {
    Ok(Json(state.service.execute(&run_id).await?))
}

/// The body is optional; an empty one means batch 0 at the default size.
async fn execute_batch_handler(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
    body: Bytes,
) -> ApiResult<BatchResponse> {
    let req: ExecuteBatchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ExecuteBatchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidRequest(format!("invalid execute-batch body: {}", e)))?
    };
    let batch_size = req
        .batch_size
        .unwrap_or_else(|| state.service.default_batch_size());

    let response = state
        .service
        .execute_batch(&run_id, req.batch_index, batch_size)
        .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_collection, FakeGenerator, TestHarness};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(h: &TestHarness) -> Router {
        let state = Arc::new(AppState {
            service: h.service.clone(),
            worker: None,
        });
        router(state, 10 * 1024 * 1024)
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let h = TestHarness::new().await;
        let (status, body) = call(app(&h), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "apirun-server");
    }

    #[tokio::test]
    async fn test_generate_then_fetch() {
        let h = TestHarness::new().await;
        let (status, body) = call(
            app(&h),
            Method::POST,
            "/api/runs/generate",
            Some(json!({"swaggerUrl": "http://petstore.local/openapi.json"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Testcases generated and stored");
        let run_id = body["runId"].as_str().unwrap().to_string();
        assert!(body["testcases"][0]["itemId"].is_string());

        let (status, body) = call(app(&h), Method::GET, &format!("/api/runs/{}", run_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["runId"], run_id.as_str());
        assert_eq!(body["collection"]["item"].as_array().unwrap().len(), 2);

        let (_, body) = call(app(&h), Method::GET, &format!("/api/runs/{}/count", run_id), None).await;
        assert_eq!(body["totalTests"], 2);
    }

    #[tokio::test]
    async fn test_execute_batch_defaults_and_past_end() {
        let h = TestHarness::new().await;
        h.seed("run", sample_collection(25)).await;

        let (status, body) = call(app(&h), Method::POST, "/api/runs/run/execute-batch", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["batchIndex"], 0);
        assert_eq!(body["isComplete"], false);
        assert_eq!(body["progress"]["currentBatch"], 1);
        assert_eq!(body["progress"]["totalBatches"], 3);
        assert_eq!(body["progress"]["testedSoFar"], 10);
        assert_eq!(body["summary"]["total"], 10);

        let (status, body) = call(
            app(&h),
            Method::POST,
            "/api/runs/run/execute-batch",
            Some(json!({"batchIndex": 7, "batchSize": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isComplete"], true);
        assert_eq!(body["summary"]["total"], 0);
        assert_eq!(body["progress"]["testedSoFar"], 25);
        assert_eq!(h.runner.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_update_then_execute_and_summary() {
        let h = TestHarness::new().await;
        let (status, body) = call(
            app(&h),
            Method::POST,
            "/api/runs/update",
            Some(json!({"runId": "edited", "collection": sample_collection(5)})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Testcases updated");

        let (status, body) = call(app(&h), Method::POST, "/api/runs/edited/execute", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["total"], 5);
        assert_eq!(body["summary"]["failed"], 1);
        assert_eq!(body["summary"]["failedEndpoints"][0]["endpoint"], "fail-4");

        let (status, body) = call(app(&h), Method::GET, "/api/runs/edited/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["passed"], 4);
        assert!(body["executedAt"].is_string());
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let h = TestHarness::new().await;

        let (status, body) = call(app(&h), Method::GET, "/api/runs/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["source"], "filesystem");
        assert!(body["error"].as_str().unwrap().contains("missing"));

        let (status, _) = call(app(&h), Method::GET, "/api/runs/missing/summary", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        h.seed("run", sample_collection(3)).await;
        let (status, body) = call(
            app(&h),
            Method::POST,
            "/api/runs/run/execute-batch",
            Some(json!({"batchSize": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["source"], "request");

        h.runner.fail_on("run");
        let (status, body) = call(app(&h), Method::POST, "/api/runs/run/execute", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["source"], "newman");
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_400_json() {
        let h = TestHarness::new().await;

        let (status, body) = call(app(&h), Method::POST, "/api/runs/generate", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["source"], "request");
        assert!(body["error"].as_str().unwrap().contains("swaggerUrl"));

        let (status, body) = call(
            app(&h),
            Method::POST,
            "/api/runs/update",
            Some(json!({"runId": "run", "collection": "not a collection"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["source"], "request");

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/runs/generate-from-spec")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app(&h).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["source"], "request");

        assert!(h.generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_worker_unavailable_is_503() {
        let h = TestHarness::with_generator(FakeGenerator::unavailable()).await;
        let (status, body) = call(
            app(&h),
            Method::POST,
            "/api/runs/generate-from-spec",
            Some(json!({"spec": {"openapi": "3.0.0"}})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["source"], "connection");
    }

    #[test]
    fn test_upstream_status_passthrough() {
        let err = ApiError(Error::upstream("worker", Some(422), "bad spec"));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let err = ApiError(Error::Internal("boom".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
