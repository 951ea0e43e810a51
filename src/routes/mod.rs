//! HTTP surface
//!
//! Router construction, shared state, and the bearer-token gate in front
//! of the run endpoint.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::pipeline::Pipeline;

mod health;
mod run;

/// Shared state available to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<Pipeline>,
}

/// Build the application router with all middleware layers
pub fn create_router(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = state.config.request_timeout();
    let max_concurrent = state.config.server.max_concurrent_requests;

    let protected = Router::new()
        .route("/api/v1/run", post(run::run))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(move || async move { metrics_handle.render() }))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state)
}

/// Bearer-token gate: a missing or malformed header is 401, a present
/// but wrong token is 403.
async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized {
            message: "missing Authorization header".to_string(),
        })?;

    let token = extract_bearer(header_value).ok_or_else(|| AppError::Unauthorized {
        message: "expected a Bearer token".to_string(),
    })?;

    if token != state.config.auth.team_token {
        return Err(AppError::InvalidToken);
    }

    Ok(next.run(request).await)
}

fn extract_bearer(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunker;
    use crate::config::{AuthConfig, ChunkingConfig, LlmConfig, RetrievalConfig};
    use crate::embeddings::MockEmbedder;
    use crate::errors::Result;
    use crate::fetch::DocumentFetcher;
    use crate::index::{InMemoryIndex, ScoreMetric};
    use crate::llm::{CompletionParams, OfflineLlm};
    use crate::reasoner::Synthesizer;
    use crate::retriever::Retriever;
    use crate::store::NoopChunkStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DocumentFetcher for CountingFetcher {
        async fn fetch_text(&self, _url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Knee surgery is covered after a waiting period of two years.".to_string())
        }
    }

    fn test_app(token: &str) -> (Router, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let retriever = Retriever::new(
            Arc::new(MockEmbedder::new(64)),
            Some(Arc::new(InMemoryIndex::new())),
            ScoreMetric::CosineSimilarity,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        let synthesizer = Synthesizer::new(
            Arc::new(OfflineLlm),
            CompletionParams::from(&LlmConfig::default()),
            Duration::from_secs(5),
        );
        let pipeline = Pipeline::new(
            Arc::new(CountingFetcher {
                calls: calls.clone(),
            }),
            Chunker::new().unwrap(),
            retriever,
            synthesizer,
            Arc::new(NoopChunkStore),
            ChunkingConfig::default(),
            RetrievalConfig::default(),
        );

        let config = AppConfig {
            auth: AuthConfig {
                team_token: token.to_string(),
            },
            ..AppConfig::default()
        };
        let state = AppState {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        };
        let handle = PrometheusBuilder::new().build_recorder().handle();
        (create_router(state, handle), calls)
    }

    fn run_request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/run")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder
            .body(Body::from(
                r#"{"documents": "https://example.com/policy.txt", "questions": ["Is knee surgery covered?"]}"#,
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_header_is_401_without_pipeline_work() {
        let (app, calls) = test_app("secret");
        let response = app.oneshot(run_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_token_is_403_without_pipeline_work() {
        let (app, calls) = test_app("secret");
        let response = app
            .oneshot(run_request(Some("Bearer wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_is_401() {
        let (app, calls) = test_app("secret");
        let response = app
            .oneshot(run_request(Some("Basic secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_token_runs_the_pipeline_once() {
        let (app, calls) = test_app("secret");
        let response = app
            .oneshot(run_request(Some("Bearer secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["answers"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (app, _) = test_app("secret");
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("Bearer  spaced "), Some("spaced"));
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer("bearer abc123"), None);
        assert_eq!(extract_bearer(""), None);
    }
}
