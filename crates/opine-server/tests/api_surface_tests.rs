//! Router-level tests for the HTTP surface: middleware, auth gating, and
//! parameter validation.
//!
//! These run against a state whose database pool is lazy and never
//! checked out; every asserted path rejects or responds before reaching
//! the database.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use opine_analytics::AnalyticsEngine;
use opine_auth::TokenService;
use opine_cache::MemoryCache;
use opine_core::config::RateLimitTiers;
use opine_core::AppConfig;
use opine_db::admin::AdminMutator;
use opine_db::analytics::AnalyticsStore;
use opine_db::annotations::AnnotationRepo;
use opine_db::audit::AuditRepo;
use opine_db::batches::BatchRepo;
use opine_db::conversations::ConversationRepo;
use opine_db::feedback::FeedbackRepo;
use opine_db::topics::TopicRepo;
use opine_ingest::IngestPipeline;
use opine_qa::{HttpLlmClient, LiveToolbox, QaAgent};
use opine_queue::MemoryJobQueue;
use opine_server::middleware::rate_limit::RateLimiter;
use opine_server::{app, AppState};
use opine_vector::MemoryVectorIndex;
use tower::ServiceExt;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgresql://127.0.0.1:1/opine_test".to_string(),
        token_secret: "a-test-secret-with-enough-length".to_string(),
        ..AppConfig::default()
    }
}

fn build_state(config: AppConfig) -> AppState {
    let pool = opine_db::connect_lazy(&config).expect("lazy pool");
    let cache = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let vector = Arc::new(MemoryVectorIndex::new());

    let feedback = FeedbackRepo::new(pool.clone());
    let store = AnalyticsStore::new(pool.clone());
    let analytics = AnalyticsEngine::new(Arc::new(store.clone()), cache.clone());
    let toolbox = Arc::new(LiveToolbox::new(
        analytics.clone(),
        vector,
        feedback.clone(),
    ));
    let llm = Arc::new(HttpLlmClient::new("http://127.0.0.1:1", None));

    AppState {
        config: Arc::new(config.clone()),
        pool: pool.clone(),
        ingest: IngestPipeline::new(
            feedback.clone(),
            BatchRepo::new(pool.clone()),
            queue.clone(),
            false,
        ),
        analytics,
        store,
        feedback,
        annotations: AnnotationRepo::new(pool.clone()),
        topics: TopicRepo::new(pool.clone()),
        audit: AuditRepo::new(pool.clone()),
        batches: BatchRepo::new(pool.clone()),
        conversations: ConversationRepo::new(pool.clone()),
        admin: AdminMutator::new(pool),
        cache,
        queue,
        tokens: Arc::new(TokenService::new(
            &config.token_secret,
            config.token_lifetime_secs,
        )),
        qa: Arc::new(QaAgent::new(llm, toolbox)),
        limiter: Arc::new(RateLimiter::new(config.rate_limits)),
    }
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

fn post_json(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

#[tokio::test]
async fn test_healthz_returns_ok() {
    let router = app(build_state(test_config()));
    let response = router.oneshot(get("/healthz")).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let router = app(build_state(test_config()));
    let response = router.oneshot(get("/healthz")).await.expect("response");

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("request id header");
    assert!(uuid::Uuid::parse_str(request_id.to_str().expect("str")).is_ok());
}

#[tokio::test]
async fn test_client_request_id_is_kept() {
    let router = app(build_state(test_config()));
    let id = uuid::Uuid::new_v4();
    let request = Request::builder()
        .uri("/healthz")
        .header("x-request-id", id.to_string())
        .body(Body::empty())
        .expect("request");
    let response = router.oneshot(request).await.expect("response");

    assert_eq!(
        response.headers().get("x-request-id").expect("header").to_str().expect("str"),
        id.to_string()
    );
}

#[tokio::test]
async fn test_admin_login_issues_token() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(post_json(
            "/admin/login",
            r#"{"username":"admin","password":"admin"}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("access_token"));
    assert!(body.contains("\"role\":\"admin\""));
}

#[tokio::test]
async fn test_bad_credentials_rejected() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(post_json(
            "/admin/login",
            r#"{"username":"admin","password":"wrong"}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_mutation_requires_token() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(post_json(
            "/admin/relabel-topic",
            r#"{"topic_id":1,"new_label":"Delivery","new_keywords":[]}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_viewer_token_cannot_mutate() {
    let state = build_state(test_config());
    let viewer_token = state
        .tokens
        .issue("viewer", opine_auth::Role::Viewer)
        .expect("token");
    let router = app(state);

    let request = Request::builder()
        .method("POST")
        .uri("/admin/relabel-topic")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {viewer_token}"))
        .body(Body::from(
            r#"{"topic_id":1,"new_label":"Delivery","new_keywords":[]}"#,
        ))
        .expect("request");
    let response = router.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let router = app(build_state(test_config()));
    let request = Request::builder()
        .uri("/admin/stats")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .expect("request");
    let response = router.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rate_limit_trips_and_hints_retry() {
    let config = AppConfig {
        rate_limits: RateLimitTiers {
            general_per_min: 2,
            ..RateLimitTiers::default()
        },
        ..test_config()
    };
    let router = app(build_state(config));

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(get("/healthz"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-RateLimit-Limit"));
        assert!(response.headers().contains_key("X-RateLimit-Remaining"));
        assert!(response.headers().contains_key("X-RateLimit-Reset"));
    }

    let response = router.oneshot(get("/healthz")).await.expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_analytics_bad_group_by_rejected() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(get("/analytics/sentiment-trends?group_by=year"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_string(response).await.contains("group_by"));
}

#[tokio::test]
async fn test_analytics_threshold_out_of_range_rejected() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(get("/analytics/toxicity?threshold=1.5"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_examples_limit_cap_rejected() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(get("/analytics/examples?limit=51"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_inverted_date_range_rejected_on_alias_prefix() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(get("/api/summary?start_date=2024-02-01&end_date=2024-01-01"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_ingest_empty_body_rejected() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(post_json(
            "/ingest/feedback",
            r#"{"source":"website","body":"   "}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_chat_empty_question_rejected() {
    let router = app(build_state(test_config()));
    let response = router
        .oneshot(post_json("/chat/query", r#"{"question":"  "}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_chat_oversized_question_rejected() {
    let router = app(build_state(test_config()));
    let question = "x".repeat(1_001);
    let body = serde_json::json!({ "question": question }).to_string();
    let response = router
        .oneshot(post_json("/chat/query", &body))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_metrics_hidden_when_disabled() {
    let router = app(build_state(test_config()));
    let response = router.oneshot(get("/metrics")).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_served_when_enabled() {
    let config = AppConfig {
        metrics_enabled: true,
        ..test_config()
    };
    let router = app(build_state(config));
    let response = router.oneshot(get("/metrics")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let router = app(build_state(test_config()));
    let response = router.oneshot(get("/nope")).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
