//! End-to-end limiter behavior through the axum middleware stack.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use hearth_gateway::rate_limit::{RateLimitPolicy, RateLimitState, rate_limit};
use hearth_gateway::store::MemoryStore;

fn app(state: RateLimitState) -> Router {
    Router::new()
        .route("/api/listings", get(|| async { "[]" }))
        .layer(from_fn_with_state(state, rate_limit))
}

fn request_from(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/listings")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

fn header_u64(response: &axum::response::Response, name: &str) -> u64 {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| panic!("missing or invalid header {name}"))
}

#[tokio::test]
async fn quota_admits_then_rejects_with_structured_429() {
    let store = Arc::new(MemoryStore::new());
    let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 3, "Slow down");
    let app = app(RateLimitState::new(policy, store));

    for expected_remaining in [2u64, 1, 0] {
        let response = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_u64(&response, "x-ratelimit-limit"), 3);
        assert_eq!(
            header_u64(&response, "x-ratelimit-remaining"),
            expected_remaining
        );
        assert_eq!(header_u64(&response, "x-ratelimit-window"), 60_000);
        assert!(header_u64(&response, "x-ratelimit-reset") > 0);
    }

    let denied = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_u64(&denied, "x-ratelimit-remaining"), 0);

    let bytes = denied.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["error"]["message"], "Slow down");
    assert_eq!(body["error"]["details"]["limit"], 3);
    assert_eq!(body["error"]["details"]["windowMs"], 60_000);
    assert_eq!(body["error"]["details"]["remainingRequests"], 0);
    assert_eq!(body["path"], "/api/listings");
    assert!(body["error"]["details"]["resetTime"].is_string());
}

#[tokio::test]
async fn clients_are_limited_independently() {
    let store = Arc::new(MemoryStore::new());
    let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 1, "limited");
    let app = app(RateLimitState::new(policy, store));

    assert_eq!(
        app.clone()
            .oneshot(request_from("1.2.3.4"))
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );
    assert_eq!(
        app.clone()
            .oneshot(request_from("1.2.3.4"))
            .await
            .unwrap()
            .status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    // an exhausted neighbor does not affect a fresh client
    assert_eq!(
        app.clone()
            .oneshot(request_from("5.6.7.8"))
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn window_elapse_readmits() {
    let store = Arc::new(MemoryStore::new());
    let policy = RateLimitPolicy::new("test", Duration::from_millis(100), 1, "limited");
    let app = app(RateLimitState::new(policy, store));

    assert_eq!(
        app.clone()
            .oneshot(request_from("1.2.3.4"))
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );
    assert_eq!(
        app.clone()
            .oneshot(request_from("1.2.3.4"))
            .await
            .unwrap()
            .status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(
        app.clone()
            .oneshot(request_from("1.2.3.4"))
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn store_outage_fails_open() {
    let store = Arc::new(MemoryStore::new());
    let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 1, "limited");
    let app = app(RateLimitState::new(policy, store.clone()));

    store.set_unavailable(true);
    for _ in 0..5 {
        let response = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // synthesized headers still tell the client its nominal budget
        assert_eq!(header_u64(&response, "x-ratelimit-limit"), 1);
    }
}

#[tokio::test]
async fn skip_condition_bypasses_the_limiter() {
    let store = Arc::new(MemoryStore::new());
    let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 1, "limited")
        .skip_if(|req| req.headers().contains_key("x-internal"));
    let app = app(RateLimitState::new(policy, store));

    for _ in 0..5 {
        let mut req = request_from("1.2.3.4");
        req.headers_mut()
            .insert("x-internal", "1".parse().unwrap());
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // skipped requests carry no quota headers
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn config_kill_switch_disables_enforcement() {
    use hearth_gateway::config::RateLimitSettings;

    let store = Arc::new(MemoryStore::new());
    let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 1, "limited");
    let settings = RateLimitSettings { enabled: false };
    let app = app(RateLimitState::from_config(policy, store, &settings));

    for _ in 0..5 {
        let response = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn disabled_state_is_a_pass_through() {
    let store = Arc::new(MemoryStore::new());
    let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 1, "limited");
    let state = RateLimitState::new(policy, store).with_enabled(false);
    let app = app(state);

    for _ in 0..5 {
        let response = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn denial_hook_fires_with_the_subject() {
    use std::sync::Mutex;

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let store = Arc::new(MemoryStore::new());
    let policy = RateLimitPolicy::new("test", Duration::from_secs(60), 1, "limited")
        .on_limit_reached(move |_req, subject| {
            sink.lock().unwrap().push(subject.to_string());
        });
    let app = app(RateLimitState::new(policy, store));

    app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
    app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();

    assert_eq!(seen.lock().unwrap().as_slice(), ["ip:1.2.3.4"]);
}
