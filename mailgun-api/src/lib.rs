pub mod auth;
pub mod error;
pub mod routes;

pub use auth::ClientRegistry;
pub use error::ApiError;
pub use routes::{router, AppState};

use tower_http::cors::CorsLayer;

/// Build the full app: routes plus a permissive CORS layer (the spec
/// names no cross-origin requirements; this mirrors the teacher's other
/// HTTP surfaces, which default to permissive CORS for JSON APIs).
#[must_use]
pub fn app(state: AppState) -> axum::Router {
    router(state).layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use mailgun_common::{FakeClock, Shard};
    use mailgun_queue::QueueProxy;
    use mailgun_store::MemoryStore;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store = MemoryStore::new(Shard::default(), FakeClock::new(1_000));
        let (proxy, _handle) = QueueProxy::spawn(store);
        AppState {
            submission: mailgun_submission::SubmissionAdapter::new(proxy.clone()),
            aggregator: mailgun_submission::StatusAggregator::new(proxy),
            clients: Arc::new(ClientRegistry::new(HashSet::from(["C".to_string()]))),
        }
    }

    async fn post_json(app: axum::Router, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn unknown_client_is_unauthorized() {
        let app = app(test_state());
        let (status, _) = post_json(
            app,
            "/send",
            serde_json::json!({
                "client_id": "nope", "sender": "s@e.com", "recipients": ["a@a.com"],
                "subject": "t", "body": "b"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn send_then_status_roundtrip() {
        let app = app(test_state());
        let (status, body) = post_json(
            app.clone(),
            "/send",
            serde_json::json!({
                "client_id": "C", "sender": "s@e.com", "recipients": ["a@a.com"],
                "subject": "t", "body": "b"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let submission_id = body["submission_id"].as_str().unwrap().to_string();

        let (status, body) = post_json(
            app,
            "/status",
            serde_json::json!({ "client_id": "C", "submission_id": submission_id }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "success");
        assert_eq!(body["status"], "queued");
    }

    #[tokio::test]
    async fn missing_field_is_bad_request() {
        let app = app(test_state());
        let (status, _) = post_json(
            app,
            "/send",
            serde_json::json!({ "client_id": "C", "recipients": ["a@a.com"], "subject": "t", "body": "b" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let app = app(test_state());
        let (status, _) = post_json(app, "/nope", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cross_client_status_is_an_error_body_not_http_error() {
        // A client registry recognising both C and D, backed by one shared store.
        let mut known = HashSet::from(["C".to_string()]);
        known.insert("D".to_string());
        let store = MemoryStore::new(Shard::default(), FakeClock::new(1_000));
        let (proxy, _handle) = QueueProxy::spawn(store);
        let shared_state = AppState {
            submission: mailgun_submission::SubmissionAdapter::new(proxy.clone()),
            aggregator: mailgun_submission::StatusAggregator::new(proxy),
            clients: Arc::new(ClientRegistry::new(known)),
        };
        let app = app(shared_state.clone());
        let (status, body) = post_json(
            app.clone(),
            "/send",
            serde_json::json!({
                "client_id": "C", "sender": "s@e.com", "recipients": ["a@a.com"],
                "subject": "t", "body": "b"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let submission_id = body["submission_id"].as_str().unwrap().to_string();

        let (status, body) = post_json(
            app,
            "/status",
            serde_json::json!({ "client_id": "D", "submission_id": submission_id }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "error");
    }
}
