//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (one game session per connection)
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/rules", get(http::http_get_rules))
        .route("/api/v1/game", post(http::http_new_game))
        .route("/api/v1/game/:id", get(http::http_get_game).delete(http::http_delete_game))
        .route("/api/v1/game/:id/text", post(http::http_post_text))
        .route("/api/v1/game/:id/guess", post(http::http_post_guess))
        .route("/api/v1/game/:id/next", post(http::http_post_next))
        .route("/api/v1/game/:id/reset", post(http::http_post_reset))
        .route("/api/v1/game/:id/difficulty", post(http::http_post_difficulty))
        .route("/api/v1/backends", get(http::http_get_backends))
        .route("/api/v1/backends/select", post(http::http_post_select_backend))
        .route("/api/v1/backends/api_key", post(http::http_post_api_key))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::backend::testing::ScriptedFactory;
    use crate::config::GameConfig;
    use crate::topics::TopicOrder;

    fn router(f: &Arc<ScriptedFactory>) -> Router {
        let mut cfg = GameConfig::default();
        cfg.topics.normal = vec!["桜".into(), "猫".into()];
        cfg.game.topic_order = TopicOrder::Sequential;
        build_router(Arc::new(AppState::with_factory(cfg, f.clone())))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, v)
    }

    #[tokio::test]
    async fn full_round_over_http() {
        let f = ScriptedFactory::new(true, false);
        f.local.push(Ok("OK"));
        f.local.push(Ok("答えは桜です"));
        let app = router(&f);

        let (status, created) = call(&app, "POST", "/api/v1/game", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["sessionId"].as_str().unwrap().to_string();
        assert_eq!(created["state"]["secretTopic"], "桜");

        let (_, st) = call(&app, "POST", &format!("/api/v1/game/{id}/text"), Some(json!({ "text": "春に咲く花" }))).await;
        assert_eq!(st["state"]["userText"], "春に咲く花");

        let (status, st) = call(&app, "POST", &format!("/api/v1/game/{id}/guess"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(st["state"]["outcome"], "correct");
        assert_eq!(st["state"]["score"], 1);
        assert_eq!(st["state"]["attempts"], 1);

        let (_, st) = call(&app, "POST", &format!("/api/v1/game/{id}/next"), None).await;
        assert_eq!(st["state"]["secretTopic"], "猫");
        assert_eq!(st["state"]["outcome"], "unknown");

        let (_, st) = call(&app, "POST", &format!("/api/v1/game/{id}/difficulty"), Some(json!({ "difficulty": "hard" }))).await;
        assert_eq!(st["state"]["difficulty"], "hard");
        assert_eq!(st["state"]["score"], 1);

        let (_, st) = call(&app, "POST", &format!("/api/v1/game/{id}/reset"), None).await;
        assert_eq!(st["state"]["score"], 0);
        assert_eq!(st["state"]["attempts"], 0);

        let (status, _) = call(&app, "DELETE", &format!("/api/v1/game/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, err) = call(&app, "GET", &format!("/api/v1/game/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(err["error"].as_str().unwrap().contains("Unknown session"));
    }

    #[tokio::test]
    async fn malformed_optional_bodies_are_rejected() {
        let f = ScriptedFactory::new(true, false);
        let app = router(&f);

        let (status, _) = call(&app, "POST", "/api/v1/game", Some(json!({ "difficulty": "impossible" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, created) = call(&app, "POST", "/api/v1/game", Some(json!({ "difficulty": "hard" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["state"]["difficulty"], "hard");
        let id = created["sessionId"].as_str().unwrap().to_string();

        call(&app, "POST", &format!("/api/v1/game/{id}/text"), Some(json!({ "text": "春に咲く花" }))).await;
        let (status, err) = call(&app, "POST", &format!("/api/v1/game/{id}/guess"), Some(json!({ "text": 5 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(err["error"].as_str().unwrap().contains("Malformed"));
        assert_eq!(f.local.calls(), 0);

        let (_, st) = call(&app, "GET", &format!("/api/v1/game/{id}"), None).await;
        assert_eq!(st["state"]["attempts"], 0);
    }

    #[tokio::test]
    async fn backend_endpoints() {
        let f = ScriptedFactory::new(false, false);
        let app = router(&f);

        let (_, v) = call(&app, "GET", "/api/v1/backends", None).await;
        assert_eq!(v["available"], json!([]));
        assert_eq!(v["preference"], json!(["local_model", "hosted_model"]));

        let (status, _) = call(&app, "POST", "/api/v1/backends/select", Some(json!({ "kind": "hosted_model" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, v) = call(&app, "POST", "/api/v1/backends/api_key", Some(json!({ "apiKey": "sk-1" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["active"], "hosted_model");
    }

    #[tokio::test]
    async fn health_and_rules() {
        let f = ScriptedFactory::new(true, true);
        let app = router(&f);
        let (_, v) = call(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(v["ok"], true);
        let (_, v) = call(&app, "GET", "/api/v1/rules", None).await;
        assert_eq!(v["steps"].as_array().unwrap().len(), 4);
    }
}
