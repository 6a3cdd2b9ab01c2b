//! HTTP API for the assistant service.
//!
//! This module provides:
//! - Health and metrics monitoring
//! - Init-data login and bearer-token authentication
//! - REST endpoints for tasks, finance, recurring payments and credits
//! - The live event channel upgrade at `/ws`

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{FromRequestParts, Query, State, WebSocketUpgrade},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::auth::TokenAuthority;
use crate::db::UserId;
use crate::error::{ServiceError, ServiceResult};
use crate::service::AssistantService;
use crate::websocket::handlers::handle_ws_connection;

pub mod auth;
pub mod credits;
pub mod finance;
pub mod todos;

/// Application state
pub struct AppState {
    pub service: Arc<AssistantService>,
    pub tokens: TokenAuthority,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
    /// Needed to verify Web App init data; login is refused without it
    pub bot_token: Option<String>,
    pub init_data_max_age: Duration,
}

/// Caller identified by a valid bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ServiceError::Unauthorized {
                    message: "Missing bearer token".to_string(),
                })?;

        let user_id = state.tokens.validate(bearer.token())?;
        Ok(AuthUser(user_id))
    }
}

/// Build the API router
pub fn router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/auth", post(auth::login_handler))
        .route("/user/me", get(auth::me_handler))
        // Tasks
        .route(
            "/todos",
            get(todos::list_todos_handler).post(todos::create_todo_handler),
        )
        .route("/todos/{id}", delete(todos::delete_todo_handler))
        // Finance
        .route(
            "/finance",
            get(finance::list_entries_handler).post(finance::create_entry_handler),
        )
        .route("/finance/stats", get(finance::stats_handler))
        .route(
            "/finance/recurring",
            get(finance::list_recurring_handler).post(finance::create_recurring_handler),
        )
        .route(
            "/finance/recurring/{id}",
            delete(finance::delete_recurring_handler),
        )
        // Credits
        .route(
            "/credits",
            get(credits::list_credits_handler).post(credits::create_credit_handler),
        )
        .route("/credits/{id}", delete(credits::delete_credit_handler))
        .route("/credits/{id}/copy", post(credits::copy_credit_handler))
        .route("/credits/{id}/schedule", get(credits::schedule_handler))
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        live_clients: state.service.hub().client_count().await,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    live_clients: usize,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

// === Live channel ===

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> ServiceResult<Response> {
    let token = params.token.ok_or_else(|| ServiceError::Unauthorized {
        message: "Missing token".to_string(),
    })?;
    let owner = state.tokens.validate(&token)?;

    debug!(user_id = owner, "Live channel upgrade accepted");
    let hub = state.service.hub().clone();
    Ok(ws.on_upgrade(move |socket| handle_ws_connection(socket, hub, owner)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::service::test_support::service;

    pub const BOT_TOKEN: &str = "123456:TEST-TOKEN";

    pub fn state() -> Arc<AppState> {
        Arc::new(AppState {
            service: service(),
            tokens: TokenAuthority::new("api-secret", Duration::from_secs(3600)).unwrap(),
            start_time: Instant::now(),
            metrics: None,
            bot_token: Some(BOT_TOKEN.to_string()),
            init_data_max_age: Duration::from_secs(86400),
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::Request;

    use super::test_support::state;
    use super::*;

    async fn extract(state: &Arc<AppState>, authorization: Option<&str>) -> ServiceResult<AuthUser> {
        let mut builder = Request::builder().uri("/api/todos");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn test_bearer_extraction() {
        let state = state();
        let token = state.tokens.mint(31).unwrap();

        let user = extract(&state, Some(&format!("Bearer {}", token))).await.unwrap();
        assert_eq!(user, AuthUser(31));

        let missing = extract(&state, None).await.unwrap_err();
        assert_eq!(missing.into_response().status(), StatusCode::UNAUTHORIZED);

        let forged = extract(&state, Some("Bearer abc.def")).await.unwrap_err();
        assert_eq!(forged.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_reports_live_clients() {
        let state = state();
        let Json(health) = health_handler(State(state)).await;

        assert_eq!(health.status, "ok");
        assert_eq!(health.live_clients, 0);
    }

    #[tokio::test]
    async fn test_metrics_without_exporter() {
        let response = metrics_handler(State(state())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"metrics exporter not installed");
    }
}
