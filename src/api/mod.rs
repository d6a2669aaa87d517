//! HTTP API for the dashboard
//!
//! A small REST surface under `/api`, reading and mutating the same store
//! document the engine uses. Every request gets its own [`Store`] value;
//! concurrent writers are serialised by the transport's SHA precondition.
//! All responses, including errors and preflight, carry the CORS envelope.

pub mod handlers;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::client::NetworkApi;
use crate::config::Config;
use crate::error::StoreError;
use crate::store::{ContentStore, Store};

/// Shared state for the API handlers
pub struct AppState {
    pub config: Config,
    pub transport: Arc<dyn ContentStore>,
    pub network: Arc<dyn NetworkApi>,
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/watchlist",
            get(handlers::list_watchlist).post(handlers::add_watchlist),
        )
        .route(
            "/api/watchlist/{cid}",
            axum::routing::delete(handlers::remove_watchlist),
        )
        .route("/api/audit/run", post(handlers::run_audit))
        .route("/api/audit/{scope}", get(handlers::audit_view))
        .route("/api/presence", get(handlers::presence_view))
        .route("/api/stats", get(handlers::stats_view))
        .layer(middleware::from_fn_with_state(state.clone(), cors_envelope))
        .with_state(state)
}

/// Apply the CORS envelope to every response and short-circuit preflight.
async fn cors_envelope(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors(response.headers_mut(), &state.config.allowed_origin);
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors(response.headers_mut(), &state.config.allowed_origin);
    response
}

fn apply_cors(headers: &mut HeaderMap, origin: &str) {
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("*")),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert("Access-Control-Max-Age", HeaderValue::from_static("86400"));
}

/// API failure carrying the wire envelope `{"error": message}`
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.to_string(),
        }
    }

    pub fn conflict(message: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.to_string(),
        }
    }

    pub fn bad_gateway(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.to_string(),
        }
    }

    /// 500 with a generic message; the detail is logged, never leaked.
    pub fn internal<E: std::fmt::Display>(detail: E) -> Self {
        log::error!("api internal error: {}", detail);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<StoreError> for ApiFailure {
    fn from(err: StoreError) -> Self {
        Self::internal(err)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message() });
        (self.status(), Json(body)).into_response()
    }
}

/// Load a per-request store.
pub(crate) async fn open_store(state: &AppState) -> Result<Store, ApiFailure> {
    let mut store = Store::new(state.transport.clone());
    store.load().await?;
    Ok(store)
}
