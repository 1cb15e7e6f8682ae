use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::catalog::listing;
use super::identity::{Capability, StaticIdentities};
use super::{Caller, CatalogKind, Gateway, GatewayError, IdentityResolver};
use crate::utils::http::read_body_bounded;

const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct GatewayHttpState {
    gateway: Arc<Gateway>,
    identities: Arc<dyn IdentityResolver>,
    max_body_bytes: usize,
}

impl GatewayHttpState {
    /// State with no known callers; every authenticated route answers 401
    /// until an identity resolver is attached.
    pub fn new(gateway: Gateway) -> Self {
        Self::from_shared(Arc::new(gateway))
    }

    pub fn from_shared(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            identities: Arc::new(StaticIdentities::default()),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_identity_resolver(mut self, identities: impl IdentityResolver + 'static) -> Self {
        self.identities = Arc::new(identities);
        self
    }

    /// Caps both inbound request bodies and buffered upstream JSON bodies.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes.max(1);
        self
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(state: GatewayHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/urls", get(handle_get_urls))
        .route("/urls/update", post(handle_update_urls))
        .route("/keys", get(handle_get_keys))
        .route("/keys/update", post(handle_update_keys))
        .route("/models", get(handle_list_models).fallback(handle_proxy))
        .route(
            "/models/:url_idx",
            get(handle_list_backend_models).fallback(handle_proxy),
        )
        .route(
            "/assistants",
            get(handle_list_assistants).fallback(handle_proxy),
        )
        .route(
            "/assistants/:url_idx",
            get(handle_list_backend_assistants).fallback(handle_proxy),
        )
        .route("/audio/speech", post(handle_speech).fallback(handle_proxy))
        .fallback(handle_proxy)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())?
        .trim()
        .to_string();
    let rest = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?;
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

async fn authorize(
    state: &GatewayHttpState,
    headers: &HeaderMap,
    capability: Capability,
) -> Result<Caller, (StatusCode, Json<ErrorResponse>)> {
    let caller = match extract_bearer(headers) {
        Some(token) => state.identities.resolve(&token).await,
        None => None,
    };
    capability.check(caller).map_err(map_gateway_error)
}

fn map_gateway_error(err: GatewayError) -> (StatusCode, Json<ErrorResponse>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match &err {
        GatewayError::Upstream { .. } | GatewayError::HttpClient(_) | GatewayError::Cache(_) => {
            tracing::error!(status = status.as_u16(), error = %err, "request failed");
        }
        _ => {
            tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
        }
    }
    error_response(status, err.to_string())
}

fn error_response(
    status: StatusCode,
    detail: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}
