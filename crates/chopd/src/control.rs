//! Built-in control endpoints under `/_chopin`.
//!
//! These routes are handled by the proxy itself: they are never queued and
//! never forwarded to the target. The report-context endpoint is the landing
//! point for the callback URL injected into queued requests, so it stays
//! reachable while the dispatch slot is held.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use chopd_core::{identity, token, Address};

use crate::state::AppState;

/// Maximum accepted report-context payload (1 MiB).
///
/// Context entries are opaque blobs the target posts per queued request; the
/// cap bounds memory since sequences live for the process lifetime.
pub const REPORT_CONTEXT_MAX_BYTES: usize = 1024 * 1024;

/// Errors surfaced by the control endpoints.
#[derive(Debug, Error)]
pub enum ControlError {
    /// `requestId` query parameter is missing.
    #[error("missing requestId query parameter")]
    MissingRequestId,

    /// `requestId` does not correspond to any queued request.
    #[error("unknown requestId")]
    UnknownRequestId,
}

impl ControlError {
    const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingRequestId => StatusCode::BAD_REQUEST,
            Self::UnknownRequestId => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, self.to_string()).into_response()
    }
}

/// Builds the `/_chopin` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/logout", get(logout))
        .route("/me", get(me))
        .route("/status", get(status))
        .route("/logs", get(logs))
        .route(
            "/report-context",
            post(report_context).layer(DefaultBodyLimit::max(REPORT_CONTEXT_MAX_BYTES)),
        )
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    /// Address to log in as; a random one is generated when absent/invalid.
    #[serde(rename = "as")]
    requested: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    success: bool,
    address: String,
    token: String,
}

async fn login(Query(query): Query<LoginQuery>) -> Response {
    let address = query
        .requested
        .as_deref()
        .and_then(|raw| raw.parse::<Address>().ok())
        .unwrap_or_else(Address::random);

    let token = token::mint(&address);

    // Readable by frontend JS on purpose (not HTTP-only): the dev overlay
    // shows the active identity.
    let cookie = Cookie::build((identity::DEV_ADDRESS_COOKIE, address.as_str()))
        .path("/")
        .same_site(SameSite::Strict)
        .build();

    tracing::info!(address = %address, "dev login");

    let mut headers = HeaderMap::new();
    if let Ok(value) = cookie.to_string().parse() {
        headers.insert(SET_COOKIE, value);
    }
    (
        headers,
        Json(LoginResponse {
            success: true,
            address: address.to_string(),
            token,
        }),
    )
        .into_response()
}

async fn logout() -> Response {
    let mut removal = Cookie::build((identity::DEV_ADDRESS_COOKIE, ""))
        .path("/")
        .build();
    removal.make_removal();

    tracing::info!("dev logout");

    let mut headers = HeaderMap::new();
    if let Ok(value) = removal.to_string().parse() {
        headers.insert(SET_COOKIE, value);
    }
    headers.insert(LOCATION, axum::http::HeaderValue::from_static("/"));
    (StatusCode::FOUND, headers).into_response()
}

#[derive(Debug, Serialize)]
struct MeResponse {
    address: Option<String>,
}

async fn me(headers: HeaderMap) -> Json<MeResponse> {
    let address = identity::resolve(&headers).map(|a| a.to_string());
    Json(MeResponse { address })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

async fn logs(State(state): State<AppState>) -> Response {
    let entries = state.journal().snapshot(state.contexts());
    Json(entries).into_response()
}

#[derive(Debug, Deserialize)]
struct ReportContextQuery {
    #[serde(rename = "requestId")]
    request_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReportAck {
    success: bool,
}

/// Appends a raw context payload to the sequence for the given request.
///
/// Content type is ignored; the body is opaque bytes. Late calls for
/// already-completed requests are accepted: sequences live for the process
/// lifetime.
async fn report_context(
    State(state): State<AppState>,
    Query(query): Query<ReportContextQuery>,
    body: Bytes,
) -> Result<Json<ReportAck>, ControlError> {
    let request_id = query.request_id.ok_or(ControlError::MissingRequestId)?;

    if !state.contexts().append(&request_id, body.clone()) {
        tracing::warn!(request_id = %request_id, "report-context for unknown request");
        return Err(ControlError::UnknownRequestId);
    }

    tracing::debug!(
        request_id = %request_id,
        bytes = body.len(),
        "context entry recorded"
    );
    Ok(Json(ReportAck { success: true }))
}
