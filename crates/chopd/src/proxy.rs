//! The forwarding pipeline: pass-through for reads, queued dispatch for
//! writes.
//!
//! Every request that does not match `/_chopin` lands here. Non-mutating
//! methods and WebSocket upgrades are relayed transparently; POST/PUT/PATCH/
//! DELETE go through the single-slot queue so the target sees at most one
//! mutating request in flight, each with a fresh callback URL for context
//! reporting.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{HeaderMap, HeaderValue, HOST};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use serde_json::json;
use uuid::Uuid;

use chopd_core::journal::{self, ResponseRecord};
use chopd_core::queue::DispatchPermit;
use chopd_core::{identity, Address};

use crate::state::AppState;
use crate::ws;

/// Maximum buffered body for a queued request (2 MiB).
pub const QUEUED_BODY_MAX_BYTES: usize = 2 * 1024 * 1024;

/// Headers that never cross the proxy, in either direction.
const HOP_BY_HOP: [&str; 4] = ["host", "content-length", "transfer-encoding", "connection"];

/// Methods that go through the dispatch queue.
const QUEUED_METHODS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// Fallback handler for everything outside `/_chopin`.
pub async fn handle(State(state): State<AppState>, req: Request<Body>) -> Response {
    let address = identity::resolve(req.headers());

    if ws::is_upgrade_request(req.headers()) {
        return ws::handle_upgrade(state, req, address).await;
    }

    if QUEUED_METHODS.contains(req.method()) {
        queued(state, req, address).await
    } else {
        pass_through(state, req, address).await
    }
}

/// Relays a non-mutating request verbatim, streaming both bodies.
///
/// Pass-through traffic is not journaled and does not touch the queue; it
/// interleaves freely with whatever mutating request is in flight.
async fn pass_through(state: AppState, req: Request<Body>, address: Option<Address>) -> Response {
    let method = req.method().clone();
    let target_url = target_url(&state, &req);

    let (parts, body) = req.into_parts();
    let mut headers = forwardable_headers(&parts.headers);
    identity::inject(&mut headers, address.as_ref());

    tracing::debug!(method = %method, url = %target_url, "pass-through");

    let upstream = state
        .client()
        .request(method, &target_url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await;

    let upstream = match upstream {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!(url = %target_url, error = %err, "pass-through failed");
            return bad_gateway(&err.to_string());
        }
    };

    let status = upstream.status();
    let headers = forwardable_headers(upstream.headers());

    let mut response = Response::builder().status(status);
    if let Some(map) = response.headers_mut() {
        *map = headers;
    }
    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Runs one admitted mutating request end to end.
///
/// The slot is held from admission until the response body is handed back to
/// the client (the permit rides inside the response body), so the next waiter
/// cannot reach the target while this exchange is still being delivered.
async fn queued(state: AppState, req: Request<Body>, address: Option<Address>) -> Response {
    let permit = state.queue().acquire().await;

    let method = req.method().clone();
    let url = req
        .uri()
        .path_and_query()
        .map_or_else(|| "/".to_string(), ToString::to_string);
    let callback_host = callback_host(&state, req.headers());

    let (parts, body) = req.into_parts();
    let mut headers = parts.headers;
    identity::inject(&mut headers, address.as_ref());

    let body = match axum::body::to_bytes(body, QUEUED_BODY_MAX_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            // axum surfaces the cap as a length-limit error; anything else is
            // the client going away mid-upload.
            let (status, detail) = if err.to_string().contains("length limit") {
                (StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
            } else {
                (StatusCode::BAD_REQUEST, "failed to read request body")
            };
            tracing::warn!(method = %method, url = %url, error = %err, "queued body rejected");
            return respond_with_slot((status, detail.to_string()).into_response(), permit).await;
        }
    };

    let request_id = Uuid::new_v4().to_string();
    state.contexts().register(&request_id);
    state
        .journal()
        .append(journal::new_entry(
            request_id.clone(),
            method.as_str(),
            &url,
            &headers,
            &body,
        ));

    tracing::info!(
        request_id = %request_id,
        method = %method,
        url = %url,
        bytes = body.len(),
        "mutating request admitted"
    );

    let mut forward = forwardable_headers(&headers);
    let callback = format!("http://{callback_host}/_chopin/report-context?requestId={request_id}");
    if let Ok(value) = HeaderValue::from_str(&callback) {
        forward.insert(identity::X_CALLBACK_URL, value);
    }

    let target_url = format!("{}{}", state.target_origin(), url);
    let outcome = state
        .client()
        .request(method.clone(), &target_url)
        .headers(forward)
        .body(body)
        .send()
        .await;

    let upstream = match outcome {
        Ok(upstream) => upstream,
        Err(err) => {
            return respond_with_slot(upstream_failure(&state, &request_id, &err), permit).await;
        }
    };

    let status = upstream.status();
    let response_headers = upstream.headers().clone();
    let response_body = match upstream.bytes().await {
        Ok(body) => body,
        Err(err) => {
            return respond_with_slot(upstream_failure(&state, &request_id, &err), permit).await;
        }
    };

    state.journal().complete(
        &request_id,
        ResponseRecord {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: journal::headers_to_map(&response_headers),
            body: String::from_utf8_lossy(&response_body).to_string(),
        },
    );

    tracing::info!(
        request_id = %request_id,
        status = status.as_u16(),
        bytes = response_body.len(),
        "mutating request completed"
    );

    let mut response = Response::builder().status(status);
    if let Some(map) = response.headers_mut() {
        *map = forwardable_headers(&response_headers);
    }
    response
        .body(slot_body(response_body, permit))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Records the transport failure and produces the 502 response.
fn upstream_failure(state: &AppState, request_id: &str, err: &reqwest::Error) -> Response {
    let message = err.to_string();
    tracing::warn!(request_id = %request_id, error = %message, "target fetch failed");
    state
        .journal()
        .complete_with_error(request_id, message.clone());
    bad_gateway(&message)
}

fn bad_gateway(details: &str) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        axum::Json(json!({ "error": "Bad Gateway", "details": details })),
    )
        .into_response()
}

/// Copies a header map, dropping hop-by-hop headers.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Host used in the callback URL: the incoming `Host`, or the proxy itself.
fn callback_host(state: &AppState, headers: &HeaderMap) -> String {
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map_or_else(
            || format!("localhost:{}", state.config().proxy_port),
            ToString::to_string,
        )
}

fn target_url(state: &AppState, req: &Request<Body>) -> String {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    format!("{}{}", state.target_origin(), path_and_query)
}

/// Re-wraps an already-buffered response so the slot releases only once the
/// response has been delivered to the client.
async fn respond_with_slot(response: Response, permit: DispatchPermit) -> Response {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    Response::from_parts(parts, slot_body(bytes, permit))
}

/// A buffered response body that releases the dispatch slot when dropped.
///
/// hyper drops the body once the response has been fully written to the
/// client (or the connection died), which is exactly the release point the
/// queue wants.
struct SlotBody {
    chunk: Option<Bytes>,
    _slot: DispatchPermit,
}

impl Stream for SlotBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().chunk.take().map(Ok))
    }
}

fn slot_body(bytes: Bytes, permit: DispatchPermit) -> Body {
    Body::from_stream(SlotBody {
        chunk: Some(bytes),
        _slot: permit,
    })
}
