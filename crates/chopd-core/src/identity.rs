//! Per-request identity resolution.
//!
//! Every request forwarded to the target carries at most one `x-address`
//! header, and the proxy is the sole source of truth for it: whatever the
//! client sent under that name is dropped, and the header is re-added only
//! when a development identity resolves.
//!
//! Resolution order:
//!
//! 1. a `dev-address` cookie, if present;
//! 2. otherwise an `Authorization: Bearer <token>` header carrying an
//!    unsigned (`alg: "none"`) token with a `sub` claim.
//!
//! Token decode failures are silent; the request proceeds anonymous.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use cookie::Cookie;

use crate::address::Address;
use crate::token;

/// Cookie that stores the logged-in development address.
pub const DEV_ADDRESS_COOKIE: &str = "dev-address";

/// Header injected on forwarded requests when an identity resolves.
pub const X_ADDRESS: HeaderName = HeaderName::from_static("x-address");

/// Header injected on queued requests pointing at the report-context endpoint.
pub const X_CALLBACK_URL: HeaderName = HeaderName::from_static("x-callback-url");

/// Resolves the development identity for a request, cookie first.
#[must_use]
pub fn resolve(headers: &HeaderMap) -> Option<Address> {
    if let Some(address) = from_cookie(headers) {
        return Some(address);
    }
    from_bearer(headers)
}

fn from_cookie(headers: &HeaderMap) -> Option<Address> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    Cookie::split_parse(raw)
        .filter_map(Result::ok)
        .find(|c| c.name() == DEV_ADDRESS_COOKIE)
        .and_then(|c| c.value().parse().ok())
}

fn from_bearer(headers: &HeaderMap) -> Option<Address> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?;
    token::decode_subject(token)
}

/// Applies the identity discipline to a set of forwarded headers: strips any
/// client-supplied `x-address` and injects the resolved one, if any.
pub fn inject(headers: &mut HeaderMap, address: Option<&Address>) {
    headers.remove(&X_ADDRESS);
    if let Some(address) = address {
        if let Ok(value) = HeaderValue::from_str(address.as_str()) {
            headers.insert(X_ADDRESS, value);
        }
    }
}
