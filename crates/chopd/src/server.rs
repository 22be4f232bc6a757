//! Router assembly.

use axum::Router;

use crate::control;
use crate::proxy;
use crate::state::AppState;

/// Builds the full proxy router: the `/_chopin` control namespace plus the
/// forwarding fallback for everything else.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/_chopin", control::router())
        .fallback(proxy::handle)
        .with_state(state)
}
