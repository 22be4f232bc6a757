//! WebSocket pass-through.
//!
//! Upgrade requests bypass the queue entirely: the proxy accepts the
//! client-side upgrade, opens its own connection to the target (with the
//! resolved identity header attached) and relays frames in both directions,
//! unbuffered, until either side closes.

use axum::body::Body;
use axum::extract::ws::{Message as ClientMessage, WebSocket};
use axum::extract::{FromRequestParts, WebSocketUpgrade};
use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as TargetMessage;

use chopd_core::{identity, Address};

use crate::state::AppState;

/// Whether the request asks for an HTTP upgrade to WebSocket.
#[must_use]
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let wants_upgrade = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    let is_websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    wants_upgrade && is_websocket
}

/// Accepts the client upgrade and bridges it to the target.
pub async fn handle_upgrade(
    state: AppState,
    req: Request<Body>,
    address: Option<Address>,
) -> Response {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or_else(|| "/".to_string(), ToString::to_string);
    let target_url = format!(
        "ws://localhost:{}{}",
        state.config().target_port,
        path_and_query
    );

    let (mut parts, _body) = req.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    tracing::debug!(url = %target_url, "websocket upgrade");

    upgrade.on_upgrade(move |socket| async move {
        if let Err(err) = relay(socket, &target_url, address).await {
            tracing::warn!(url = %target_url, error = %err, "websocket relay ended with error");
        }
    })
}

/// Connects to the target and forwards frames both ways until either side
/// closes. Frames are never buffered beyond the single message in transit.
async fn relay(
    client_socket: WebSocket,
    target_url: &str,
    address: Option<Address>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut request = target_url.into_client_request()?;
    identity::inject(request.headers_mut(), address.as_ref());

    let (target_socket, _) = connect_async(request).await?;

    let (mut client_tx, mut client_rx) = client_socket.split();
    let (mut target_tx, mut target_rx) = target_socket.split();

    let client_to_target = async {
        while let Some(msg) = client_rx.next().await {
            let Ok(msg) = msg else { break };
            let forward = match msg {
                ClientMessage::Text(text) => TargetMessage::Text(text.to_string().into()),
                ClientMessage::Binary(data) => TargetMessage::Binary(data),
                ClientMessage::Ping(data) => TargetMessage::Ping(data),
                ClientMessage::Pong(data) => TargetMessage::Pong(data),
                ClientMessage::Close(_) => TargetMessage::Close(None),
            };
            let closing = matches!(forward, TargetMessage::Close(_));
            if target_tx.send(forward).await.is_err() || closing {
                break;
            }
        }
    };

    let target_to_client = async {
        while let Some(msg) = target_rx.next().await {
            let Ok(msg) = msg else { break };
            let forward = match msg {
                TargetMessage::Text(text) => ClientMessage::Text(text.to_string().into()),
                TargetMessage::Binary(data) => ClientMessage::Binary(data),
                TargetMessage::Ping(data) => ClientMessage::Ping(data),
                TargetMessage::Pong(data) => ClientMessage::Pong(data),
                TargetMessage::Close(_) => ClientMessage::Close(None),
                TargetMessage::Frame(_) => continue,
            };
            let closing = matches!(forward, ClientMessage::Close(_));
            if client_tx.send(forward).await.is_err() || closing {
                break;
            }
        }
    };

    tokio::select! {
        () = client_to_target => {}
        () = target_to_client => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn upgrade_headers(connection: &'static str, upgrade: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static(connection));
        headers.insert(UPGRADE, HeaderValue::from_static(upgrade));
        headers
    }

    #[test]
    fn detects_websocket_upgrade() {
        assert!(is_upgrade_request(&upgrade_headers("Upgrade", "websocket")));
        assert!(is_upgrade_request(&upgrade_headers(
            "keep-alive, Upgrade",
            "WebSocket"
        )));
    }

    #[test]
    fn plain_requests_are_not_upgrades() {
        assert!(!is_upgrade_request(&HeaderMap::new()));
        assert!(!is_upgrade_request(&upgrade_headers("keep-alive", "websocket")));
        assert!(!is_upgrade_request(&upgrade_headers("Upgrade", "h2c")));
    }
}
