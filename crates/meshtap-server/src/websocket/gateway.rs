//! Connection gateway: decides which upgrades become subscribers.
//!
//! Only `/ws` registers. An upgrade on any other path is accepted and then
//! closed with 1008 ("Invalid path"); plain HTTP on an unknown path is a 404.

use std::net::SocketAddr;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{ConnectInfo, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};

use super::session::{Heartbeat, run_session};
use super::subscriber::Subscriber;
use crate::metrics::{WS_CONNECTIONS_REJECTED_TOTAL, WS_CONNECTIONS_TOTAL};
use crate::server::AppState;

/// Close reason sent for upgrades on any path but `/ws`.
pub const INVALID_PATH_REASON: &str = "Invalid path";

/// Close reason sent when `max_connections` is reached.
pub const AT_CAPACITY_REASON: &str = "Try again later";

/// `GET /ws`: upgrade and register a subscriber.
///
/// The connection slot is taken here and held until the session ends.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let Some(slot) = state.slots.try_acquire() else {
        warn!(%peer, limit = state.slots.limit(), "connection limit reached");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        return ws.on_upgrade(|socket| close_with(socket, close_code::AGAIN, AT_CAPACITY_REASON));
    };

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    let (subscriber, outbound) = Subscriber::new(peer, state.config.queue_capacity);
    let heartbeat = Heartbeat::from(state.config.as_ref());
    let hub = state.hub;
    let shutdown = state.shutdown;
    ws.on_upgrade(move |socket| async move {
        let _ = run_session(socket, subscriber, outbound, hub, heartbeat, shutdown).await;
        drop(slot);
    })
}

/// Fallback for every unrouted path.
pub async fn reject_path(
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(ws) => refuse(ws, uri.path()),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Accept `ws` only to close it with 1008. Never registers.
pub fn refuse(ws: WebSocketUpgrade, path: &str) -> Response {
    warn!(path, "websocket upgrade on invalid path");
    counter!(WS_CONNECTIONS_REJECTED_TOTAL, "reason" => "invalid_path").increment(1);
    ws.on_upgrade(|socket| close_with(socket, close_code::POLICY, INVALID_PATH_REASON))
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, code, "failed to send close frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new().fallback(reject_path)
    }

    #[tokio::test]
    async fn plain_http_on_unknown_path_is_404() {
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn post_on_unknown_path_is_404() {
        let req = Request::builder()
            .method("POST")
            .uri("/ws/extra")
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn close_codes() {
        assert_eq!(close_code::POLICY, 1008);
        assert_eq!(close_code::AGAIN, 1013);
    }
}
