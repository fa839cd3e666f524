//! WebSocket session lifecycle: one subscriber from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use metrics::{gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::hub::BroadcastHub;
use super::subscriber::{Liveness, Subscriber};
use crate::config::ServerConfig;
use crate::metrics::{WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE};

/// Ping cadence and the silence tolerated before giving up on a peer.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server pings.
    pub interval: Duration,
    /// Maximum time without inbound activity, and the longest a single
    /// socket write may block.
    pub timeout: Duration,
}

impl From<&ServerConfig> for Heartbeat {
    fn from(config: &ServerConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            timeout: config.heartbeat_timeout(),
        }
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer sent a close frame.
    RemoteClose,
    /// The inbound stream ended without a close frame.
    StreamEnded,
    /// Reading from the socket failed.
    ReadError,
    /// Writing to the socket failed.
    WriteError,
    /// No pong within the heartbeat timeout.
    HeartbeatTimeout,
    /// The hub dropped the subscriber (pruned or shut down).
    Deregistered,
    /// The subscriber id was already taken.
    Duplicate,
    /// The upgrade completed after shutdown began.
    ShuttingDown,
}

impl SessionEnd {
    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RemoteClose => "remote_close",
            Self::StreamEnded => "stream_ended",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Deregistered => "deregistered",
            Self::Duplicate => "duplicate",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Register `subscriber` unless shutdown has begun.
///
/// The token is checked again after registering: shutdown cancels it before
/// `close_all`, so a registration that raced past `close_all` is undone here.
fn enter(
    hub: &BroadcastHub,
    subscriber: Subscriber,
    shutdown: &CancellationToken,
) -> Result<(), SessionEnd> {
    if shutdown.is_cancelled() {
        return Err(SessionEnd::ShuttingDown);
    }
    let id = subscriber.id().clone();
    if !hub.register(subscriber) {
        return Err(SessionEnd::Duplicate);
    }
    if shutdown.is_cancelled() {
        let _ = hub.deregister(&id);
        return Err(SessionEnd::ShuttingDown);
    }
    Ok(())
}

/// Run a session for an upgraded socket.
///
/// Registers the subscriber, forwards queued records as text frames, pings
/// on the heartbeat interval and discards inbound data. The subscriber is
/// deregistered on the first of remote close, read or write error,
/// heartbeat timeout or removal from the hub.
#[instrument(skip_all, fields(subscriber_id = %subscriber.id(), peer = %subscriber.peer()))]
pub async fn run_session(
    mut socket: WebSocket,
    subscriber: Subscriber,
    outbound: mpsc::Receiver<Utf8Bytes>,
    hub: Arc<BroadcastHub>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) -> SessionEnd {
    let id = subscriber.id().clone();
    let liveness = subscriber.liveness();
    let started = Instant::now();

    if let Err(end) = enter(&hub, subscriber, &shutdown) {
        warn!(reason = end.as_str(), "subscriber not registered, closing");
        let (code, reason) = match end {
            SessionEnd::ShuttingDown => (close_code::AWAY, "Server shutting down"),
            _ => (close_code::ERROR, "Subscriber rejected"),
        };
        let close = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = send_bounded(&mut socket, Message::Close(Some(close)), heartbeat.timeout).await;
        return end;
    }
    info!("subscriber connected");
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(forward_outbound(
        ws_tx,
        outbound,
        Arc::clone(&liveness),
        heartbeat,
    ));

    let end = tokio::select! {
        joined = &mut writer => joined.unwrap_or(SessionEnd::WriteError),
        end = drain_inbound(ws_rx, &liveness) => end,
    };
    writer.abort();

    let removed = hub.deregister(&id);
    info!(reason = end.as_str(), removed, "subscriber disconnected");
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    end
}

/// Send one frame, giving up after `limit`. A peer that stops reading must
/// not pin the writer forever once the hub has pruned it.
async fn send_bounded<S>(ws_tx: &mut S, message: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    match tokio::time::timeout(limit, ws_tx.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            warn!(timeout = ?limit, "socket write stalled, disconnecting");
            false
        }
    }
}

async fn forward_outbound<S>(
    mut ws_tx: S,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    liveness: Arc<Liveness>,
    heartbeat: Heartbeat,
) -> SessionEnd
where
    S: Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(heartbeat.interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    let close = CloseFrame {
                        code: close_code::NORMAL,
                        reason: "Server closing".into(),
                    };
                    let close = Message::Close(Some(close));
                    let _ = send_bounded(&mut ws_tx, close, heartbeat.timeout).await;
                    return SessionEnd::Deregistered;
                };
                if !send_bounded(&mut ws_tx, Message::Text(text), heartbeat.timeout).await {
                    return SessionEnd::WriteError;
                }
            }
            _ = ping.tick() => {
                if liveness.idle_for() > heartbeat.timeout {
                    warn!(timeout = ?heartbeat.timeout, "subscriber unresponsive, disconnecting");
                    return SessionEnd::HeartbeatTimeout;
                }
                let ping = Message::Ping(Vec::new().into());
                if !send_bounded(&mut ws_tx, ping, heartbeat.timeout).await {
                    return SessionEnd::WriteError;
                }
            }
        }
    }
}

async fn drain_inbound(mut ws_rx: SplitStream<WebSocket>, liveness: &Liveness) -> SessionEnd {
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Close(_)) => return SessionEnd::RemoteClose,
            Ok(Message::Ping(_) | Message::Pong(_)) => liveness.mark_alive(),
            Ok(Message::Text(_) | Message::Binary(_)) => {
                liveness.mark_alive();
                trace!("discarding inbound data frame");
            }
            Err(e) => {
                debug!(error = %e, "websocket read failed");
                return SessionEnd::ReadError;
            }
        }
    }
    SessionEnd::StreamEnded
}
