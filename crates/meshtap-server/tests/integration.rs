//! End-to-end tests using a real WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use meshtap_core::RawPacket;
use meshtap_core::source::channel::{PacketSink, channel};
use meshtap_server::{BroadcastHub, IngestEnd, IngestReport, MeshtapServer, ServerConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Harness {
    server: Arc<MeshtapServer>,
    addr: SocketAddr,
    sink: PacketSink,
    run: JoinHandle<IngestReport>,
}

/// Boot a server on an ephemeral port, fed by an in-memory channel source.
async fn boot(config: ServerConfig) -> Harness {
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let server = Arc::new(MeshtapServer::new(config, metrics));
    let (addr, http) = server.listen().await.unwrap();

    let (sink, source) = channel(64);
    let runner = Arc::clone(&server);
    let run = tokio::spawn(async move { runner.run(Box::new(source), http).await });

    Harness {
        server,
        addr,
        sink,
        run,
    }
}

async fn connect(addr: SocketAddr, path: &str) -> WsStream {
    let url = format!("ws://{addr}{path}");
    let (ws, _resp) = timeout(TIMEOUT, connect_async(url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

/// Next frame that is not a ping or pong.
async fn next_frame(ws: &mut WsStream) -> Message {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("read timed out")
            .expect("stream ended")
            .expect("websocket error");
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return msg;
        }
    }
}

async fn expect_close(ws: &mut WsStream) -> CloseFrame {
    match next_frame(ws).await {
        Message::Close(Some(frame)) => frame,
        other => panic!("expected close frame, got {other:?}"),
    }
}

async fn wait_for_subscribers(hub: &BroadcastHub, n: usize) {
    timeout(TIMEOUT, async {
        while hub.len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("hub never reached {n} subscribers (has {})", hub.len()));
}

fn ack_packet() -> RawPacket {
    RawPacket::from_hex("0d0001000000")
        .unwrap()
        .with_telemetry(Some(-92), Some(7.25))
}

#[tokio::test]
async fn subscriber_receives_decoded_record() {
    let h = boot(ServerConfig::default()).await;
    let mut ws = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 1).await;

    assert!(h.sink.on_packet(ack_packet()));

    let record: Value = match next_frame(&mut ws).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    };
    assert_eq!(record["decoded"]["ack"]["crc"], 1);
    assert_eq!(record["packet"]["route_type_name"], "FLOOD");
    assert_eq!(record["radio"]["rssi"], -92);
    assert_eq!(record["raw_packet"]["hex"], "0d0001000000");
    assert!(record["ts"].is_f64());
}

#[tokio::test]
async fn every_subscriber_gets_every_record() {
    let h = boot(ServerConfig::default()).await;
    let mut a = connect(h.addr, "/ws").await;
    let mut b = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 2).await;

    assert!(h.sink.on_packet(ack_packet()));
    assert!(h.sink.on_packet(ack_packet()));

    for ws in [&mut a, &mut b] {
        for _ in 0..2 {
            assert_matches!(next_frame(ws).await, Message::Text(_));
        }
    }
}

#[tokio::test]
async fn other_path_is_closed_with_policy_violation() {
    let h = boot(ServerConfig::default()).await;
    let mut ws = connect(h.addr, "/other").await;

    let frame = expect_close(&mut ws).await;
    assert_eq!(u16::from(frame.code), 1008);
    assert_eq!(frame.reason.as_str(), "Invalid path");
    assert!(h.server.hub().is_empty());
}

#[tokio::test]
async fn upgrade_on_health_is_refused_too() {
    let h = boot(ServerConfig::default()).await;
    let mut ws = connect(h.addr, "/health").await;

    let frame = expect_close(&mut ws).await;
    assert_eq!(u16::from(frame.code), 1008);
    assert!(h.server.hub().is_empty());
}

#[tokio::test]
async fn connections_over_limit_are_told_to_retry() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let h = boot(config).await;
    let _first = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 1).await;

    let mut second = connect(h.addr, "/ws").await;
    let frame = expect_close(&mut second).await;
    assert_eq!(u16::from(frame.code), 1013);
    assert_eq!(h.server.hub().len(), 1);
}

#[tokio::test]
async fn simultaneous_upgrades_respect_the_limit() {
    let config = ServerConfig {
        max_connections: 2,
        ..ServerConfig::default()
    };
    let h = boot(config).await;

    let clients = futures::future::join_all((0..6).map(|_| connect(h.addr, "/ws"))).await;
    wait_for_subscribers(h.server.hub(), 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.server.hub().len(), 2);
    assert_eq!(h.server.slots().in_use(), 2);
    drop(clients);
}

#[tokio::test]
async fn slot_is_released_when_a_session_ends() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let h = boot(config).await;
    let mut first = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 1).await;

    first.send(Message::Close(None)).await.unwrap();
    timeout(TIMEOUT, async {
        while h.server.slots().in_use() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("slot never released");

    let _second = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 1).await;
}

#[tokio::test]
async fn client_close_deregisters() {
    let h = boot(ServerConfig::default()).await;
    let mut ws = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 1).await;

    ws.send(Message::Close(None)).await.unwrap();
    wait_for_subscribers(h.server.hub(), 0).await;
}

#[tokio::test]
async fn inbound_data_is_ignored() {
    let h = boot(ServerConfig::default()).await;
    let mut ws = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 1).await;

    ws.send(Message::text("hello")).await.unwrap();
    assert!(h.sink.on_packet(ack_packet()));
    assert_matches!(next_frame(&mut ws).await, Message::Text(_));
    assert_eq!(h.server.hub().len(), 1);
}

#[tokio::test]
async fn source_end_shuts_down_in_order() {
    let h = boot(ServerConfig::default()).await;
    let mut ws = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 1).await;

    assert!(h.sink.on_packet(ack_packet()));
    drop(h.sink);

    // The in-flight record is delivered before the close frame.
    assert_matches!(next_frame(&mut ws).await, Message::Text(_));
    let frame = expect_close(&mut ws).await;
    assert_eq!(u16::from(frame.code), 1000);

    let report = timeout(TIMEOUT, h.run).await.unwrap().unwrap();
    assert_matches!(report.end, IngestEnd::Exhausted);
    assert_eq!(report.packets, 1);
    assert!(h.server.hub().is_empty());
    assert!(h.server.shutdown().is_shutting_down());
}

#[tokio::test]
async fn shutdown_request_stops_ingestion() {
    let h = boot(ServerConfig::default()).await;
    let mut ws = connect(h.addr, "/ws").await;
    wait_for_subscribers(h.server.hub(), 1).await;

    h.server.shutdown().shutdown();

    let frame = expect_close(&mut ws).await;
    assert_eq!(u16::from(frame.code), 1000);
    let report = timeout(TIMEOUT, h.run).await.unwrap().unwrap();
    assert_matches!(report.end, IngestEnd::Cancelled);
    assert!(!h.sink.on_packet(ack_packet()));
}
