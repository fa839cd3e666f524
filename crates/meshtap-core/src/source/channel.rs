//! Callback-style adapter.
//!
//! A protocol node that delivers packets through a registered callback calls
//! [`PacketSink::on_packet`] from that callback. The sink never blocks: when
//! the queue is full the event is dropped with a warning, so the tap never
//! pushes back on the node.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{PacketSource, UpstreamEvent};
use crate::errors::SourceError;
use crate::packet::{RawPacket, RxLogEvent};

/// Create a connected sink/source pair with a bounded queue.
pub fn channel(capacity: usize) -> (PacketSink, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PacketSink { tx }, ChannelSource { rx })
}

/// Producer half, handed to the upstream collaborator.
#[derive(Clone, Debug)]
pub struct PacketSink {
    tx: mpsc::Sender<UpstreamEvent>,
}

impl PacketSink {
    /// Packet-received hook for a full protocol node.
    pub fn on_packet(&self, packet: RawPacket) -> bool {
        self.push(UpstreamEvent::Packet(packet))
    }

    /// Raw-frame hook for a companion bridge.
    pub fn on_rx_log(&self, event: RxLogEvent) -> bool {
        self.push(UpstreamEvent::RxLog(event))
    }

    /// Enqueue without waiting. Returns whether the event was accepted.
    pub fn push(&self, event: UpstreamEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(ev)) => {
                warn!(kind = ev.kind(), "upstream queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                debug!(kind = ev.kind(), "upstream queue closed, dropping event");
                false
            }
        }
    }

    /// True once the consuming side has closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, polled by the ingestion task.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<UpstreamEvent>,
}

#[async_trait]
impl PacketSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<UpstreamEvent>, SourceError> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.rx.close();
        // Drain anything buffered so producers observe the close promptly.
        while self.rx.try_recv().is_ok() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn packets_flow_through() {
        let (sink, mut source) = channel(4);
        assert!(sink.on_packet(RawPacket::new(0x0D, vec![1, 0, 0, 0])));
        assert!(sink.on_rx_log(RxLogEvent::default()));

        let first = source.recv().await.unwrap().unwrap();
        assert_eq!(first.kind(), "packet");
        let second = source.recv().await.unwrap().unwrap();
        assert_eq!(second.kind(), "rx_log");
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (sink, mut source) = channel(1);
        assert!(sink.on_packet(RawPacket::default()));
        assert!(!sink.on_packet(RawPacket::default()));
        assert!(source.recv().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropping_all_sinks_exhausts_source() {
        let (sink, mut source) = channel(2);
        let clone = sink.clone();
        drop(sink);
        drop(clone);
        assert!(source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_rejects_further_pushes() {
        let (sink, mut source) = channel(2);
        source.close().await.unwrap();
        assert!(sink.is_closed());
        assert!(!sink.on_packet(RawPacket::default()));
        assert!(source.recv().await.unwrap().is_none());
    }
}
