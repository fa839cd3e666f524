//! Ingestion: upstream events → records → sink.
//!
//! The loop checks cancellation only between events, so a publish that is
//! in flight when shutdown starts always completes.

use std::io::Write;

use async_trait::async_trait;
use meshtap_core::{PacketRecord, PacketSource, RecordBuilder, SourceError, UpstreamEvent};
use metrics::counter;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::errors::{Result, ServerError};
use crate::metrics::PACKETS_RECEIVED_TOTAL;
use crate::websocket::BroadcastHub;

/// Destination for built records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Accept one record. An error stops ingestion.
    async fn accept(&self, record: PacketRecord) -> Result<()>;
}

#[async_trait]
impl RecordSink for BroadcastHub {
    async fn accept(&self, record: PacketRecord) -> Result<()> {
        let _ = self.publish(&record).await;
        Ok(())
    }
}

/// Writes one JSON document per line.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    async fn accept(&self, record: PacketRecord) -> Result<()> {
        let line = serde_json::to_string(&record)?;
        let mut out = self.out.lock();
        writeln!(out, "{line}").map_err(ServerError::Output)?;
        out.flush().map_err(ServerError::Output)
    }
}

/// How ingestion stopped.
#[derive(Debug)]
pub enum IngestEnd {
    /// The source reported end of stream.
    Exhausted,
    /// Shutdown was requested.
    Cancelled,
    /// The source failed mid-run.
    SourceFailed(SourceError),
    /// The sink refused a record.
    SinkFailed(ServerError),
}

impl IngestEnd {
    /// Whether the end should be reported as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SourceFailed(_) | Self::SinkFailed(_))
    }
}

/// Summary of an ingestion run.
#[derive(Debug)]
pub struct IngestReport {
    /// Why the loop stopped.
    pub end: IngestEnd,
    /// Decoded packets handled.
    pub packets: u64,
    /// Companion frames handled.
    pub rx_logs: u64,
}

/// Drives a [`PacketSource`] into a [`RecordSink`].
pub struct Ingestor;

impl Ingestor {
    /// Pull events from `source` until it is exhausted, fails, or `cancel`
    /// fires. The source is left open; closing it is the caller's job.
    #[instrument(skip_all)]
    pub async fn run(
        source: &mut dyn PacketSource,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> IngestReport {
        let mut packets = 0_u64;
        let mut rx_logs = 0_u64;

        let end = loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break IngestEnd::Cancelled,
                next = source.recv() => next,
            };

            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => break IngestEnd::Exhausted,
                Err(e) => {
                    error!(error = %e, "packet source failed");
                    break IngestEnd::SourceFailed(e);
                }
            };

            counter!(PACKETS_RECEIVED_TOTAL, "kind" => event.kind()).increment(1);
            let record = match &event {
                UpstreamEvent::Packet(packet) => {
                    packets += 1;
                    debug!(
                        payload_type = packet.payload_type_code(),
                        route_type = packet.route_type_code(),
                        payload_len = packet.payload.len(),
                        "packet received"
                    );
                    RecordBuilder::build(packet)
                }
                UpstreamEvent::RxLog(rx) => {
                    rx_logs += 1;
                    debug!(len = rx.raw.len(), rssi = ?rx.rssi, snr = ?rx.snr, "rx log frame");
                    RecordBuilder::build_rx_log(rx)
                }
            };

            if let Err(e) = sink.accept(record).await {
                error!(error = %e, "record sink failed");
                break IngestEnd::SinkFailed(e);
            }
        };

        info!(?end, packets, rx_logs, "ingestion stopped");
        IngestReport {
            end,
            packets,
            rx_logs,
        }
    }
}
