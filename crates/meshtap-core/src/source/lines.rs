//! Line-oriented source.
//!
//! Each line is one frame, either bare hex or a JSON object:
//!
//! ```text
//! 1500a1b2c3...
//! {"hex": "1500a1b2c3...", "rssi": -92, "snr": 7.5}
//! ```
//!
//! `raw_hex` and `payload` are accepted as aliases for `hex`. In node mode a
//! JSON line may also carry `crc` and the node's `decrypted` side values.
//! Blank lines and `#` comments are ignored; malformed lines are logged and
//! skipped.

use std::io;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, warn};

use super::{PacketSource, SourceMode, UpstreamEvent};
use crate::constants::MAX_PACKET_SIZE;
use crate::errors::{LineError, SourceError, WireError};
use crate::packet::{Decryption, RawPacket, RxLogEvent};

/// Longest accepted line. Generous enough for a max-size frame in hex plus
/// JSON telemetry and decrypted side values.
const MAX_LINE_LEN: usize = MAX_PACKET_SIZE * 2 + 4096;

/// JSON line schema.
#[derive(Debug, Deserialize)]
struct FrameLine {
    #[serde(alias = "raw_hex", alias = "payload")]
    hex: String,
    #[serde(default)]
    rssi: Option<i16>,
    #[serde(default)]
    snr: Option<f64>,
    #[serde(default)]
    crc: Option<u32>,
    #[serde(default)]
    decrypted: Option<Decryption>,
}

/// Turn one line into an event. Returns `Ok(None)` for blank and comment
/// lines.
pub fn parse_line(line: &str, mode: SourceMode) -> Result<Option<UpstreamEvent>, LineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let frame = if line.starts_with('{') {
        serde_json::from_str::<FrameLine>(line)?
    } else {
        FrameLine {
            hex: line.to_owned(),
            rssi: None,
            snr: None,
            crc: None,
            decrypted: None,
        }
    };

    let event = match mode {
        SourceMode::Node => {
            let mut packet = RawPacket::from_hex(&frame.hex)?.with_telemetry(frame.rssi, frame.snr);
            packet.crc = frame.crc;
            packet.decrypted = frame.decrypted;
            UpstreamEvent::Packet(packet)
        }
        SourceMode::Companion => {
            let raw = hex::decode(frame.hex.trim()).map_err(WireError::from)?;
            if raw.is_empty() {
                return Err(WireError::Empty.into());
            }
            UpstreamEvent::RxLog(RxLogEvent {
                raw,
                rssi: frame.rssi,
                snr: frame.snr,
            })
        }
    };
    Ok(Some(event))
}

/// Newline framing that reports bad lines as items instead of errors.
///
/// A decode error would end the `FramedRead` stream for good, so an overlong
/// or non-UTF-8 line comes back as `Err(LineError)` inside `Ok`. Only reader
/// failures surface as `io::Error`.
#[derive(Debug)]
struct FrameLines {
    max_length: usize,
    /// Bytes already scanned for a newline.
    next_index: usize,
    /// Dropping the tail of an overlong line.
    discarding: bool,
}

impl FrameLines {
    fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

fn line_text(mut line: BytesMut) -> Result<String, LineError> {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    String::from_utf8(line.to_vec()).map_err(|_| LineError::NotUtf8)
}

impl Decoder for FrameLines {
    type Item = Result<String, LineError>;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        loop {
            let read_to = buf.len().min(self.max_length.saturating_add(1));
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|&b| b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(end)) => {
                    buf.advance(end + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(end)) => {
                    self.next_index = 0;
                    let mut line = buf.split_to(end + 1);
                    line.truncate(end);
                    return Ok(Some(line_text(line)));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.discarding = true;
                    return Ok(Some(Err(LineError::TooLong {
                        max: self.max_length,
                    })));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        self.next_index = 0;
        if buf.is_empty() || buf[..] == b"\r"[..] {
            buf.clear();
            return Ok(None);
        }
        let tail = buf.split_to(buf.len());
        Ok(Some(line_text(tail)))
    }
}

/// Reads newline-delimited frames from any async reader.
pub struct LineSource<R> {
    lines: Option<FramedRead<R, FrameLines>>,
    mode: SourceMode,
    label: String,
    line_no: u64,
}

impl<R: AsyncRead + Unpin + Send> LineSource<R> {
    /// Wrap a reader. `label` identifies the source in logs.
    pub fn new(reader: R, mode: SourceMode, label: impl Into<String>) -> Self {
        Self {
            lines: Some(FramedRead::new(reader, FrameLines::new(MAX_LINE_LEN))),
            mode,
            label: label.into(),
            line_no: 0,
        }
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> PacketSource for LineSource<R> {
    async fn recv(&mut self) -> Result<Option<UpstreamEvent>, SourceError> {
        loop {
            let Some(lines) = self.lines.as_mut() else {
                return Ok(None);
            };
            let line = match lines.next().await {
                None => {
                    debug!(source = %self.label, lines = self.line_no, "upstream exhausted");
                    return Ok(None);
                }
                Some(Ok(line)) => line,
                Some(Err(e)) => return Err(SourceError::Io(e)),
            };
            self.line_no += 1;

            match line.and_then(|text| parse_line(&text, self.mode)) {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => {}
                Err(error) => {
                    warn!(source = %self.label, line = self.line_no, %error, "skipping malformed line");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        if self.lines.take().is_some() {
            debug!(source = %self.label, "upstream source closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn bare_hex_line_in_node_mode() {
        let event = parse_line("0d0001000000", SourceMode::Node).unwrap().unwrap();
        let UpstreamEvent::Packet(pkt) = event else {
            panic!("expected packet");
        };
        assert_eq!(pkt.payload, vec![1, 0, 0, 0]);
        assert!(pkt.rssi.is_none());
    }

    #[test]
    fn json_line_carries_telemetry_and_side_values() {
        let line = r#"{"raw_hex": "0a0000", "rssi": -88, "snr": 9.5, "crc": 77,
                       "decrypted": {"text": "ping"}}"#
            .replace('\n', " ");
        let event = parse_line(&line, SourceMode::Node).unwrap().unwrap();
        let UpstreamEvent::Packet(pkt) = event else {
            panic!("expected packet");
        };
        assert_eq!(pkt.rssi, Some(-88));
        assert_eq!(pkt.snr, Some(9.5));
        assert_eq!(pkt.crc, Some(77));
        assert_eq!(pkt.decrypted_text(), Some("ping"));
    }

    #[test]
    fn companion_mode_keeps_raw_bytes() {
        let event = parse_line(r#"{"payload": "ffee", "rssi": -120}"#, SourceMode::Companion)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            UpstreamEvent::RxLog(RxLogEvent {
                raw: vec![0xFF, 0xEE],
                rssi: Some(-120),
                snr: None,
            })
        );
    }

    #[test]
    fn companion_mode_does_not_parse_frame_layout() {
        // Not a valid node frame (path too long), still forwarded raw.
        let event = parse_line("05ff", SourceMode::Companion).unwrap().unwrap();
        assert_eq!(event.kind(), "rx_log");
        assert!(parse_line("05ff", SourceMode::Node).is_err());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert!(parse_line("   ", SourceMode::Node).unwrap().is_none());
        assert!(parse_line("# capture start", SourceMode::Node).unwrap().is_none());
    }

    #[test]
    fn malformed_lines_error() {
        assert_matches!(parse_line("zz", SourceMode::Node), Err(LineError::Wire(_)));
        assert_matches!(parse_line("{\"rssi\": 1}", SourceMode::Node), Err(LineError::Json(_)));
        assert_matches!(
            parse_line("", SourceMode::Companion).map(|e| e.is_none()),
            Ok(true)
        );
        assert_matches!(
            parse_line(r#"{"hex": ""}"#, SourceMode::Companion),
            Err(LineError::Wire(WireError::Empty))
        );
    }

    #[tokio::test]
    async fn reader_skips_bad_lines_and_ends() {
        let input = "0d0001000000\nnot-hex\n\n{\"hex\":\"0d0002000000\",\"rssi\":-70}\n";
        let mut source = LineSource::new(input.as_bytes(), SourceMode::Node, "test");

        let first = source.recv().await.unwrap().unwrap();
        assert_matches!(first, UpstreamEvent::Packet(ref p) if p.payload == vec![1, 0, 0, 0]);
        let second = source.recv().await.unwrap().unwrap();
        assert_matches!(second, UpstreamEvent::Packet(ref p) if p.rssi == Some(-70));
        assert!(source.recv().await.unwrap().is_none());
        assert_eq!(source.lines_read(), 4);
    }

    async fn next_payload_head(source: &mut LineSource<&[u8]>) -> u8 {
        let event = source.recv().await.unwrap().unwrap();
        let UpstreamEvent::Packet(pkt) = event else {
            panic!("expected packet");
        };
        pkt.payload[0]
    }

    #[tokio::test]
    async fn overlong_line_is_skipped_and_reading_continues() {
        let mut input = "a".repeat(MAX_LINE_LEN + 10).into_bytes();
        input.extend_from_slice(b"\n0d0001000000\n0d0002000000\n");
        let mut source = LineSource::new(&input[..], SourceMode::Node, "test");

        assert_eq!(next_payload_head(&mut source).await, 1);
        assert_eq!(next_payload_head(&mut source).await, 2);
        assert!(source.recv().await.unwrap().is_none());
        assert_eq!(source.lines_read(), 3);
    }

    #[tokio::test]
    async fn overlong_final_line_without_newline_ends_cleanly() {
        let mut input = b"0d0001000000\n".to_vec();
        input.extend(std::iter::repeat_n(b'f', MAX_LINE_LEN * 2));
        let mut source = LineSource::new(&input[..], SourceMode::Node, "test");

        assert_eq!(next_payload_head(&mut source).await, 1);
        assert!(source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_utf8_line_is_skipped_and_reading_continues() {
        let input = [&[0xFF, 0xFE, b'\n'][..], b"0d0001000000\r\n0d0002000000"].concat();
        let mut source = LineSource::new(&input[..], SourceMode::Node, "test");

        assert_eq!(next_payload_head(&mut source).await, 1);
        assert_eq!(next_payload_head(&mut source).await, 2);
        assert!(source.recv().await.unwrap().is_none());
        assert_eq!(source.lines_read(), 3);
    }

    #[test]
    fn framing_reports_bad_lines_as_items() {
        let mut codec = FrameLines::new(8);
        let mut buf = BytesMut::from(&b"abc\n\xff\n0123456789xyz\nok\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().unwrap(), "abc");
        assert_matches!(codec.decode(&mut buf).unwrap(), Some(Err(LineError::NotUtf8)));
        assert_matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Err(LineError::TooLong { max: 8 }))
        );
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().unwrap(), "ok");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[tokio::test]
    async fn close_ends_stream() {
        let (mut writer, reader) = tokio::io::duplex(256);
        let mut source = LineSource::new(reader, SourceMode::Companion, "duplex");
        writer.write_all(b"aabb\n").await.unwrap();
        assert!(source.recv().await.unwrap().is_some());
        source.close().await.unwrap();
        assert!(source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.txt");
        tokio::fs::write(&path, "# header\ncafe\n").await.unwrap();
        let spec = super::super::SourceSpec::File(path);
        let mut source = super::super::open(&spec, SourceMode::Companion).await.unwrap();
        let event = source.recv().await.unwrap().unwrap();
        assert_eq!(
            event,
            UpstreamEvent::RxLog(RxLogEvent {
                raw: vec![0xCA, 0xFE],
                rssi: None,
                snr: None,
            })
        );
        assert!(source.recv().await.unwrap().is_none());
    }
}
