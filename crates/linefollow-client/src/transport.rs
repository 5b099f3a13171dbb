//! Streaming transport to the simulator
//!
//! The simulator is an opaque peer speaking newline-delimited JSON over
//! TCP: one command or sensor-update record per line. This module frames
//! and parses that stream. Read timeouts and malformed frames surface as
//! "no data" so the control loop keeps polling; a closed peer or failed
//! write is fatal.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use linefollow_core::{LineFollowError, Result, SensorReading};

/// Outbound command records, one JSON object per line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Begin the simulation run
    StartSimulation,
    /// Halt the simulation run
    StopSimulation,
    /// Set wheel speeds, with learning telemetry riding along
    SetSpeed {
        /// Left wheel speed
        #[serde(rename = "L")]
        left: f64,
        /// Right wheel speed
        #[serde(rename = "R")]
        right: f64,
        /// Current discrete state id
        #[serde(rename = "State")]
        state: u8,
        /// Reward observed this tick
        #[serde(rename = "Reward")]
        reward: f64,
        /// Selected action id
        #[serde(rename = "Action")]
        action: u8,
    },
}

/// Inbound record envelope; only `sensor_update` records are consumed.
#[derive(Debug, Deserialize)]
struct InboundRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sensors: Option<SensorReading>,
}

/// Accumulates raw socket bytes and yields one newline-terminated frame
/// at a time, keeping any partial remainder buffered for the next read.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Whether at least one complete frame is buffered.
    #[must_use]
    pub fn has_frame(&self) -> bool {
        self.buf.contains(&b'\n')
    }

    /// Extract the next complete frame, without its newline terminator.
    pub fn pop_frame(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut frame: Vec<u8> = self.buf.drain(..=pos).collect();
        frame.pop();
        Some(frame)
    }
}

/// Duplex channel to the simulator process.
pub struct SimClient {
    stream: Option<TcpStream>,
    frames: FrameBuffer,
    read_timeout: Duration,
}

impl SimClient {
    /// Bound on a single receive poll so the control loop is never
    /// blocked indefinitely.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

    /// Connect to the simulator.
    ///
    /// A refused connection is a fatal transport error; there is no
    /// automatic reconnect.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            stream: Some(stream),
            frames: FrameBuffer::new(),
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
        })
    }

    /// Override the receive poll bound.
    pub fn set_read_timeout(&mut self, read_timeout: Duration) {
        self.read_timeout = read_timeout;
    }

    /// Serialize and send one command, framed by a newline terminator.
    ///
    /// Commands are fire-and-forget; a failed write (broken pipe, peer
    /// reset) is fatal.
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LineFollowError::Transport("channel is closed".into()))?;
        let mut line = serde_json::to_vec(command)?;
        line.push(b'\n');
        stream.write_all(&line).await?;
        Ok(())
    }

    /// Poll for the next sensor update.
    ///
    /// Reads whatever bytes arrive within the receive timeout and consumes
    /// at most one complete frame per call, leaving the remainder buffered.
    /// Returns `Ok(None)` on timeout, on records with any other type tag,
    /// and on malformed frames; none of those ever reach the caller as a
    /// fault. A closed peer or socket error is fatal.
    pub async fn receive(&mut self) -> Result<Option<SensorReading>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LineFollowError::Transport("channel is closed".into()))?;
        if !self.frames.has_frame() {
            let mut chunk = [0u8; 1024];
            match timeout(self.read_timeout, stream.read(&mut chunk)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(LineFollowError::Transport(
                        "peer closed the connection".into(),
                    ))
                }
                Ok(Ok(n)) => self.frames.extend(&chunk[..n]),
                Ok(Err(err)) => return Err(err.into()),
            }
        }
        let Some(frame) = self.frames.pop_frame() else {
            return Ok(None);
        };
        Ok(parse_frame(&frame))
    }

    /// Release the channel. Idempotent if already closed.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("simulator channel closed");
        }
    }
}

/// Decode one frame, keeping only well-formed sensor updates.
fn parse_frame(frame: &[u8]) -> Option<SensorReading> {
    let record: InboundRecord = match serde_json::from_slice(frame) {
        Ok(record) => record,
        Err(err) => {
            warn!(%err, "dropping malformed frame");
            return None;
        }
    };
    if record.kind != "sensor_update" {
        debug!(kind = %record.kind, "ignoring non-sensor record");
        return None;
    }
    record.sensors
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;

    const CENTERED: &str = concat!(
        r#"{"type":"sensor_update","sensors":{"left_corner":0.0,"left":0.0,"#,
        r#""middle":0.9,"right":0.0,"right_corner":0.0}}"#,
    );

    #[test]
    fn frames_survive_arbitrary_read_splits() {
        let stream = format!("{CENTERED}\n{CENTERED}\n");
        let bytes = stream.as_bytes();
        // Split the byte stream at every possible position: each complete
        // frame must come out exactly once, in order, regardless.
        for split in 0..bytes.len() {
            let mut buffer = FrameBuffer::new();
            buffer.extend(&bytes[..split]);
            let mut frames = Vec::new();
            while let Some(frame) = buffer.pop_frame() {
                frames.push(frame);
            }
            buffer.extend(&bytes[split..]);
            while let Some(frame) = buffer.pop_frame() {
                frames.push(frame);
            }
            assert_eq!(frames.len(), 2, "split at {split}");
            assert!(frames.iter().all(|f| f == CENTERED.as_bytes()));
        }
    }

    #[test]
    fn partial_frame_stays_buffered() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"{\"type\":");
        assert!(buffer.pop_frame().is_none());
        buffer.extend(b"\"ping\"}\n");
        assert_eq!(buffer.pop_frame().unwrap(), b"{\"type\":\"ping\"}");
        assert!(buffer.pop_frame().is_none());
    }

    #[test]
    fn commands_serialize_to_the_wire_format() {
        assert_eq!(
            serde_json::to_string(&Command::StartSimulation).unwrap(),
            r#"{"command":"start_simulation"}"#
        );
        assert_eq!(
            serde_json::to_string(&Command::StopSimulation).unwrap(),
            r#"{"command":"stop_simulation"}"#
        );
        let set_speed = Command::SetSpeed {
            left: 2.0,
            right: 0.5,
            state: 4,
            reward: 20.0,
            action: 4,
        };
        assert_eq!(
            serde_json::to_string(&set_speed).unwrap(),
            r#"{"command":"set_speed","L":2.0,"R":0.5,"State":4,"Reward":20.0,"Action":4}"#
        );
    }

    #[test]
    fn only_sensor_updates_yield_readings() {
        assert!(parse_frame(CENTERED.as_bytes()).is_some());
        assert!(parse_frame(br#"{"type":"heartbeat"}"#).is_none());
        assert!(parse_frame(br#"{"type":"sensor_update"}"#).is_none());
        assert!(parse_frame(b"not json at all").is_none());
        assert!(parse_frame(&[0xff, 0xfe, b'{']).is_none());
    }

    #[tokio::test]
    async fn receive_yields_one_reading_per_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Two frames written in three uneven chunks, one mid-frame.
            let stream = format!("{CENTERED}\n{{\"type\":\"status\"}}\n{CENTERED}\n");
            let bytes = stream.as_bytes();
            socket.write_all(&bytes[..17]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            socket.write_all(&bytes[17..140]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            socket.write_all(&bytes[140..]).await.unwrap();
            // Hold the socket open until the client is done reading.
            let mut sink = [0u8; 64];
            let _ = socket.read(&mut sink).await;
        });

        let mut client = SimClient::connect("127.0.0.1", addr.port()).await.unwrap();
        let mut readings = Vec::new();
        for _ in 0..20 {
            if let Some(reading) = client.receive().await.unwrap() {
                readings.push(reading);
            }
            if readings.len() == 2 {
                break;
            }
        }
        assert_eq!(readings.len(), 2);
        assert!(readings.iter().all(|r| r.middle > 0.8));
        client.close();
        client.close();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn peer_close_is_a_fatal_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut client = SimClient::connect("127.0.0.1", addr.port()).await.unwrap();
        server.await.unwrap();
        let mut outcome = Ok(None);
        for _ in 0..10 {
            outcome = client.receive().await;
            if outcome.is_err() {
                break;
            }
        }
        assert!(matches!(outcome, Err(LineFollowError::Transport(_))));
    }

    #[tokio::test]
    async fn commands_arrive_newline_terminated() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::AsyncBufReadExt::lines(BufReader::new(socket));
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
                if collected.len() == 2 {
                    break;
                }
            }
            collected
        });

        let mut client = SimClient::connect("127.0.0.1", addr.port()).await.unwrap();
        client.send(&Command::StartSimulation).await.unwrap();
        client
            .send(&Command::SetSpeed {
                left: 2.0,
                right: 2.0,
                state: 4,
                reward: 20.0,
                action: 0,
            })
            .await
            .unwrap();
        let lines = server.await.unwrap();
        assert_eq!(lines[0], r#"{"command":"start_simulation"}"#);
        assert!(lines[1].contains(r#""command":"set_speed""#));
        assert!(lines[1].contains(r#""State":4"#));
    }
}
