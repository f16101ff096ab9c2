//! Repeated write and read passes over one message.
//!
//! The runner keeps one buffer for its lifetime. Each write pass re-arms the
//! message's streams afterwards and each read pass closes the streams of the
//! decoded message, so passes can repeat indefinitely.

use crate::error::HarnessError;
use crate::lifecycle::{close_message, load, StreamSnapshot};
use kwire_protocol::{read_request, write_request, Message};
use std::time::{Duration, Instant};
use tracing::debug;

const CLIENT_ID: &str = "client";
const CORRELATION_ID: i32 = 1234;

/// Timing of a [`Throughput::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputReport {
    pub iterations: u64,
    /// Size of one encoded frame.
    pub frame_bytes: usize,
    pub write_elapsed: Duration,
    pub read_elapsed: Duration,
}

impl ThroughputReport {
    pub fn write_bytes_per_sec(&self) -> f64 {
        rate(self.frame_bytes, self.iterations, self.write_elapsed)
    }

    pub fn read_bytes_per_sec(&self) -> f64 {
        rate(self.frame_bytes, self.iterations, self.read_elapsed)
    }
}

fn rate(frame_bytes: usize, iterations: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    (frame_bytes as f64 * iterations as f64) / secs
}

/// Encodes and decodes one request at a fixed version.
pub struct Throughput<'a> {
    version: i16,
    msg: &'a dyn Message,
    snapshot: StreamSnapshot,
    buffer: Vec<u8>,
}

impl<'a> Throughput<'a> {
    pub fn new(version: i16, msg: &'a dyn Message) -> Result<Self, HarnessError> {
        Ok(Self {
            version,
            msg,
            snapshot: load(msg)?,
            buffer: Vec::with_capacity(1024),
        })
    }

    /// Encodes the message into the internal buffer, replacing its previous
    /// content. Returns the frame size.
    pub fn write_pass(&mut self) -> Result<usize, HarnessError> {
        self.buffer.clear();
        write_request(&mut self.buffer, self.version, CORRELATION_ID, Some(CLIENT_ID), self.msg)?;
        self.snapshot.reset(self.msg)?;
        Ok(self.buffer.len())
    }

    /// Decodes the frame left by the last write pass, writing one first if
    /// there is none. Returns the frame size.
    pub fn read_pass(&mut self) -> Result<usize, HarnessError> {
        if self.buffer.is_empty() {
            self.write_pass()?;
        }
        let frame = read_request(&mut self.buffer.as_slice())?;
        close_message(frame.message());
        Ok(self.buffer.len())
    }

    /// The frame produced by the last write pass.
    pub fn frame(&self) -> &[u8] {
        &self.buffer
    }

    /// Times `iterations` write passes, then `iterations` read passes.
    pub fn run(&mut self, iterations: u64) -> Result<ThroughputReport, HarnessError> {
        let mut frame_bytes = 0;

        let start = Instant::now();
        for _ in 0..iterations {
            frame_bytes = self.write_pass()?;
        }
        let write_elapsed = start.elapsed();

        let start = Instant::now();
        for _ in 0..iterations {
            frame_bytes = self.read_pass()?;
        }
        let read_elapsed = start.elapsed();

        let report = ThroughputReport {
            iterations,
            frame_bytes,
            write_elapsed,
            read_elapsed,
        };
        debug!(
            message = self.msg.type_name(),
            version = self.version,
            iterations,
            frame_bytes,
            write_bps = report.write_bytes_per_sec(),
            read_bps = report.read_bytes_per_sec(),
            "throughput run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwire_protocol::messages::{createpartitions, rawproduce};
    use kwire_protocol::ByteStream;

    #[test]
    fn test_write_passes_are_stable() {
        let req = rawproduce::Request {
            topic_data: vec![rawproduce::TopicData {
                name: "t".to_string(),
                partition_data: vec![rawproduce::PartitionData {
                    index: 0,
                    records: Some(ByteStream::from_bytes(&b"opaque"[..])),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut runner = Throughput::new(3, &req).unwrap();
        let first_len = runner.write_pass().unwrap();
        let first = runner.frame().to_vec();
        for _ in 0..3 {
            assert_eq!(runner.write_pass().unwrap(), first_len);
            assert_eq!(runner.frame(), &first[..]);
        }
    }

    #[test]
    fn test_run_reports_frame_size() {
        let req = createpartitions::Request::default();
        let mut runner = Throughput::new(0, &req).unwrap();
        assert_eq!(runner.read_pass().unwrap(), runner.frame().len());

        let report = runner.run(10).unwrap();
        assert_eq!(report.iterations, 10);
        assert_eq!(report.frame_bytes, runner.frame().len());
    }

    #[test]
    fn test_zero_elapsed_rate() {
        assert_eq!(rate(100, 10, Duration::ZERO), 0.0);
    }
}
