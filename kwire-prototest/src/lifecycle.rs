//! Capture, reset and release of one-shot stream fields.
//!
//! Encoding drains every [`ByteStream`](kwire_protocol::ByteStream) a
//! message holds, so a message can be written only once unless its streams
//! are re-armed. [`load`] copies the stream contents up front and
//! [`StreamSnapshot::reset`] re-arms the streams from that copy between
//! passes.

use bytes::{Buf, Bytes};
use kwire_protocol::{Message, ProtocolError};
use tracing::trace;

/// Durable copies of a message's stream contents, in traversal order.
#[derive(Debug, Clone, Default)]
pub struct StreamSnapshot {
    captured: Vec<Bytes>,
}

/// Captures every stream of `msg` and re-arms each with a fresh view over
/// its copy, so `msg` can be encoded right away.
pub fn load(msg: &dyn Message) -> Result<StreamSnapshot, ProtocolError> {
    let streams = msg.streams();
    let mut captured = Vec::with_capacity(streams.len());
    for (i, stream) in streams.into_iter().enumerate() {
        let data = stream
            .read_all()
            .map_err(|e| ProtocolError::Encode(format!("capturing stream {}: {}", i, e)))?;
        stream.replace(data.clone().reader());
        captured.push(data);
    }
    trace!(
        message = msg.type_name(),
        streams = captured.len(),
        "captured stream contents"
    );
    Ok(StreamSnapshot { captured })
}

impl StreamSnapshot {
    /// Replaces every stream of `msg` with a fresh view over the captured
    /// bytes. Safe to call any number of times.
    pub fn reset(&self, msg: &dyn Message) -> Result<(), ProtocolError> {
        let streams = msg.streams();
        if streams.len() != self.captured.len() {
            return Err(ProtocolError::Encode(format!(
                "{} holds {} streams but {} were captured",
                msg.type_name(),
                streams.len(),
                self.captured.len()
            )));
        }
        for (stream, data) in streams.into_iter().zip(&self.captured) {
            stream.replace(data.clone().reader());
        }
        Ok(())
    }

    /// Number of captured streams.
    pub fn len(&self) -> usize {
        self.captured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captured.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.captured.iter().map(Bytes::len).sum()
    }
}

/// Releases every stream handle `msg` holds. Idempotent.
pub fn close_message(msg: &dyn Message) {
    for stream in msg.streams() {
        stream.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwire_protocol::messages::{createpartitions, rawproduce};
    use kwire_protocol::ByteStream;

    fn raw_request(payload: &'static [u8]) -> rawproduce::Request {
        rawproduce::Request {
            topic_data: vec![rawproduce::TopicData {
                name: "events".to_string(),
                partition_data: vec![rawproduce::PartitionData {
                    index: 0,
                    records: Some(ByteStream::from_bytes(payload)),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_load_keeps_streams_readable() {
        let req = raw_request(b"abc");
        let snapshot = load(&req).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.total_bytes(), 3);

        let stream = req.streams()[0];
        assert_eq!(&stream.read_all().unwrap()[..], b"abc");
        assert!(stream.read_all().unwrap().is_empty());

        snapshot.reset(&req).unwrap();
        snapshot.reset(&req).unwrap();
        assert_eq!(&stream.read_all().unwrap()[..], b"abc");
    }

    #[test]
    fn test_reset_rejects_changed_layout() {
        let mut req = raw_request(b"abc");
        let snapshot = load(&req).unwrap();
        req.topic_data[0].partition_data[0].records = None;
        assert!(matches!(snapshot.reset(&req), Err(ProtocolError::Encode(_))));
    }

    #[test]
    fn test_close_message() {
        let req = raw_request(b"abc");
        close_message(&req);
        close_message(&req);
        assert!(req.streams()[0].is_closed());
        assert!(matches!(load(&req), Err(ProtocolError::Encode(_))));

        // No streams at all.
        let plain = createpartitions::Request::default();
        close_message(&plain);
        assert!(load(&plain).unwrap().is_empty());
    }
}
