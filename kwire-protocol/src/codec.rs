//! Reading and writing frames over `std::io` streams, plus an incremental
//! decoder for callers that receive bytes in arbitrary chunks.
//!
//! Everything here uses the process-wide [`registry`].

use crate::api::ApiKey;
use crate::config::CodecConfig;
use crate::error::ProtocolError;
use crate::frame::{self, RequestFrame, ResponseFrame, LENGTH_PREFIX_SIZE};
use crate::message::Message;
use crate::registry::registry;
use bytes::{Bytes, BytesMut};
use std::io::{Read, Write};
use tracing::trace;

/// Encodes requests and responses into standalone buffers.
pub struct Encoder;

impl Encoder {
    /// Encodes a request frame.
    pub fn encode_request(
        version: i16,
        correlation_id: i32,
        client_id: Option<&str>,
        msg: &dyn Message,
    ) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(256);
        frame::encode_request(registry(), &mut buf, version, correlation_id, client_id, msg)?;
        Ok(buf)
    }

    /// Encodes a response frame.
    pub fn encode_response(version: i16, correlation_id: i32, msg: &dyn Message) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(256);
        frame::encode_response(registry(), &mut buf, version, correlation_id, msg)?;
        Ok(buf)
    }
}

/// Writes one request frame to `output`.
///
/// The frame is encoded in memory first and handed to `output` with a single
/// `write_all`, so nothing is written when encoding fails.
pub fn write_request<W: Write + ?Sized>(
    output: &mut W,
    version: i16,
    correlation_id: i32,
    client_id: Option<&str>,
    msg: &dyn Message,
) -> Result<(), ProtocolError> {
    let buf = Encoder::encode_request(version, correlation_id, client_id, msg)?;
    output.write_all(&buf)?;
    trace!(api = %msg.api_key(), version, correlation_id, len = buf.len(), "wrote request");
    Ok(())
}

/// Writes one response frame to `output`.
pub fn write_response<W: Write + ?Sized>(
    output: &mut W,
    version: i16,
    correlation_id: i32,
    msg: &dyn Message,
) -> Result<(), ProtocolError> {
    let buf = Encoder::encode_response(version, correlation_id, msg)?;
    output.write_all(&buf)?;
    trace!(api = %msg.api_key(), version, correlation_id, len = buf.len(), "wrote response");
    Ok(())
}

/// Reads one request frame with the default configuration.
pub fn read_request<R: Read + ?Sized>(input: &mut R) -> Result<RequestFrame, ProtocolError> {
    read_request_with(input, &CodecConfig::default())
}

/// Reads one request frame.
///
/// Never reads past the declared frame length, so consecutive frames can be
/// read from the same stream.
pub fn read_request_with<R: Read + ?Sized>(
    input: &mut R,
    config: &CodecConfig,
) -> Result<RequestFrame, ProtocolError> {
    let body = read_frame(input, config)?;
    let frame = frame::parse_request(registry(), body, config)?;
    trace!(
        api = %frame.api_key(),
        version = frame.api_version(),
        correlation_id = frame.correlation_id(),
        "read request"
    );
    Ok(frame)
}

/// Reads one response frame of `api_key` at `version` with the default
/// configuration.
pub fn read_response<R: Read + ?Sized>(
    input: &mut R,
    api_key: ApiKey,
    version: i16,
) -> Result<ResponseFrame, ProtocolError> {
    read_response_with(input, api_key, version, &CodecConfig::default())
}

pub fn read_response_with<R: Read + ?Sized>(
    input: &mut R,
    api_key: ApiKey,
    version: i16,
    config: &CodecConfig,
) -> Result<ResponseFrame, ProtocolError> {
    let body = read_frame(input, config)?;
    let frame = frame::parse_response(registry(), body, api_key, version, config)?;
    trace!(api = %api_key, version, correlation_id = frame.correlation_id(), "read response");
    Ok(frame)
}

/// Reads a length prefix and exactly that many bytes after it.
fn read_frame<R: Read + ?Sized>(input: &mut R, config: &CodecConfig) -> Result<Bytes, ProtocolError> {
    let prefix = read_exact_or_short(input, LENGTH_PREFIX_SIZE)?;
    let declared = i32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let len = frame::check_length(declared, config)?;
    read_exact_or_short(input, len)
}

/// Reads `len` bytes, reporting a premature end of input as `ShortFrame`.
fn read_exact_or_short<R: Read + ?Sized>(input: &mut R, len: usize) -> Result<Bytes, ProtocolError> {
    let mut data = Vec::with_capacity(len.min(64 * 1024));
    input.take(len as u64).read_to_end(&mut data)?;
    if data.len() < len {
        return Err(ProtocolError::ShortFrame {
            declared: len,
            available: data.len(),
        });
    }
    Ok(Bytes::from(data))
}

/// Buffers incoming bytes and decodes whole frames as they complete.
pub struct FrameDecoder {
    buffer: BytesMut,
    config: CodecConfig,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            config,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to decode the next request from the buffer.
    pub fn decode_request(&mut self) -> Result<Option<RequestFrame>, ProtocolError> {
        frame::decode_request(registry(), &mut self.buffer, &self.config)
    }

    /// Attempts to decode the next response from the buffer. The caller
    /// supplies the key and version of the request it answers.
    pub fn decode_response(&mut self, api_key: ApiKey, version: i16) -> Result<Option<ResponseFrame>, ProtocolError> {
        frame::decode_response(registry(), &mut self.buffer, api_key, version, &self.config)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
