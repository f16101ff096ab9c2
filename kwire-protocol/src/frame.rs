//! Length-prefixed request and response frames.
//!
//! Request frame:
//!
//! ```text
//! +---------+---------+-------------+----------------+-----------+------------+------+
//! | length  | api_key | api_version | correlation_id | client_id | [tags]     | body |
//! | 4 bytes | 2 bytes |   2 bytes   |    4 bytes     | i16 + str | flexible   |      |
//! +---------+---------+-------------+----------------+-----------+------------+------+
//! ```
//!
//! Response frame:
//!
//! ```text
//! +---------+----------------+--------+------+
//! | length  | correlation_id | [tags] | body |
//! | 4 bytes |    4 bytes     |        |      |
//! +---------+----------------+--------+------+
//! ```
//!
//! `length` counts every byte after itself. The client id keeps its int16
//! length prefix even in flexible versions.

use crate::api::ApiKey;
use crate::config::CodecConfig;
use crate::error::ProtocolError;
use crate::message::{Message, MessageRole};
use crate::registry::{ApiType, EncodeFn, Registry};
use crate::tagged::TaggedFields;
use crate::wire::{Reader, Writer};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Header fields of a request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
    /// Header tagged fields; always empty below the first flexible version.
    pub tagged_fields: TaggedFields,
}

/// Header fields of a response frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    pub correlation_id: i32,
    pub tagged_fields: TaggedFields,
}

/// A decoded request: its header and a freshly allocated body.
#[derive(Debug)]
pub struct RequestFrame {
    pub header: RequestHeader,
    pub message: Box<dyn Message>,
}

impl RequestFrame {
    pub fn api_key(&self) -> ApiKey {
        self.header.api_key
    }

    pub fn api_version(&self) -> i16 {
        self.header.api_version
    }

    pub fn correlation_id(&self) -> i32 {
        self.header.correlation_id
    }

    pub fn client_id(&self) -> Option<&str> {
        self.header.client_id.as_deref()
    }

    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    /// Borrows the body as its concrete type.
    pub fn downcast<T: Message>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    pub fn into_message(self) -> Box<dyn Message> {
        self.message
    }
}

/// A decoded response. Responses do not carry their key or version on the
/// wire, so both are the ones the caller asked to decode with.
#[derive(Debug)]
pub struct ResponseFrame {
    pub header: ResponseHeader,
    pub api_key: ApiKey,
    pub api_version: i16,
    pub message: Box<dyn Message>,
}

impl ResponseFrame {
    pub fn correlation_id(&self) -> i32 {
        self.header.correlation_id
    }

    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    pub fn downcast<T: Message>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    pub fn into_message(self) -> Box<dyn Message> {
        self.message
    }
}

/// Appends a complete request frame to `buf`.
///
/// On error `buf` is left as it was.
pub fn encode_request(
    registry: &Registry,
    buf: &mut BytesMut,
    version: i16,
    correlation_id: i32,
    client_id: Option<&str>,
    msg: &dyn Message,
) -> Result<(), ProtocolError> {
    let (api, encode) = registry.encoder(msg, MessageRole::Request, version)?;
    let start = buf.len();
    let result = put_request(buf, api, encode, version, correlation_id, client_id, msg)
        .and_then(|()| patch_length(buf, start));
    if result.is_err() {
        buf.truncate(start);
    }
    result
}

fn put_request(
    buf: &mut BytesMut,
    api: &ApiType,
    encode: EncodeFn,
    version: i16,
    correlation_id: i32,
    client_id: Option<&str>,
    msg: &dyn Message,
) -> Result<(), ProtocolError> {
    let flexible = api.is_flexible(version);
    buf.put_i32(0);
    buf.put_i16(api.key().code());
    buf.put_i16(version);
    buf.put_i32(correlation_id);
    Writer::new(buf, false).put_nullable_string(client_id)?;
    if flexible {
        Writer::new(buf, true).put_tagged_fields(&TaggedFields::default())?;
    }
    encode(msg, &mut Writer::new(buf, flexible), version)
}

/// Appends a complete response frame to `buf`.
///
/// On error `buf` is left as it was.
pub fn encode_response(
    registry: &Registry,
    buf: &mut BytesMut,
    version: i16,
    correlation_id: i32,
    msg: &dyn Message,
) -> Result<(), ProtocolError> {
    let (api, encode) = registry.encoder(msg, MessageRole::Response, version)?;
    let start = buf.len();
    let result = put_response(buf, api, encode, version, correlation_id, msg)
        .and_then(|()| patch_length(buf, start));
    if result.is_err() {
        buf.truncate(start);
    }
    result
}

fn put_response(
    buf: &mut BytesMut,
    api: &ApiType,
    encode: EncodeFn,
    version: i16,
    correlation_id: i32,
    msg: &dyn Message,
) -> Result<(), ProtocolError> {
    buf.put_i32(0);
    buf.put_i32(correlation_id);
    if api.response_header_flexible(version) {
        Writer::new(buf, true).put_tagged_fields(&TaggedFields::default())?;
    }
    encode(msg, &mut Writer::new(buf, api.is_flexible(version)), version)
}

/// Fills in the placeholder length prefix written at `start`.
fn patch_length(buf: &mut BytesMut, start: usize) -> Result<(), ProtocolError> {
    let len = buf.len() - start - LENGTH_PREFIX_SIZE;
    let len = i32::try_from(len)
        .map_err(|_| ProtocolError::encode(format!("frame of {} bytes exceeds the length prefix", len)))?;
    buf[start..start + LENGTH_PREFIX_SIZE].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Validates a declared frame length against the configured maximum.
pub(crate) fn check_length(declared: i32, config: &CodecConfig) -> Result<usize, ProtocolError> {
    if declared < 0 {
        return Err(ProtocolError::decode(format!("negative frame length {}", declared)));
    }
    let len = declared as usize;
    if len > config.max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: config.max_frame_size,
        });
    }
    Ok(len)
}

/// Splits one whole frame (without its prefix) off the front of `buf`.
///
/// Returns `Ok(None)` while the frame is still incomplete.
fn split_frame(buf: &mut BytesMut, config: &CodecConfig) -> Result<Option<Bytes>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }
    let declared = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let len = check_length(declared, config)?;
    if buf.len() < LENGTH_PREFIX_SIZE + len {
        return Ok(None);
    }
    buf.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(buf.split_to(len).freeze()))
}

/// Decodes the next request frame buffered in `buf`, consuming it.
///
/// Returns `Ok(None)` if more data is needed.
pub fn decode_request(
    registry: &Registry,
    buf: &mut BytesMut,
    config: &CodecConfig,
) -> Result<Option<RequestFrame>, ProtocolError> {
    match split_frame(buf, config)? {
        Some(frame) => parse_request(registry, frame, config).map(Some),
        None => Ok(None),
    }
}

/// Decodes the next response frame buffered in `buf`, consuming it.
pub fn decode_response(
    registry: &Registry,
    buf: &mut BytesMut,
    api_key: ApiKey,
    version: i16,
    config: &CodecConfig,
) -> Result<Option<ResponseFrame>, ProtocolError> {
    match split_frame(buf, config)? {
        Some(frame) => parse_response(registry, frame, api_key, version, config).map(Some),
        None => Ok(None),
    }
}

/// Parses a request frame whose length prefix has already been removed.
pub fn parse_request(
    registry: &Registry,
    frame: Bytes,
    config: &CodecConfig,
) -> Result<RequestFrame, ProtocolError> {
    let mut r = Reader::new(frame, false).with_unknown_tags(config.unknown_tags);
    let api = registry.api_by_code(r.get_i16()?)?;
    let api_version = r.get_i16()?;
    api.check_version(api_version)?;
    let correlation_id = r.get_i32()?;
    let client_id = r.get_nullable_string()?;

    let flexible = api.is_flexible(api_version);
    r.set_flexible(flexible);
    let tagged_fields = r.get_tagged_fields()?;

    let message = (api.decoder(MessageRole::Request))(&mut r, api_version)?;
    discard_trailing(&mut r, api, api_version);

    Ok(RequestFrame {
        header: RequestHeader {
            api_key: api.key(),
            api_version,
            correlation_id,
            client_id,
            tagged_fields,
        },
        message,
    })
}

/// Parses a response frame of `api_key` at `version` whose length prefix
/// has already been removed.
pub fn parse_response(
    registry: &Registry,
    frame: Bytes,
    api_key: ApiKey,
    version: i16,
    config: &CodecConfig,
) -> Result<ResponseFrame, ProtocolError> {
    let api = registry.api(api_key)?;
    api.check_version(version)?;

    let mut r = Reader::new(frame, false).with_unknown_tags(config.unknown_tags);
    let correlation_id = r.get_i32()?;
    let tagged_fields = if api.response_header_flexible(version) {
        r.set_flexible(true);
        r.get_tagged_fields()?
    } else {
        TaggedFields::default()
    };

    r.set_flexible(api.is_flexible(version));
    let message = (api.decoder(MessageRole::Response))(&mut r, version)?;
    discard_trailing(&mut r, api, version);

    Ok(ResponseFrame {
        header: ResponseHeader {
            correlation_id,
            tagged_fields,
        },
        api_key,
        api_version: version,
        message,
    })
}

fn discard_trailing(r: &mut Reader, api: &ApiType, version: i16) {
    let trailing = r.discard_remaining();
    if trailing > 0 {
        debug!(api = %api.key(), version, trailing, "discarding trailing bytes after message body");
    }
}
