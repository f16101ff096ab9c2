//! # kwire-protocol
//!
//! Codec for a versioned, length-prefixed request/response wire protocol
//! modeled on Kafka's.
//!
//! This crate provides:
//! - A type registry mapping each message kind to its versions and codecs
//! - Per-version field encoding, legacy and flexible (compact + tagged fields)
//! - Request and response framing over `std::io` and over byte buffers
//! - Magic v2 record batches with CRC32C validation
//! - One-shot byte streams for pre-encoded message fields
//! - Error codes and codec configuration

pub mod admin;
pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod messages;
pub mod records;
pub mod registry;
pub mod stream;
pub mod tagged;
pub mod wire;

pub use api::ApiKey;
pub use codec::{
    read_request, read_request_with, read_response, read_response_with, write_request, write_response, Encoder,
    FrameDecoder,
};
pub use config::{CodecConfig, ConfigError, UnknownTagPolicy};
pub use error::{ApiError, ErrorCode, ProtocolError};
pub use frame::{RequestFrame, RequestHeader, ResponseFrame, ResponseHeader};
pub use message::{Message, MessageRole};
pub use records::{Record, RecordBatch, RecordSet};
pub use registry::{registry, ApiType, Registry, RegistryBuilder};
pub use stream::ByteStream;
pub use tagged::TaggedFields;
pub use wire::{Decode, Encode, Reader, Writer};
