//! DeleteTopics (key 20).

use super::ensure_default;
use crate::api::ApiKey;
use crate::error::ProtocolError;
use crate::message::impl_message;
use crate::tagged::TaggedFields;
use crate::wire::{Decode, Encode, Reader, Writer};

pub const MIN_VERSION: i16 = 0;
pub const MAX_VERSION: i16 = 5;
pub const FLEXIBLE_SINCE: i16 = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub topic_names: Vec<String>,
    pub timeout_ms: i32,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// v1+
    pub throttle_time_ms: i32,
    pub responses: Vec<ResponseTopic>,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseTopic {
    pub name: String,
    pub error_code: i16,
    /// v5+
    pub error_message: Option<String>,
    pub tagged_fields: TaggedFields,
}

impl_message!(Request, ApiKey::DeleteTopics);
impl_message!(Response, ApiKey::DeleteTopics);

impl Encode for Request {
    fn encode(&self, w: &mut Writer<'_>, _version: i16) -> Result<(), ProtocolError> {
        w.put_string_array(&self.topic_names)?;
        w.put_i32(self.timeout_ms);
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for Request {
    fn decode(r: &mut Reader, _version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            topic_names: r.get_string_array()?,
            timeout_ms: r.get_i32()?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for Response {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        if version >= 1 {
            w.put_i32(self.throttle_time_ms);
        } else {
            ensure_default(self.throttle_time_ms == 0, "throttle_time_ms", version)?;
        }
        w.put_structs(&self.responses, version)?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for Response {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        let throttle_time_ms = if version >= 1 { r.get_i32()? } else { 0 };
        Ok(Self {
            throttle_time_ms,
            responses: r.get_structs(version)?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for ResponseTopic {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_string(&self.name)?;
        w.put_i16(self.error_code);
        if version >= 5 {
            w.put_nullable_string(self.error_message.as_deref())?;
        } else {
            ensure_default(self.error_message.is_none(), "error_message", version)?;
        }
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for ResponseTopic {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        let name = r.get_string()?;
        let error_code = r.get_i16()?;
        let error_message = if version >= 5 { r.get_nullable_string()? } else { None };
        Ok(Self {
            name,
            error_code,
            error_message,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}
