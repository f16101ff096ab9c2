//! Tagged-field sections of flexible versions.
//!
//! ```text
//! tagged_fields := uvarint count ++ (uvarint tag ++ uvarint len ++ bytes)*
//! ```
//!
//! Tags are written in ascending order. The codec names no tags itself, so
//! every tag it meets is kept as raw bytes or skipped, depending on the
//! [`UnknownTagPolicy`].

use crate::config::UnknownTagPolicy;
use crate::error::ProtocolError;
use crate::wire::varint;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Raw tagged-field payloads keyed by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedFields(BTreeMap<u32, Bytes>);

impl TaggedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: u32, payload: Bytes) -> Option<Bytes> {
        self.0.insert(tag, payload)
    }

    pub fn with(mut self, tag: u32, payload: impl Into<Bytes>) -> Self {
        self.0.insert(tag, payload.into());
        self
    }

    pub fn get(&self, tag: u32) -> Option<&Bytes> {
        self.0.get(&tag)
    }

    pub fn remove(&mut self, tag: u32) -> Option<Bytes> {
        self.0.remove(&tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Bytes)> {
        self.0.iter().map(|(tag, payload)| (*tag, payload))
    }

    pub(crate) fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let count = u32::try_from(self.0.len())
            .map_err(|_| ProtocolError::encode("too many tagged fields"))?;
        varint::put_uvarint(buf, count);
        for (tag, payload) in &self.0 {
            let len = u32::try_from(payload.len()).map_err(|_| {
                ProtocolError::encode(format!("tagged field {} payload is too long", tag))
            })?;
            varint::put_uvarint(buf, *tag);
            varint::put_uvarint(buf, len);
            buf.put_slice(payload);
        }
        Ok(())
    }

    pub(crate) fn decode_from(
        buf: &mut Bytes,
        policy: UnknownTagPolicy,
    ) -> Result<Self, ProtocolError> {
        let count = varint::get_uvarint(buf)?;
        let mut fields = BTreeMap::new();
        let mut last_tag: Option<u32> = None;

        for _ in 0..count {
            let tag = varint::get_uvarint(buf)?;
            if let Some(last) = last_tag {
                if tag <= last {
                    return Err(ProtocolError::decode(format!(
                        "tagged field {} follows tag {}: tags must be unique and ascending",
                        tag, last
                    )));
                }
            }
            last_tag = Some(tag);

            let len = varint::get_uvarint(buf)? as usize;
            if buf.remaining() < len {
                return Err(ProtocolError::decode(format!(
                    "tagged field {} declares {} bytes, {} left",
                    tag,
                    len,
                    buf.remaining()
                )));
            }
            let payload = buf.split_to(len);
            match policy {
                UnknownTagPolicy::Preserve => {
                    fields.insert(tag, payload);
                }
                UnknownTagPolicy::Discard => {
                    tracing::trace!(tag, len, "discarding unknown tagged field");
                }
            }
        }

        Ok(Self(fields))
    }
}
