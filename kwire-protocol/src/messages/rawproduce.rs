//! Produce request carrying pre-encoded record batches.
//!
//! Registered as an override of [`produce::Request`]: it writes the same
//! bytes, but the records field is a one-shot [`ByteStream`] copied to the
//! wire as-is, with no batch parsing or re-encoding. Reading such a frame
//! back yields a [`produce::Request`].

use super::produce;
use crate::api::ApiKey;
use crate::error::ProtocolError;
use crate::message::Message;
use crate::records::RecordSet;
use crate::stream::ByteStream;
use crate::tagged::TaggedFields;
use crate::wire::{Encode, Writer};
use std::any::Any;

#[derive(Debug)]
pub struct Request {
    pub transactional_id: Option<String>,
    pub acks: i16,
    pub timeout_ms: i32,
    pub topic_data: Vec<TopicData>,
    pub tagged_fields: TaggedFields,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            transactional_id: None,
            acks: -1,
            timeout_ms: 30_000,
            topic_data: Vec::new(),
            tagged_fields: TaggedFields::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TopicData {
    pub name: String,
    pub partition_data: Vec<PartitionData>,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Default)]
pub struct PartitionData {
    pub index: i32,
    /// Encoded record batches, or `None` for a null records field.
    pub records: Option<ByteStream>,
    pub tagged_fields: TaggedFields,
}

impl PartitionData {
    /// Encodes `records` once and wraps the bytes in a stream.
    pub fn from_record_set(index: i32, records: &RecordSet) -> Result<Self, ProtocolError> {
        Ok(Self {
            index,
            records: Some(ByteStream::from_bytes(records.to_bytes()?)),
            tagged_fields: TaggedFields::default(),
        })
    }
}

impl Message for Request {
    fn api_key(&self) -> ApiKey {
        ApiKey::Produce
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn streams(&self) -> Vec<&ByteStream> {
        self.topic_data
            .iter()
            .flat_map(|t| &t.partition_data)
            .filter_map(|p| p.records.as_ref())
            .collect()
    }
}

impl TryFrom<&produce::Request> for Request {
    type Error = ProtocolError;

    fn try_from(req: &produce::Request) -> Result<Self, Self::Error> {
        let topic_data = req
            .topic_data
            .iter()
            .map(|topic| {
                let partition_data = topic
                    .partition_data
                    .iter()
                    .map(|p| {
                        let records = match &p.records {
                            Some(set) => Some(ByteStream::from_bytes(set.to_bytes()?)),
                            None => None,
                        };
                        Ok(PartitionData {
                            index: p.index,
                            records,
                            tagged_fields: p.tagged_fields.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, ProtocolError>>()?;
                Ok(TopicData {
                    name: topic.name.clone(),
                    partition_data,
                    tagged_fields: topic.tagged_fields.clone(),
                })
            })
            .collect::<Result<Vec<_>, ProtocolError>>()?;

        Ok(Self {
            transactional_id: req.transactional_id.clone(),
            acks: req.acks,
            timeout_ms: req.timeout_ms,
            topic_data,
            tagged_fields: req.tagged_fields.clone(),
        })
    }
}

impl Encode for Request {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_nullable_string(self.transactional_id.as_deref())?;
        w.put_i16(self.acks);
        w.put_i32(self.timeout_ms);
        w.put_structs(&self.topic_data, version)?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Encode for TopicData {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_string(&self.name)?;
        w.put_structs(&self.partition_data, version)?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Encode for PartitionData {
    fn encode(&self, w: &mut Writer<'_>, _version: i16) -> Result<(), ProtocolError> {
        w.put_i32(self.index);
        match &self.records {
            Some(stream) => {
                let data = stream.read_all().map_err(|e| {
                    ProtocolError::encode(format!("partition {} records: {}", self.index, e))
                })?;
                w.put_nullable_bytes(Some(&data[..]))?;
            }
            None => w.put_nullable_bytes(None)?,
        }
        w.put_tagged_fields(&self.tagged_fields)
    }
}
