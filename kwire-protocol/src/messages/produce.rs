//! Produce (key 0), v3-v9.
//!
//! Records travel as a nullable bytes field holding consecutive magic v2
//! batches. This module decodes them into [`RecordSet`]s; see
//! [`rawproduce`](super::rawproduce) for the variant that streams
//! pre-encoded bytes instead.

use super::ensure_default;
use crate::api::ApiKey;
use crate::error::ProtocolError;
use crate::message::impl_message;
use crate::records::RecordSet;
use crate::tagged::TaggedFields;
use crate::wire::{Decode, Encode, Reader, Writer};

pub const MIN_VERSION: i16 = 3;
pub const MAX_VERSION: i16 = 9;
pub const FLEXIBLE_SINCE: i16 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub transactional_id: Option<String>,
    /// 0: no ack, 1: leader only, -1: full ISR.
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

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicData {
    pub name: String,
    pub partition_data: Vec<PartitionData>,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionData {
    pub index: i32,
    pub records: Option<RecordSet>,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub responses: Vec<TopicResponse>,
    pub throttle_time_ms: i32,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicResponse {
    pub name: String,
    pub partition_responses: Vec<PartitionResponse>,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionResponse {
    pub index: i32,
    pub error_code: i16,
    pub base_offset: i64,
    pub log_append_time_ms: i64,
    /// v5+
    pub log_start_offset: i64,
    /// v8+
    pub record_errors: Vec<BatchIndexAndErrorMessage>,
    /// v8+
    pub error_message: Option<String>,
    pub tagged_fields: TaggedFields,
}

impl Default for PartitionResponse {
    fn default() -> Self {
        Self {
            index: 0,
            error_code: 0,
            base_offset: 0,
            log_append_time_ms: -1,
            log_start_offset: -1,
            record_errors: Vec::new(),
            error_message: None,
            tagged_fields: TaggedFields::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchIndexAndErrorMessage {
    pub batch_index: i32,
    pub batch_index_error_message: Option<String>,
    pub tagged_fields: TaggedFields,
}

impl_message!(Request, ApiKey::Produce);
impl_message!(Response, ApiKey::Produce);

impl Request {
    pub fn record_count(&self) -> usize {
        self.topic_data
            .iter()
            .flat_map(|t| &t.partition_data)
            .filter_map(|p| p.records.as_ref())
            .map(RecordSet::record_count)
            .sum()
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

impl Decode for Request {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            transactional_id: r.get_nullable_string()?,
            acks: r.get_i16()?,
            timeout_ms: r.get_i32()?,
            topic_data: r.get_structs(version)?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for TopicData {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_string(&self.name)?;
        w.put_structs(&self.partition_data, version)?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for TopicData {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: r.get_string()?,
            partition_data: r.get_structs(version)?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for PartitionData {
    fn encode(&self, w: &mut Writer<'_>, _version: i16) -> Result<(), ProtocolError> {
        w.put_i32(self.index);
        match &self.records {
            Some(records) => w.put_nullable_bytes(Some(&records.to_bytes()?[..]))?,
            None => w.put_nullable_bytes(None)?,
        }
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for PartitionData {
    fn decode(r: &mut Reader, _version: i16) -> Result<Self, ProtocolError> {
        let index = r.get_i32()?;
        let records = r.get_nullable_bytes()?.map(RecordSet::from_bytes).transpose()?;
        Ok(Self {
            index,
            records,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for Response {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_structs(&self.responses, version)?;
        w.put_i32(self.throttle_time_ms);
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for Response {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            responses: r.get_structs(version)?,
            throttle_time_ms: r.get_i32()?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for TopicResponse {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_string(&self.name)?;
        w.put_structs(&self.partition_responses, version)?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for TopicResponse {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: r.get_string()?,
            partition_responses: r.get_structs(version)?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for PartitionResponse {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_i32(self.index);
        w.put_i16(self.error_code);
        w.put_i64(self.base_offset);
        w.put_i64(self.log_append_time_ms);
        if version >= 5 {
            w.put_i64(self.log_start_offset);
        } else {
            ensure_default(self.log_start_offset == -1, "log_start_offset", version)?;
        }
        if version >= 8 {
            w.put_structs(&self.record_errors, version)?;
            w.put_nullable_string(self.error_message.as_deref())?;
        } else {
            ensure_default(self.record_errors.is_empty(), "record_errors", version)?;
            ensure_default(self.error_message.is_none(), "error_message", version)?;
        }
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for PartitionResponse {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        let mut resp = Self {
            index: r.get_i32()?,
            error_code: r.get_i16()?,
            base_offset: r.get_i64()?,
            log_append_time_ms: r.get_i64()?,
            ..Default::default()
        };
        if version >= 5 {
            resp.log_start_offset = r.get_i64()?;
        }
        if version >= 8 {
            resp.record_errors = r.get_structs(version)?;
            resp.error_message = r.get_nullable_string()?;
        }
        resp.tagged_fields = r.get_tagged_fields()?;
        Ok(resp)
    }
}

impl Encode for BatchIndexAndErrorMessage {
    fn encode(&self, w: &mut Writer<'_>, _version: i16) -> Result<(), ProtocolError> {
        w.put_i32(self.batch_index);
        w.put_nullable_string(self.batch_index_error_message.as_deref())?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for BatchIndexAndErrorMessage {
    fn decode(r: &mut Reader, _version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            batch_index: r.get_i32()?,
            batch_index_error_message: r.get_nullable_string()?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::messages::testing::roundtrip;
    use crate::records::RecordBatch;
    use bytes::Bytes;

    pub(crate) fn sample_request() -> Request {
        let batch = RecordBatch::new(1_700_000_000_000)
            .with_record(Some(Bytes::from_static(b"k")), Some(Bytes::from_static(b"hello")), 1_700_000_000_000).unwrap()
            .with_record(None, Some(Bytes::from_static(b"world")), 1_700_000_000_010).unwrap();
        Request {
            transactional_id: None,
            acks: 1,
            timeout_ms: 500,
            topic_data: vec![TopicData {
                name: "events".to_string(),
                partition_data: vec![
                    PartitionData {
                        index: 0,
                        records: Some(RecordSet::new(vec![batch])),
                        ..Default::default()
                    },
                    PartitionData {
                        index: 1,
                        records: None,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_request_roundtrip_all_versions() {
        let req = sample_request();
        assert_eq!(req.record_count(), 2);
        for version in MIN_VERSION..=MAX_VERSION {
            let (_, decoded) = roundtrip(&req, version, version >= FLEXIBLE_SINCE);
            assert_eq!(decoded, req, "v{}", version);
        }
    }

    #[test]
    fn test_response_fields_follow_version() {
        let resp = Response {
            responses: vec![TopicResponse {
                name: "events".to_string(),
                partition_responses: vec![PartitionResponse {
                    index: 0,
                    error_code: 87,
                    base_offset: 42,
                    log_append_time_ms: 1_700_000_000_000,
                    log_start_offset: 7,
                    record_errors: vec![BatchIndexAndErrorMessage {
                        batch_index: 1,
                        batch_index_error_message: Some("bad record".to_string()),
                        ..Default::default()
                    }],
                    error_message: Some("INVALID_RECORD".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            throttle_time_ms: 3,
            ..Default::default()
        };


        for version in 8..=MAX_VERSION {
            let (_, decoded) = roundtrip(&resp, version, version >= FLEXIBLE_SINCE);
            assert_eq!(decoded, resp);
        }

        let mut legacy = resp.clone();
        let p = &mut legacy.responses[0].partition_responses[0];
        p.record_errors.clear();
        p.error_message = None;
        for version in 5..8 {
            let (_, decoded) = roundtrip(&legacy, version, false);
            assert_eq!(decoded, legacy);
        }

        legacy.responses[0].partition_responses[0].log_start_offset = -1;
        let (_, v4) = roundtrip(&legacy, 4, false);
        assert_eq!(v4, legacy);
    }

    #[test]
    fn test_fields_missing_from_version_rejected() {
        let mut resp = Response::default();
        resp.responses.push(TopicResponse {
            name: "events".to_string(),
            partition_responses: vec![PartitionResponse {
                log_start_offset: 7,
                ..Default::default()
            }],
            ..Default::default()
        });

        let mut buf = bytes::BytesMut::new();
        let err = resp.encode(&mut Writer::new(&mut buf, false), 4).unwrap_err();
        assert!(matches!(err, ProtocolError::Encode(ref reason) if reason.contains("log_start_offset")));
        assert_eq!(roundtrip(&resp, 5, false).1, resp);

        resp.responses[0].partition_responses[0].error_message = Some("INVALID_RECORD".to_string());
        let err = resp.encode(&mut Writer::new(&mut buf, false), 7).unwrap_err();
        assert!(matches!(err, ProtocolError::Encode(ref reason) if reason.contains("error_message")));
    }

    #[test]
    fn test_corrupt_records_fail_decode() {
        let mut req = sample_request();
        req.topic_data[0].partition_data[1].records = None;
        let (bytes, _) = roundtrip(&req, 3, false);

        // The batch ends before the second partition's index and null length.
        let mut raw = bytes.to_vec();
        let batch_end = raw.len() - 8;
        raw[batch_end - 1] ^= 0xff;

        let mut reader = Reader::new(Bytes::from(raw), false);
        let err = Request::decode(&mut reader, 3).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
