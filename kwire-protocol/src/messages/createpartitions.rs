//! CreatePartitions (key 37): grows the partition count of existing topics.
//!
//! v0-v1 use legacy encodings, v2-v3 are flexible. The per-topic assignment
//! list is a nullable array; null means the broker picks the replicas.

use crate::api::ApiKey;
use crate::error::ProtocolError;
use crate::message::impl_message;
use crate::tagged::TaggedFields;
use crate::wire::{Decode, Encode, Reader, Writer};

pub const MIN_VERSION: i16 = 0;
pub const MAX_VERSION: i16 = 3;
pub const FLEXIBLE_SINCE: i16 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub topics: Vec<RequestTopic>,
    pub timeout_ms: i32,
    pub validate_only: bool,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTopic {
    pub name: String,
    /// New total partition count.
    pub count: i32,
    /// Broker ids for each new partition, or null.
    pub assignments: Option<Vec<RequestAssignment>>,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAssignment {
    pub broker_ids: Vec<i32>,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub throttle_time_ms: i32,
    pub results: Vec<ResponseResult>,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseResult {
    pub name: String,
    pub error_code: i16,
    pub error_message: Option<String>,
    pub tagged_fields: TaggedFields,
}

impl_message!(Request, ApiKey::CreatePartitions);
impl_message!(Response, ApiKey::CreatePartitions);

impl Encode for Request {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_structs(&self.topics, version)?;
        w.put_i32(self.timeout_ms);
        w.put_bool(self.validate_only);
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for Request {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            topics: r.get_structs(version)?,
            timeout_ms: r.get_i32()?,
            validate_only: r.get_bool()?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for RequestTopic {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_string(&self.name)?;
        w.put_i32(self.count);
        w.put_nullable_array(self.assignments.as_deref(), |w, a| a.encode(w, version))?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for RequestTopic {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: r.get_string()?,
            count: r.get_i32()?,
            assignments: r.get_nullable_array(|r| RequestAssignment::decode(r, version))?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for RequestAssignment {
    fn encode(&self, w: &mut Writer<'_>, _version: i16) -> Result<(), ProtocolError> {
        w.put_i32_array(&self.broker_ids)?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for RequestAssignment {
    fn decode(r: &mut Reader, _version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            broker_ids: r.get_i32_array()?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for Response {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_i32(self.throttle_time_ms);
        w.put_structs(&self.results, version)?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for Response {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            throttle_time_ms: r.get_i32()?,
            results: r.get_structs(version)?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for ResponseResult {
    fn encode(&self, w: &mut Writer<'_>, _version: i16) -> Result<(), ProtocolError> {
        w.put_string(&self.name)?;
        w.put_i16(self.error_code);
        w.put_nullable_string(self.error_message.as_deref())?;
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for ResponseResult {
    fn decode(r: &mut Reader, _version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: r.get_string()?,
            error_code: r.get_i16()?,
            error_message: r.get_nullable_string()?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::testing::{roundtrip, tags};

    fn request(assignments: Option<Vec<RequestAssignment>>) -> Request {
        Request {
            topics: vec![RequestTopic {
                name: "t".to_string(),
                count: 2,
                assignments,
                ..Default::default()
            }],
            timeout_ms: 30_000,
            validate_only: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_v0_layout() {
        let req = request(Some(vec![RequestAssignment {
            broker_ids: vec![1],
            ..Default::default()
        }]));
        let (bytes, decoded) = roundtrip(&req, 0, false);
        assert_eq!(decoded, req);
        assert_eq!(
            &bytes[..],
            &[
                0, 0, 0, 1, // topics
                0, 1, b't', // name
                0, 0, 0, 2, // count
                0, 0, 0, 1, // assignments
                0, 0, 0, 1, // broker ids
                0, 0, 0, 1, // broker 1
                0, 0, 0x75, 0x30, // timeout
                0, // validate only
            ]
        );
    }

    #[test]
    fn test_v2_layout_is_compact() {
        let req = request(None);
        let (bytes, decoded) = roundtrip(&req, 2, true);
        assert_eq!(decoded, req);
        assert_eq!(
            &bytes[..],
            &[
                0x02, // topics
                0x02, b't', // name
                0, 0, 0, 2,    // count
                0x00, // null assignments
                0x00, // topic tags
                0, 0, 0x75, 0x30, // timeout
                0,    // validate only
                0x00, // tags
            ]
        );
    }

    #[test]
    fn test_null_and_empty_assignments_differ() {
        for version in MIN_VERSION..=MAX_VERSION {
            let flexible = version >= FLEXIBLE_SINCE;
            let (null_bytes, null_decoded) = roundtrip(&request(None), version, flexible);
            let (empty_bytes, empty_decoded) = roundtrip(&request(Some(Vec::new())), version, flexible);

            assert_eq!(null_decoded.topics[0].assignments, None);
            assert_eq!(empty_decoded.topics[0].assignments, Some(Vec::new()));
            assert_ne!(null_bytes, empty_bytes);
        }
    }

    #[test]
    fn test_response_roundtrip_all_versions() {
        for version in MIN_VERSION..=MAX_VERSION {
            let flexible = version >= FLEXIBLE_SINCE;
            let resp = Response {
                throttle_time_ms: 10,
                results: vec![
                    ResponseResult {
                        name: "t".to_string(),
                        ..Default::default()
                    },
                    ResponseResult {
                        name: "u".to_string(),
                        error_code: 37,
                        error_message: Some("Topic already has 3 partitions.".to_string()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            };
            let (_, decoded) = roundtrip(&resp, version, flexible);
            assert_eq!(decoded, resp);
        }
    }

    #[test]
    fn test_unknown_tags_survive_flexible_roundtrip() {
        let mut req = request(Some(vec![RequestAssignment {
            broker_ids: vec![1, 2],
            tagged_fields: tags(),
        }]));
        req.tagged_fields = tags();
        req.topics[0].tagged_fields = tags();

        let (_, decoded) = roundtrip(&req, 3, true);
        assert_eq!(decoded, req);
    }
}
