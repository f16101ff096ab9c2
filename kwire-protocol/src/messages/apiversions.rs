//! ApiVersions (key 18): version discovery.
//!
//! The response header stays non-flexible in every version so a client can
//! parse the reply before it knows which versions the broker speaks.

use super::ensure_default;
use crate::api::ApiKey;
use crate::error::ProtocolError;
use crate::message::impl_message;
use crate::registry::Registry;
use crate::tagged::TaggedFields;
use crate::wire::{Decode, Encode, Reader, Writer};

pub const MIN_VERSION: i16 = 0;
pub const MAX_VERSION: i16 = 3;
pub const FLEXIBLE_SINCE: i16 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// v3+
    pub client_software_name: String,
    /// v3+
    pub client_software_version: String,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub error_code: i16,
    pub api_keys: Vec<ApiVersionRange>,
    /// v1+
    pub throttle_time_ms: i32,
    pub tagged_fields: TaggedFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiVersionRange {
    pub api_key: i16,
    pub min_version: i16,
    pub max_version: i16,
    pub tagged_fields: TaggedFields,
}

impl_message!(Request, ApiKey::ApiVersions);
impl_message!(Response, ApiKey::ApiVersions);

impl Response {
    /// Advertises every kind known to `registry`.
    pub fn from_registry(registry: &Registry) -> Self {
        Self {
            api_keys: registry
                .apis()
                .map(|api| ApiVersionRange {
                    api_key: api.key().code(),
                    min_version: api.min_version(),
                    max_version: api.max_version(),
                    tagged_fields: TaggedFields::default(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn find(&self, key: ApiKey) -> Option<&ApiVersionRange> {
        self.api_keys.iter().find(|r| r.api_key == key.code())
    }
}

impl Encode for Request {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        if version >= 3 {
            w.put_string(&self.client_software_name)?;
            w.put_string(&self.client_software_version)?;
        } else {
            ensure_default(self.client_software_name.is_empty(), "client_software_name", version)?;
            ensure_default(self.client_software_version.is_empty(), "client_software_version", version)?;
        }
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for Request {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        let mut req = Self::default();
        if version >= 3 {
            req.client_software_name = r.get_string()?;
            req.client_software_version = r.get_string()?;
        }
        req.tagged_fields = r.get_tagged_fields()?;
        Ok(req)
    }
}

impl Encode for Response {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError> {
        w.put_i16(self.error_code);
        w.put_structs(&self.api_keys, version)?;
        if version >= 1 {
            w.put_i32(self.throttle_time_ms);
        } else {
            ensure_default(self.throttle_time_ms == 0, "throttle_time_ms", version)?;
        }
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for Response {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError> {
        let error_code = r.get_i16()?;
        let api_keys = r.get_structs(version)?;
        let throttle_time_ms = if version >= 1 { r.get_i32()? } else { 0 };
        Ok(Self {
            error_code,
            api_keys,
            throttle_time_ms,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

impl Encode for ApiVersionRange {
    fn encode(&self, w: &mut Writer<'_>, _version: i16) -> Result<(), ProtocolError> {
        w.put_i16(self.api_key);
        w.put_i16(self.min_version);
        w.put_i16(self.max_version);
        w.put_tagged_fields(&self.tagged_fields)
    }
}

impl Decode for ApiVersionRange {
    fn decode(r: &mut Reader, _version: i16) -> Result<Self, ProtocolError> {
        Ok(Self {
            api_key: r.get_i16()?,
            min_version: r.get_i16()?,
            max_version: r.get_i16()?,
            tagged_fields: r.get_tagged_fields()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::testing::{encode, roundtrip};
    use crate::registry::registry;
    use bytes::BytesMut;

    #[test]
    fn test_v0_request_is_empty() {
        assert!(encode(&Request::default(), 0, false).is_empty());

        let req = Request {
            client_software_name: "kwire".to_string(),
            client_software_version: "0.1.0".to_string(),
            ..Default::default()
        };
        let (_, decoded) = roundtrip(&req, 3, true);
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_software_name_rejected_before_v3() {
        let req = Request {
            client_software_name: "kwire".to_string(),
            ..Default::default()
        };
        for version in 0..3 {
            let mut buf = BytesMut::new();
            let err = req.encode(&mut Writer::new(&mut buf, false), version).unwrap_err();
            assert!(matches!(err, ProtocolError::Encode(ref reason) if reason.contains("client_software_name")));
        }
    }

    #[test]
    fn test_throttle_rejected_at_v0() {
        let resp = Response {
            throttle_time_ms: 10,
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        let err = resp.encode(&mut Writer::new(&mut buf, false), 0).unwrap_err();
        assert!(matches!(err, ProtocolError::Encode(_)));
        assert_eq!(roundtrip(&resp, 1, false).1, resp);
    }

    #[test]
    fn test_response_from_registry() {
        let resp = Response::from_registry(registry());
        assert_eq!(resp.api_keys.len(), ApiKey::ALL.len());

        let produce = resp.find(ApiKey::Produce).unwrap();
        assert_eq!((produce.min_version, produce.max_version), (3, 9));
        assert!(resp.find(ApiKey::DeleteTopics).is_some());

        for version in MIN_VERSION..=MAX_VERSION {
            let (_, decoded) = roundtrip(&resp, version, version >= FLEXIBLE_SINCE);
            assert_eq!(decoded, resp);
        }
    }
}
