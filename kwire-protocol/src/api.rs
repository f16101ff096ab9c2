//! API keys identifying message kinds.

use crate::error::ProtocolError;
use std::fmt;

/// Numeric identity of a request/response kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i16)]
pub enum ApiKey {
    Produce = 0,
    ApiVersions = 18,
    DeleteTopics = 20,
    CreatePartitions = 37,
}

impl ApiKey {
    /// Every key known to this crate, in ascending order.
    pub const ALL: [ApiKey; 4] = [
        ApiKey::Produce,
        ApiKey::ApiVersions,
        ApiKey::DeleteTopics,
        ApiKey::CreatePartitions,
    ];

    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn name(self) -> &'static str {
        match self {
            ApiKey::Produce => "Produce",
            ApiKey::ApiVersions => "ApiVersions",
            ApiKey::DeleteTopics => "DeleteTopics",
            ApiKey::CreatePartitions => "CreatePartitions",
        }
    }
}

impl TryFrom<i16> for ApiKey {
    type Error = ProtocolError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ApiKey::Produce),
            18 => Ok(ApiKey::ApiVersions),
            20 => Ok(ApiKey::DeleteTopics),
            37 => Ok(ApiKey::CreatePartitions),
            other => Err(ProtocolError::UnknownMessageKind(other)),
        }
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
