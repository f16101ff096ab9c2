//! Codec error types and broker error codes.

use std::fmt;
use thiserror::Error;

/// Errors raised while encoding, framing or decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown message kind: api key {0}")]
    UnknownMessageKind(i16),

    #[error("message type {0} is not registered")]
    UnregisteredType(&'static str),

    #[error("unsupported {api} version: v{version} not in range v{min}-v{max}")]
    UnsupportedVersion {
        api: &'static str,
        version: i16,
        min: i16,
        max: i16,
    },

    #[error("encode error: {0}")]
    Encode(String),

    #[error("short frame: declared {declared} bytes, only {available} available")]
    ShortFrame { declared: usize, available: usize },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn encode(reason: impl Into<String>) -> Self {
        ProtocolError::Encode(reason.into())
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        ProtocolError::Decode(reason.into())
    }

    /// Returns whether the error was caused by malformed or truncated input.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            ProtocolError::Decode(_)
                | ProtocolError::ShortFrame { .. }
                | ProtocolError::FrameTooLarge { .. }
        )
    }
}

/// Error codes carried in broker responses.
///
/// Codes the codec has no name for are kept as `Unrecognized` so that a
/// decoded response can be re-encoded unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnknownServerError,
    None,
    OffsetOutOfRange,
    CorruptMessage,
    UnknownTopicOrPartition,
    NotLeaderOrFollower,
    RequestTimedOut,
    MessageTooLarge,
    InvalidTopic,
    RecordListTooLarge,
    NotEnoughReplicas,
    InvalidRequiredAcks,
    TopicAuthorizationFailed,
    ClusterAuthorizationFailed,
    InvalidTimestamp,
    UnsupportedVersion,
    TopicAlreadyExists,
    InvalidPartitions,
    InvalidReplicationFactor,
    InvalidReplicaAssignment,
    NotController,
    InvalidRequest,
    PolicyViolation,
    TransactionalIdAuthorizationFailed,
    ThrottlingQuotaExceeded,
    Unrecognized(i16),
}

impl ErrorCode {
    /// Maps a wire error code.
    pub fn from_code(code: i16) -> Self {
        match code {
            -1 => ErrorCode::UnknownServerError,
            0 => ErrorCode::None,
            1 => ErrorCode::OffsetOutOfRange,
            2 => ErrorCode::CorruptMessage,
            3 => ErrorCode::UnknownTopicOrPartition,
            6 => ErrorCode::NotLeaderOrFollower,
            7 => ErrorCode::RequestTimedOut,
            10 => ErrorCode::MessageTooLarge,
            17 => ErrorCode::InvalidTopic,
            18 => ErrorCode::RecordListTooLarge,
            19 => ErrorCode::NotEnoughReplicas,
            21 => ErrorCode::InvalidRequiredAcks,
            29 => ErrorCode::TopicAuthorizationFailed,
            31 => ErrorCode::ClusterAuthorizationFailed,
            32 => ErrorCode::InvalidTimestamp,
            35 => ErrorCode::UnsupportedVersion,
            36 => ErrorCode::TopicAlreadyExists,
            37 => ErrorCode::InvalidPartitions,
            38 => ErrorCode::InvalidReplicationFactor,
            39 => ErrorCode::InvalidReplicaAssignment,
            41 => ErrorCode::NotController,
            42 => ErrorCode::InvalidRequest,
            44 => ErrorCode::PolicyViolation,
            53 => ErrorCode::TransactionalIdAuthorizationFailed,
            89 => ErrorCode::ThrottlingQuotaExceeded,
            other => ErrorCode::Unrecognized(other),
        }
    }

    /// Returns the wire representation.
    pub fn code(&self) -> i16 {
        match self {
            ErrorCode::UnknownServerError => -1,
            ErrorCode::None => 0,
            ErrorCode::OffsetOutOfRange => 1,
            ErrorCode::CorruptMessage => 2,
            ErrorCode::UnknownTopicOrPartition => 3,
            ErrorCode::NotLeaderOrFollower => 6,
            ErrorCode::RequestTimedOut => 7,
            ErrorCode::MessageTooLarge => 10,
            ErrorCode::InvalidTopic => 17,
            ErrorCode::RecordListTooLarge => 18,
            ErrorCode::NotEnoughReplicas => 19,
            ErrorCode::InvalidRequiredAcks => 21,
            ErrorCode::TopicAuthorizationFailed => 29,
            ErrorCode::ClusterAuthorizationFailed => 31,
            ErrorCode::InvalidTimestamp => 32,
            ErrorCode::UnsupportedVersion => 35,
            ErrorCode::TopicAlreadyExists => 36,
            ErrorCode::InvalidPartitions => 37,
            ErrorCode::InvalidReplicationFactor => 38,
            ErrorCode::InvalidReplicaAssignment => 39,
            ErrorCode::NotController => 41,
            ErrorCode::InvalidRequest => 42,
            ErrorCode::PolicyViolation => 44,
            ErrorCode::TransactionalIdAuthorizationFailed => 53,
            ErrorCode::ThrottlingQuotaExceeded => 89,
            ErrorCode::Unrecognized(code) => *code,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ErrorCode::None)
    }

    /// Returns whether a broker reporting this error may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::CorruptMessage
                | ErrorCode::UnknownTopicOrPartition
                | ErrorCode::NotLeaderOrFollower
                | ErrorCode::RequestTimedOut
                | ErrorCode::NotEnoughReplicas
                | ErrorCode::NotController
                | ErrorCode::ThrottlingQuotaExceeded
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::UnknownServerError => write!(f, "UNKNOWN_SERVER_ERROR"),
            ErrorCode::None => write!(f, "NONE"),
            ErrorCode::OffsetOutOfRange => write!(f, "OFFSET_OUT_OF_RANGE"),
            ErrorCode::CorruptMessage => write!(f, "CORRUPT_MESSAGE"),
            ErrorCode::UnknownTopicOrPartition => write!(f, "UNKNOWN_TOPIC_OR_PARTITION"),
            ErrorCode::NotLeaderOrFollower => write!(f, "NOT_LEADER_OR_FOLLOWER"),
            ErrorCode::RequestTimedOut => write!(f, "REQUEST_TIMED_OUT"),
            ErrorCode::MessageTooLarge => write!(f, "MESSAGE_TOO_LARGE"),
            ErrorCode::InvalidTopic => write!(f, "INVALID_TOPIC_EXCEPTION"),
            ErrorCode::RecordListTooLarge => write!(f, "RECORD_LIST_TOO_LARGE"),
            ErrorCode::NotEnoughReplicas => write!(f, "NOT_ENOUGH_REPLICAS"),
            ErrorCode::InvalidRequiredAcks => write!(f, "INVALID_REQUIRED_ACKS"),
            ErrorCode::TopicAuthorizationFailed => write!(f, "TOPIC_AUTHORIZATION_FAILED"),
            ErrorCode::ClusterAuthorizationFailed => write!(f, "CLUSTER_AUTHORIZATION_FAILED"),
            ErrorCode::InvalidTimestamp => write!(f, "INVALID_TIMESTAMP"),
            ErrorCode::UnsupportedVersion => write!(f, "UNSUPPORTED_VERSION"),
            ErrorCode::TopicAlreadyExists => write!(f, "TOPIC_ALREADY_EXISTS"),
            ErrorCode::InvalidPartitions => write!(f, "INVALID_PARTITIONS"),
            ErrorCode::InvalidReplicationFactor => write!(f, "INVALID_REPLICATION_FACTOR"),
            ErrorCode::InvalidReplicaAssignment => write!(f, "INVALID_REPLICA_ASSIGNMENT"),
            ErrorCode::NotController => write!(f, "NOT_CONTROLLER"),
            ErrorCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
            ErrorCode::PolicyViolation => write!(f, "POLICY_VIOLATION"),
            ErrorCode::TransactionalIdAuthorizationFailed => {
                write!(f, "TRANSACTIONAL_ID_AUTHORIZATION_FAILED")
            }
            ErrorCode::ThrottlingQuotaExceeded => write!(f, "THROTTLING_QUOTA_EXCEEDED"),
            ErrorCode::Unrecognized(code) => write!(f, "UNRECOGNIZED({})", code),
        }
    }
}

/// A non-zero error code reported by the broker, with its optional message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl ApiError {
    /// Builds an error from a raw code, or `None` when the code means success.
    pub fn from_parts(code: i16, message: Option<String>) -> Option<Self> {
        let code = ErrorCode::from_code(code);
        if code.is_none() {
            return None;
        }
        Some(Self { code, message })
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for ApiError {}
