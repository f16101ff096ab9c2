//! Caller-facing shape of the CreatePartitions exchange.
//!
//! These types hide wire details such as nullable arrays and millisecond
//! integers. Conversion to and from the wire messages is lossless for
//! everything the broker acts on; durations that do not fit the int32
//! millisecond fields fail to convert.

use crate::error::{ApiError, ProtocolError};
use crate::messages::createpartitions;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePartitionsRequest {
    pub topics: Vec<TopicPartitionsConfig>,
    /// Only check that the request would succeed.
    pub validate_only: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPartitionsConfig {
    pub name: String,
    /// Total partition count after the request.
    pub count: i32,
    /// Replica placement for each new partition. Empty lets the broker choose.
    pub assignments: Vec<TopicPartitionAssignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPartitionAssignment {
    pub broker_ids: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePartitionsResponse {
    pub throttle: Duration,
    /// Per-topic outcome; `None` means the topic was updated.
    pub errors: HashMap<String, Option<ApiError>>,
}

impl CreatePartitionsResponse {
    /// Error reported for `topic`, if any.
    pub fn error(&self, topic: &str) -> Option<&ApiError> {
        self.errors.get(topic).and_then(Option::as_ref)
    }

    pub fn is_success(&self) -> bool {
        self.errors.values().all(Option::is_none)
    }
}

fn duration_ms(d: Duration, field: &str) -> Result<i32, ProtocolError> {
    i32::try_from(d.as_millis())
        .map_err(|_| ProtocolError::encode(format!("{} of {:?} does not fit in int32 milliseconds", field, d)))
}

fn ms_duration(ms: i32) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

impl TryFrom<&CreatePartitionsRequest> for createpartitions::Request {
    type Error = ProtocolError;

    fn try_from(req: &CreatePartitionsRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            topics: req
                .topics
                .iter()
                .map(|t| createpartitions::RequestTopic {
                    name: t.name.clone(),
                    count: t.count,
                    assignments: (!t.assignments.is_empty()).then(|| {
                        t.assignments
                            .iter()
                            .map(|a| createpartitions::RequestAssignment {
                                broker_ids: a.broker_ids.clone(),
                                ..Default::default()
                            })
                            .collect()
                    }),
                    ..Default::default()
                })
                .collect(),
            timeout_ms: duration_ms(req.timeout, "timeout")?,
            validate_only: req.validate_only,
            ..Default::default()
        })
    }
}

impl From<&createpartitions::Request> for CreatePartitionsRequest {
    fn from(req: &createpartitions::Request) -> Self {
        Self {
            topics: req
                .topics
                .iter()
                .map(|t| TopicPartitionsConfig {
                    name: t.name.clone(),
                    count: t.count,
                    assignments: t
                        .assignments
                        .iter()
                        .flatten()
                        .map(|a| TopicPartitionAssignment {
                            broker_ids: a.broker_ids.clone(),
                        })
                        .collect(),
                })
                .collect(),
            validate_only: req.validate_only,
            timeout: ms_duration(req.timeout_ms),
        }
    }
}

impl From<createpartitions::Response> for CreatePartitionsResponse {
    fn from(resp: createpartitions::Response) -> Self {
        Self {
            throttle: ms_duration(resp.throttle_time_ms),
            errors: resp
                .results
                .into_iter()
                .map(|r| (r.name, ApiError::from_parts(r.error_code, r.error_message)))
                .collect(),
        }
    }
}

impl TryFrom<&CreatePartitionsResponse> for createpartitions::Response {
    type Error = ProtocolError;

    fn try_from(resp: &CreatePartitionsResponse) -> Result<Self, Self::Error> {
        let mut results: Vec<_> = resp
            .errors
            .iter()
            .map(|(name, error)| createpartitions::ResponseResult {
                name: name.clone(),
                error_code: error.as_ref().map_or(0, |e| e.code.code()),
                error_message: error.as_ref().and_then(|e| e.message.clone()),
                ..Default::default()
            })
            .collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self {
            throttle_time_ms: duration_ms(resp.throttle, "throttle")?,
            results,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn request(assignments: Vec<TopicPartitionAssignment>) -> CreatePartitionsRequest {
        CreatePartitionsRequest {
            topics: vec![TopicPartitionsConfig {
                name: "t".to_string(),
                count: 2,
                assignments,
            }],
            validate_only: false,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_empty_assignments_become_null() {
        let wire = createpartitions::Request::try_from(&request(Vec::new())).unwrap();
        assert_eq!(wire.topics[0].assignments, None);
        assert_eq!(wire.timeout_ms, 5000);
    }

    #[test]
    fn test_assignments_carried_over() {
        let req = request(vec![TopicPartitionAssignment { broker_ids: vec![1] }]);
        let wire = createpartitions::Request::try_from(&req).unwrap();
        let assignments = wire.topics[0].assignments.as_ref().unwrap();
        assert_eq!(assignments[0].broker_ids, vec![1]);

        assert_eq!(CreatePartitionsRequest::from(&wire), req);
    }

    #[test]
    fn test_response_errors_map() {
        let wire = createpartitions::Response {
            throttle_time_ms: 250,
            results: vec![
                createpartitions::ResponseResult {
                    name: "t".to_string(),
                    ..Default::default()
                },
                createpartitions::ResponseResult {
                    name: "u".to_string(),
                    error_code: 37,
                    error_message: Some("Number of partitions must be larger".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let resp = CreatePartitionsResponse::from(wire.clone());
        assert_eq!(resp.throttle, Duration::from_millis(250));
        assert!(resp.error("t").is_none());
        assert_eq!(resp.errors.get("t"), Some(&None));
        assert_eq!(resp.error("u").unwrap().code, ErrorCode::InvalidPartitions);
        assert!(!resp.is_success());

        assert_eq!(createpartitions::Response::try_from(&resp).unwrap(), wire);
    }

    #[test]
    fn test_timeout_out_of_range_rejected() {
        let mut req = request(Vec::new());
        req.timeout = Duration::from_secs(30 * 24 * 60 * 60);
        let err = createpartitions::Request::try_from(&req).unwrap_err();
        assert!(matches!(err, ProtocolError::Encode(ref reason) if reason.contains("timeout")));

        req.timeout = Duration::from_millis(i32::MAX as u64);
        assert_eq!(createpartitions::Request::try_from(&req).unwrap().timeout_ms, i32::MAX);
    }

    #[test]
    fn test_throttle_out_of_range_rejected() {
        let resp = CreatePartitionsResponse {
            throttle: Duration::from_secs(u64::MAX / 1000),
            errors: HashMap::new(),
        };
        let err = createpartitions::Response::try_from(&resp).unwrap_err();
        assert!(matches!(err, ProtocolError::Encode(_)));
    }
}
