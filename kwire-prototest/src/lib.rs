//! # kwire-prototest
//!
//! Verification harness for kwire-protocol message kinds.
//!
//! - Round trips: write a message, read it back, compare headers and body
//! - Override equivalence: an override type must re-encode byte for byte
//! - Stream lifecycle: capture, reset and close one-shot stream fields
//! - Throughput passes for benchmarks
//! - Hex dumps for diagnostics

pub mod dump;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod roundtrip;
pub mod throughput;

pub use dump::hex_dump;
pub use error::HarnessError;
pub use lifecycle::{close_message, load, StreamSnapshot};
pub use logging::init_test_logging;
pub use roundtrip::{
    test_request, test_request_versions, test_request_with_override, test_response, test_response_versions,
    test_response_with_override, CLIENT_ID, CORRELATION_ID,
};
pub use throughput::{Throughput, ThroughputReport};
