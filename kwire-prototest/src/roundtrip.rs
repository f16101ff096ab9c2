//! Write, read and compare cycles for requests and responses.
//!
//! Every check encodes with correlation id [`CORRELATION_ID`] and client id
//! [`CLIENT_ID`], resets stream fields right after writing, and compares the
//! decoded header and body against what was written.

use crate::dump::hex_dump;
use crate::error::HarnessError;
use crate::lifecycle::load;
use kwire_protocol::{read_request, read_response, registry, write_request, write_response, Message};
use std::fmt::{Debug, Display};
use tracing::debug;

pub const CORRELATION_ID: i32 = 1234;
pub const CLIENT_ID: &str = "me";

fn check_header<T: PartialEq + Debug>(field: &'static str, expected: T, found: T) -> Result<(), HarnessError> {
    if expected == found {
        return Ok(());
    }
    Err(HarnessError::HeaderMismatch {
        field,
        expected: format!("{:?}", expected),
        found: format!("{:?}", found),
    })
}

fn check_message<T: Message + PartialEq>(version: i16, expected: &T, found: &dyn Message) -> Result<(), HarnessError> {
    let decoded = found.downcast_ref::<T>().ok_or(HarnessError::TypeMismatch {
        expected: std::any::type_name::<T>(),
        found: found.type_name(),
    })?;
    if decoded != expected {
        return Err(HarnessError::MessageMismatch {
            version,
            expected: format!("{:?}", expected),
            found: format!("{:?}", decoded),
        });
    }
    Ok(())
}

fn log_frame(what: impl Display, version: i16, frame: &[u8]) {
    debug!("{} v{} ({} bytes)\n{}", what, version, frame.len(), hex_dump(frame));
}

/// Writes `msg` as a request at `version`, reads it back and checks that
/// header and body survived.
pub fn test_request<T: Message + PartialEq>(version: i16, msg: &T) -> Result<(), HarnessError> {
    let snapshot = load(msg)?;
    let mut buf = Vec::new();
    write_request(&mut buf, version, CORRELATION_ID, Some(CLIENT_ID), msg)?;
    snapshot.reset(msg)?;
    log_frame(msg.api_key(), version, &buf);

    let frame = read_request(&mut buf.as_slice())?;
    check_header("api key", msg.api_key(), frame.api_key())?;
    check_header("api version", version, frame.api_version())?;
    check_header("correlation id", CORRELATION_ID, frame.correlation_id())?;
    check_header("client id", Some(CLIENT_ID), frame.client_id())?;
    check_message(version, msg, frame.message())
}

/// Writes `msg` as a response at `version`, reads it back and checks that
/// the correlation id and body survived.
pub fn test_response<T: Message + PartialEq>(version: i16, msg: &T) -> Result<(), HarnessError> {
    let snapshot = load(msg)?;
    let mut buf = Vec::new();
    write_response(&mut buf, version, CORRELATION_ID, msg)?;
    snapshot.reset(msg)?;
    log_frame(msg.api_key(), version, &buf);

    let frame = read_response(&mut buf.as_slice(), msg.api_key(), version)?;
    check_header("correlation id", CORRELATION_ID, frame.correlation_id())?;
    check_message(version, msg, frame.message())
}

/// Writes `msg`, reads it back as its base type and writes that again; the
/// two encodings must be identical.
pub fn test_request_with_override(version: i16, msg: &dyn Message) -> Result<(), HarnessError> {
    let snapshot = load(msg)?;
    let mut first = Vec::new();
    write_request(&mut first, version, CORRELATION_ID, Some(CLIENT_ID), msg)?;
    snapshot.reset(msg)?;
    log_frame(msg.type_name(), version, &first);

    let frame = read_request(&mut first.as_slice())?;
    let mut second = Vec::new();
    write_request(&mut second, version, CORRELATION_ID, Some(CLIENT_ID), frame.message())?;
    check_same_bytes(msg, version, &first, &second)
}

/// Response counterpart of [`test_request_with_override`].
pub fn test_response_with_override(version: i16, msg: &dyn Message) -> Result<(), HarnessError> {
    let snapshot = load(msg)?;
    let mut first = Vec::new();
    write_response(&mut first, version, CORRELATION_ID, msg)?;
    snapshot.reset(msg)?;
    log_frame(msg.type_name(), version, &first);

    let frame = read_response(&mut first.as_slice(), msg.api_key(), version)?;
    let mut second = Vec::new();
    write_response(&mut second, version, CORRELATION_ID, frame.message())?;
    check_same_bytes(msg, version, &first, &second)
}

fn check_same_bytes(msg: &dyn Message, version: i16, first: &[u8], second: &[u8]) -> Result<(), HarnessError> {
    if first == second {
        return Ok(());
    }
    Err(HarnessError::OverrideDrift {
        type_name: msg.type_name(),
        version,
        expected: hex_dump(first),
        found: hex_dump(second),
    })
}

/// Runs [`test_request`] for every version `msg` is registered for.
pub fn test_request_versions<T: Message + PartialEq>(msg: &T) -> Result<(), HarnessError> {
    let (_, versions) = registry().describe(msg)?;
    for version in versions {
        test_request(version, msg)?;
    }
    Ok(())
}

/// Runs [`test_response`] for every version `msg` is registered for.
pub fn test_response_versions<T: Message + PartialEq>(msg: &T) -> Result<(), HarnessError> {
    let (_, versions) = registry().describe(msg)?;
    for version in versions {
        test_response(version, msg)?;
    }
    Ok(())
}
