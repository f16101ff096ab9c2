//! Harness error types.

use kwire_protocol::ProtocolError;
use thiserror::Error;

/// Ways a verification pass can fail.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{field} mismatch: expected {expected}, found {found}")]
    HeaderMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("decoded a {found}, expected a {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("message mismatch at v{version}:\nexpected: {expected}\nfound:    {found}")]
    MessageMismatch {
        version: i16,
        expected: String,
        found: String,
    },

    #[error("encoding of {type_name} drifted at v{version}:\nexpected:\n{expected}\nfound:\n{found}")]
    OverrideDrift {
        type_name: &'static str,
        version: i16,
        /// Hex dump of the first encoding.
        expected: String,
        /// Hex dump of the re-encoding.
        found: String,
    },
}

impl HarnessError {
    /// Returns whether the failure came from the codec rather than from a
    /// comparison made by the harness.
    pub fn is_protocol(&self) -> bool {
        matches!(self, HarnessError::Protocol(_))
    }
}
