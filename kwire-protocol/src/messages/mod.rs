//! Request and response bodies, one module per kind.
//!
//! Each module exposes `Request` and `Response` with their sub-structures,
//! the supported version range and the first flexible version. Fields that
//! only exist from some version on are read and written behind a version
//! check. Reading an older version leaves them at their default, and
//! writing one fails if they hold anything else.

use crate::error::ProtocolError;

pub mod apiversions;
pub mod createpartitions;
pub mod deletetopics;
pub mod produce;
pub mod rawproduce;

/// Fails unless a field absent from `version` still holds its default.
pub(crate) fn ensure_default(is_default: bool, field: &str, version: i16) -> Result<(), ProtocolError> {
    if is_default {
        Ok(())
    } else {
        Err(ProtocolError::encode(format!("non-default {} at version {}", field, version)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::tagged::TaggedFields;
    use crate::wire::{Decode, Encode, Reader, Writer};
    use bytes::{Bytes, BytesMut};

    pub fn encode<T: Encode>(msg: &T, version: i16, flexible: bool) -> Bytes {
        let mut buf = BytesMut::new();
        msg.encode(&mut Writer::new(&mut buf, flexible), version)
            .unwrap();
        buf.freeze()
    }

    /// Encodes, decodes and checks that the whole body was consumed.
    pub fn roundtrip<T: Encode + Decode>(msg: &T, version: i16, flexible: bool) -> (Bytes, T) {
        let bytes = encode(msg, version, flexible);
        let mut reader = Reader::new(bytes.clone(), flexible);
        let decoded = T::decode(&mut reader, version).unwrap();
        assert_eq!(reader.remaining(), 0, "body not fully consumed at v{}", version);
        (bytes, decoded)
    }

    pub fn tags() -> TaggedFields {
        TaggedFields::new().with(3, Bytes::from_static(b"future"))
    }
}
