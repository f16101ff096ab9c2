//! Primitive field encoding shared by every message kind.
//!
//! A [`Writer`] or [`Reader`] is created for one (kind, version) pair and
//! carries whether that version is flexible. Flexible versions use compact
//! (unsigned varint, length + 1) lengths for strings, bytes and arrays and
//! allow a tagged-field trailer; legacy versions use fixed-width lengths.
//!
//! ```text
//! legacy string      := len:int16 (-1 = null) ++ bytes
//! compact string     := uvarint(len + 1) (0 = null) ++ bytes
//! legacy bytes       := len:int32 (-1 = null) ++ bytes
//! legacy array       := count:int32 (-1 = null) ++ items
//! compact array      := uvarint(count + 1) (0 = null) ++ items
//! ```

use crate::config::UnknownTagPolicy;
use crate::error::ProtocolError;
use crate::tagged::TaggedFields;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A value with a version-dependent wire layout.
pub trait Encode {
    fn encode(&self, w: &mut Writer<'_>, version: i16) -> Result<(), ProtocolError>;
}

/// The decoding half of [`Encode`].
pub trait Decode: Sized {
    fn decode(r: &mut Reader, version: i16) -> Result<Self, ProtocolError>;
}

/// Variable-length integer helpers (unsigned LEB128 and zig-zag).
pub mod varint {
    use super::*;

    pub fn put_uvarint(buf: &mut impl BufMut, mut value: u32) {
        while value >= 0x80 {
            buf.put_u8((value as u8) | 0x80);
            value >>= 7;
        }
        buf.put_u8(value as u8);
    }

    pub fn put_uvarlong(buf: &mut impl BufMut, mut value: u64) {
        while value >= 0x80 {
            buf.put_u8((value as u8) | 0x80);
            value >>= 7;
        }
        buf.put_u8(value as u8);
    }

    pub fn put_varint(buf: &mut impl BufMut, value: i32) {
        put_uvarint(buf, ((value << 1) ^ (value >> 31)) as u32);
    }

    pub fn put_varlong(buf: &mut impl BufMut, value: i64) {
        put_uvarlong(buf, ((value << 1) ^ (value >> 63)) as u64);
    }

    /// Number of bytes [`put_uvarint`] emits for `value`.
    pub fn uvarint_len(mut value: u32) -> usize {
        let mut len = 1;
        while value >= 0x80 {
            value >>= 7;
            len += 1;
        }
        len
    }

    /// Number of bytes [`put_varint`] emits for `value`.
    pub fn varint_len(value: i32) -> usize {
        uvarint_len(((value << 1) ^ (value >> 31)) as u32)
    }

    /// Number of bytes [`put_varlong`] emits for `value`.
    pub fn varlong_len(value: i64) -> usize {
        let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;
        let mut len = 1;
        while zigzag >= 0x80 {
            zigzag >>= 7;
            len += 1;
        }
        len
    }

    fn get_raw(buf: &mut impl Buf, max_bytes: usize) -> Result<u64, ProtocolError> {
        let mut value: u64 = 0;
        for i in 0..max_bytes {
            if !buf.has_remaining() {
                return Err(ProtocolError::decode("truncated varint"));
            }
            let byte = buf.get_u8();
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::decode(format!(
            "varint longer than {} bytes",
            max_bytes
        )))
    }

    pub fn get_uvarint(buf: &mut impl Buf) -> Result<u32, ProtocolError> {
        let value = get_raw(buf, 5)?;
        u32::try_from(value).map_err(|_| ProtocolError::decode("varint overflows 32 bits"))
    }

    pub fn get_uvarlong(buf: &mut impl Buf) -> Result<u64, ProtocolError> {
        get_raw(buf, 10)
    }

    pub fn get_varint(buf: &mut impl Buf) -> Result<i32, ProtocolError> {
        let raw = get_uvarint(buf)?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    pub fn get_varlong(buf: &mut impl Buf) -> Result<i64, ProtocolError> {
        let raw = get_uvarlong(buf)?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }
}

/// Appends fields to a frame buffer.
pub struct Writer<'a> {
    buf: &'a mut BytesMut,
    flexible: bool,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut BytesMut, flexible: bool) -> Self {
        Self { buf, flexible }
    }

    pub fn is_flexible(&self) -> bool {
        self.flexible
    }

    /// Number of bytes in the underlying buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Direct access for layouts that are not version-dependent.
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut *self.buf
    }

    pub fn put_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn put_uvarint(&mut self, value: u32) {
        varint::put_uvarint(&mut *self.buf, value);
    }

    fn put_compact_len(&mut self, len: usize, what: &str) -> Result<(), ProtocolError> {
        let len = i32::try_from(len)
            .map_err(|_| ProtocolError::encode(format!("{} of length {} is too long", what, len)))?;
        self.put_uvarint(len as u32 + 1);
        Ok(())
    }

    fn put_legacy_i16_len(&mut self, len: usize, what: &str) -> Result<(), ProtocolError> {
        let len = i16::try_from(len).map_err(|_| {
            ProtocolError::encode(format!("{} of length {} exceeds int16 length", what, len))
        })?;
        self.buf.put_i16(len);
        Ok(())
    }

    fn put_legacy_i32_len(&mut self, len: usize, what: &str) -> Result<(), ProtocolError> {
        let len = i32::try_from(len).map_err(|_| {
            ProtocolError::encode(format!("{} of length {} exceeds int32 length", what, len))
        })?;
        self.buf.put_i32(len);
        Ok(())
    }

    pub fn put_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        if self.flexible {
            self.put_compact_len(value.len(), "string")?;
        } else {
            self.put_legacy_i16_len(value.len(), "string")?;
        }
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn put_nullable_string(&mut self, value: Option<&str>) -> Result<(), ProtocolError> {
        match value {
            Some(s) => self.put_string(s),
            None if self.flexible => {
                self.put_uvarint(0);
                Ok(())
            }
            None => {
                self.buf.put_i16(-1);
                Ok(())
            }
        }
    }

    pub fn put_bytes(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        if self.flexible {
            self.put_compact_len(value.len(), "bytes")?;
        } else {
            self.put_legacy_i32_len(value.len(), "bytes")?;
        }
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn put_nullable_bytes(&mut self, value: Option<&[u8]>) -> Result<(), ProtocolError> {
        match value {
            Some(b) => self.put_bytes(b),
            None if self.flexible => {
                self.put_uvarint(0);
                Ok(())
            }
            None => {
                self.buf.put_i32(-1);
                Ok(())
            }
        }
    }

    pub fn put_array<T, F>(&mut self, items: &[T], mut f: F) -> Result<(), ProtocolError>
    where
        F: FnMut(&mut Self, &T) -> Result<(), ProtocolError>,
    {
        if self.flexible {
            self.put_compact_len(items.len(), "array")?;
        } else {
            self.put_legacy_i32_len(items.len(), "array")?;
        }
        for item in items {
            f(self, item)?;
        }
        Ok(())
    }

    pub fn put_nullable_array<T, F>(&mut self, items: Option<&[T]>, f: F) -> Result<(), ProtocolError>
    where
        F: FnMut(&mut Self, &T) -> Result<(), ProtocolError>,
    {
        match items {
            Some(items) => self.put_array(items, f),
            None if self.flexible => {
                self.put_uvarint(0);
                Ok(())
            }
            None => {
                self.buf.put_i32(-1);
                Ok(())
            }
        }
    }

    /// Writes an array of sub-structures through their [`Encode`] impl.
    pub fn put_structs<T: Encode>(&mut self, items: &[T], version: i16) -> Result<(), ProtocolError> {
        self.put_array(items, |w, item| item.encode(w, version))
    }

    pub fn put_i32_array(&mut self, items: &[i32]) -> Result<(), ProtocolError> {
        self.put_array(items, |w, v| {
            w.put_i32(*v);
            Ok(())
        })
    }

    pub fn put_string_array(&mut self, items: &[String]) -> Result<(), ProtocolError> {
        self.put_array(items, |w, s| w.put_string(s))
    }

    /// Writes the tagged-field trailer. Legacy versions have none, so only an
    /// empty set is accepted there.
    pub fn put_tagged_fields(&mut self, fields: &TaggedFields) -> Result<(), ProtocolError> {
        if !self.flexible {
            if fields.is_empty() {
                return Ok(());
            }
            return Err(ProtocolError::encode(format!(
                "{} tagged field(s) cannot be written in a non-flexible version",
                fields.len()
            )));
        }
        fields.encode_into(&mut *self.buf)
    }
}

/// Consumes fields from a frame body.
#[derive(Debug, Clone)]
pub struct Reader {
    buf: Bytes,
    flexible: bool,
    unknown_tags: UnknownTagPolicy,
}

impl Reader {
    pub fn new(buf: Bytes, flexible: bool) -> Self {
        Self {
            buf,
            flexible,
            unknown_tags: UnknownTagPolicy::default(),
        }
    }

    pub fn with_unknown_tags(mut self, policy: UnknownTagPolicy) -> Self {
        self.unknown_tags = policy;
        self
    }

    pub fn is_flexible(&self) -> bool {
        self.flexible
    }

    pub(crate) fn set_flexible(&mut self, flexible: bool) {
        self.flexible = flexible;
    }

    pub fn unknown_tags(&self) -> UnknownTagPolicy {
        self.unknown_tags
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Drops whatever is left in the body.
    pub fn discard_remaining(&mut self) -> usize {
        let n = self.buf.remaining();
        self.buf.advance(n);
        n
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::decode(format!(
                "unexpected end of body reading {}: need {} bytes, have {}",
                what,
                needed,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn get_i8(&mut self) -> Result<i8, ProtocolError> {
        self.ensure(1, "int8")?;
        Ok(self.buf.get_i8())
    }

    pub fn get_i16(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2, "int16")?;
        Ok(self.buf.get_i16())
    }

    pub fn get_i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4, "int32")?;
        Ok(self.buf.get_i32())
    }

    pub fn get_i64(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8, "int64")?;
        Ok(self.buf.get_i64())
    }

    pub fn get_bool(&mut self) -> Result<bool, ProtocolError> {
        self.ensure(1, "bool")?;
        Ok(self.buf.get_u8() != 0)
    }

    pub fn get_uvarint(&mut self) -> Result<u32, ProtocolError> {
        varint::get_uvarint(&mut self.buf)
    }

    /// Splits off `len` raw bytes without copying.
    pub fn get_raw(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(len, "raw bytes")?;
        Ok(self.buf.split_to(len))
    }

    /// Reads a length prefix; `None` is the null sentinel.
    fn get_len(&mut self, legacy_width: usize, what: &str) -> Result<Option<usize>, ProtocolError> {
        let len: i64 = if self.flexible {
            i64::from(self.get_uvarint()?) - 1
        } else if legacy_width == 2 {
            i64::from(self.get_i16()?)
        } else {
            i64::from(self.get_i32()?)
        };
        match len {
            -1 => Ok(None),
            n if n < -1 => Err(ProtocolError::decode(format!(
                "invalid {} length {}",
                what, n
            ))),
            n => Ok(Some(n as usize)),
        }
    }

    pub fn get_nullable_string(&mut self) -> Result<Option<String>, ProtocolError> {
        match self.get_len(2, "string")? {
            None => Ok(None),
            Some(len) => {
                let raw = self.get_raw(len)?;
                String::from_utf8(raw.to_vec())
                    .map(Some)
                    .map_err(|_| ProtocolError::decode("invalid UTF-8 in string"))
            }
        }
    }

    pub fn get_string(&mut self) -> Result<String, ProtocolError> {
        self.get_nullable_string()?
            .ok_or_else(|| ProtocolError::decode("null value for non-nullable string"))
    }

    pub fn get_nullable_bytes(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        match self.get_len(4, "bytes")? {
            None => Ok(None),
            Some(len) => self.get_raw(len).map(Some),
        }
    }

    pub fn get_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        self.get_nullable_bytes()?
            .ok_or_else(|| ProtocolError::decode("null value for non-nullable bytes"))
    }

    pub fn get_nullable_array<T, F>(&mut self, mut f: F) -> Result<Option<Vec<T>>, ProtocolError>
    where
        F: FnMut(&mut Self) -> Result<T, ProtocolError>,
    {
        let count = match self.get_len(4, "array")? {
            None => return Ok(None),
            Some(count) => count,
        };
        // Every element occupies at least one byte.
        if count > self.buf.remaining() {
            return Err(ProtocolError::decode(format!(
                "array of {} elements exceeds the {} bytes left in the body",
                count,
                self.buf.remaining()
            )));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(f(self)?);
        }
        Ok(Some(items))
    }

    pub fn get_array<T, F>(&mut self, f: F) -> Result<Vec<T>, ProtocolError>
    where
        F: FnMut(&mut Self) -> Result<T, ProtocolError>,
    {
        self.get_nullable_array(f)?
            .ok_or_else(|| ProtocolError::decode("null value for non-nullable array"))
    }

    pub fn get_structs<T: Decode>(&mut self, version: i16) -> Result<Vec<T>, ProtocolError> {
        self.get_array(|r| T::decode(r, version))
    }

    pub fn get_i32_array(&mut self) -> Result<Vec<i32>, ProtocolError> {
        self.get_array(|r| r.get_i32())
    }

    pub fn get_string_array(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.get_array(|r| r.get_string())
    }

    /// Reads the tagged-field trailer; legacy versions have none.
    pub fn get_tagged_fields(&mut self) -> Result<TaggedFields, ProtocolError> {
        if !self.flexible {
            return Ok(TaggedFields::default());
        }
        let policy = self.unknown_tags;
        TaggedFields::decode_from(&mut self.buf, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn written(flexible: bool, f: impl FnOnce(&mut Writer<'_>)) -> BytesMut {
        let mut buf = BytesMut::new();
        let mut w = Writer::new(&mut buf, flexible);
        f(&mut w);
        buf
    }

    #[test]
    fn test_uvarint_layout() {
        let mut buf = BytesMut::new();
        varint::put_uvarint(&mut buf, 300);
        assert_eq!(&buf[..], &[0xac, 0x02]);
        assert_eq!(varint::uvarint_len(300), 2);
        assert_eq!(varint::uvarint_len(0), 1);
        assert_eq!(varint::uvarint_len(u32::MAX), 5);
    }

    #[test]
    fn test_zigzag_layout() {
        let mut buf = BytesMut::new();
        varint::put_varint(&mut buf, -1);
        varint::put_varint(&mut buf, 1);
        varint::put_varint(&mut buf, -64);
        assert_eq!(&buf[..], &[0x01, 0x02, 0x7f]);
        assert_eq!(varint::varint_len(-1), 1);
        assert_eq!(varint::varlong_len(i64::MIN), 10);
    }

    #[test]
    fn test_varint_truncated() {
        let mut data = Bytes::from_static(&[0x80, 0x80]);
        assert!(matches!(
            varint::get_uvarint(&mut data),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_varint_too_long() {
        let mut data = Bytes::from_static(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(varint::get_uvarint(&mut data).is_err());

        // Five bytes but more than 32 bits of payload.
        let mut data = Bytes::from_static(&[0xff, 0xff, 0xff, 0xff, 0x1f]);
        assert!(varint::get_uvarint(&mut data).is_err());
    }

    #[test]
    fn test_legacy_string_layout() {
        let buf = written(false, |w| {
            w.put_string("me").unwrap();
            w.put_nullable_string(None).unwrap();
        });
        assert_eq!(&buf[..], &[0x00, 0x02, b'm', b'e', 0xff, 0xff]);
    }

    #[test]
    fn test_compact_string_layout() {
        let buf = written(true, |w| {
            w.put_string("me").unwrap();
            w.put_nullable_string(None).unwrap();
        });
        assert_eq!(&buf[..], &[0x03, b'm', b'e', 0x00]);
    }

    #[test]
    fn test_array_layouts() {
        let legacy = written(false, |w| {
            w.put_i32_array(&[1]).unwrap();
            w.put_nullable_array::<i32, _>(None, |_, _| Ok(())).unwrap();
        });
        assert_eq!(
            &legacy[..],
            &[0, 0, 0, 1, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff]
        );

        let compact = written(true, |w| {
            w.put_i32_array(&[1]).unwrap();
            w.put_nullable_array::<i32, _>(None, |_, _| Ok(())).unwrap();
        });
        assert_eq!(&compact[..], &[0x02, 0, 0, 0, 1, 0x00]);
    }

    #[test]
    fn test_string_too_long_for_int16() {
        let long = "x".repeat(i16::MAX as usize + 1);
        let mut buf = BytesMut::new();
        let mut w = Writer::new(&mut buf, false);
        let err = w.put_string(&long).unwrap_err();
        assert!(matches!(err, ProtocolError::Encode(_)));

        // The compact encoding has room for it.
        let mut w = Writer::new(&mut buf, true);
        assert!(w.put_string(&long).is_ok());
    }

    #[test]
    fn test_tagged_fields_rejected_in_legacy_version() {
        let mut fields = TaggedFields::default();
        fields.insert(0, Bytes::from_static(b"x"));

        let mut buf = BytesMut::new();
        let mut w = Writer::new(&mut buf, false);
        assert!(w.put_tagged_fields(&TaggedFields::default()).is_ok());
        assert!(matches!(
            w.put_tagged_fields(&fields),
            Err(ProtocolError::Encode(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reader_truncated_int() {
        let mut r = Reader::new(Bytes::from_static(&[0x00, 0x01]), false);
        assert!(matches!(r.get_i32(), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_reader_null_for_required_string() {
        let mut r = Reader::new(Bytes::from_static(&[0xff, 0xff]), false);
        assert!(r.get_string().is_err());

        let mut r = Reader::new(Bytes::from_static(&[0x00]), true);
        assert!(r.get_string().is_err());
    }

    #[test]
    fn test_reader_invalid_length() {
        let mut r = Reader::new(Bytes::from_static(&[0xff, 0xfe]), false);
        assert!(r.get_nullable_string().is_err());
    }

    #[test]
    fn test_reader_invalid_utf8() {
        let mut r = Reader::new(Bytes::from_static(&[0x00, 0x02, 0xc3, 0x28]), false);
        let err = r.get_string().unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_reader_oversized_array_count() {
        let mut r = Reader::new(Bytes::from_static(&[0x7f, 0xff, 0xff, 0xff, 0x00]), false);
        assert!(r.get_i32_array().is_err());
    }

    #[test]
    fn test_reader_null_array() {
        let mut r = Reader::new(Bytes::from_static(&[0xff, 0xff, 0xff, 0xff]), false);
        assert_eq!(r.get_nullable_array(|r| r.get_i32()).unwrap(), None);

        let mut r = Reader::new(Bytes::from_static(&[0x01]), true);
        assert_eq!(
            r.get_nullable_array(|r| r.get_i32()).unwrap(),
            Some(Vec::new())
        );
    }

    proptest! {
        #[test]
        fn prop_zigzag_varlong(value in any::<i64>()) {
            let mut buf = BytesMut::new();
            varint::put_varlong(&mut buf, value);
            prop_assert_eq!(buf.len(), varint::varlong_len(value));
            let mut data = buf.freeze();
            prop_assert_eq!(varint::get_varlong(&mut data).unwrap(), value);
        }

        #[test]
        fn prop_nullable_string(value in proptest::option::of(".{0,40}"), flexible in any::<bool>()) {
            let mut buf = BytesMut::new();
            Writer::new(&mut buf, flexible).put_nullable_string(value.as_deref()).unwrap();
            let mut r = Reader::new(buf.freeze(), flexible);
            prop_assert_eq!(r.get_nullable_string().unwrap(), value);
            prop_assert_eq!(r.remaining(), 0);
        }
    }
}
