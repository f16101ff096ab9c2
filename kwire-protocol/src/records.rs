//! Record batches (magic v2), the payload of produce requests.
//!
//! Batch layout (61 bytes of header + records):
//!
//! ```text
//! +-------------+--------------+-----------------------+-------+--------+
//! | base_offset | batch_length | partition_leader_epoch| magic | crc32c |
//! |   8 bytes   |   4 bytes    |        4 bytes        | 1 byte| 4 bytes|
//! +-------------+--------------+-----------------------+-------+--------+
//! | attributes | last_offset_delta | base_timestamp | max_timestamp      |
//! |  2 bytes   |      4 bytes      |    8 bytes     |    8 bytes         |
//! +------------+-------------------+----------------+--------------------+
//! | producer_id | producer_epoch | base_sequence | record_count | records|
//! |   8 bytes   |    2 bytes     |    4 bytes    |   4 bytes    |  ...   |
//! +-------------+----------------+---------------+--------------+--------+
//! ```
//!
//! `batch_length` counts the bytes after itself; the CRC-32C covers
//! everything from `attributes` to the end of the batch. Records use
//! zig-zag varints for their lengths, deltas and key/value sizes.

use crate::error::ProtocolError;
use crate::wire::varint;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Only record batch format supported.
pub const MAGIC_V2: i8 = 2;

/// Size of the fixed batch header in bytes.
pub const BATCH_HEADER_SIZE: usize = 61;

/// Bytes preceding the `batch_length` count (base offset + length field).
const LOG_OVERHEAD: usize = 12;

const MAGIC_OFFSET: usize = 16;
const CRC_OFFSET: usize = 17;
const ATTRIBUTES_OFFSET: usize = 21;

/// Bits of the batch attributes selecting the compression codec.
pub const COMPRESSION_MASK: i16 = 0x07;
/// Set when timestamps are broker-assigned log append times.
pub const TIMESTAMP_TYPE_FLAG: i16 = 0x08;
pub const TRANSACTIONAL_FLAG: i16 = 0x10;
pub const CONTROL_FLAG: i16 = 0x20;

/// A record header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Option<Bytes>,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

/// A single record inside a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub attributes: i8,
    pub timestamp_delta: i64,
    pub offset_delta: i32,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

/// A magic v2 record batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatch {
    pub base_offset: i64,
    pub partition_leader_epoch: i32,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub base_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    pub records: Vec<Record>,
}

impl Default for RecordBatch {
    fn default() -> Self {
        Self {
            base_offset: 0,
            partition_leader_epoch: -1,
            attributes: 0,
            last_offset_delta: 0,
            base_timestamp: 0,
            max_timestamp: 0,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            records: Vec::new(),
        }
    }
}

fn put_varint_len(buf: &mut BytesMut, len: usize, what: &str) -> Result<(), ProtocolError> {
    let len = i32::try_from(len)
        .map_err(|_| ProtocolError::encode(format!("record {} of {} bytes is too long", what, len)))?;
    varint::put_varint(buf, len);
    Ok(())
}

fn put_varint_bytes(buf: &mut BytesMut, data: Option<&Bytes>, what: &str) -> Result<(), ProtocolError> {
    match data {
        Some(data) => {
            put_varint_len(buf, data.len(), what)?;
            buf.put_slice(data);
        }
        None => varint::put_varint(buf, -1),
    }
    Ok(())
}

fn get_varint_bytes(buf: &mut Bytes, what: &str) -> Result<Option<Bytes>, ProtocolError> {
    let len = varint::get_varint(buf)?;
    if len == -1 {
        return Ok(None);
    }
    if len < -1 || len as usize > buf.remaining() {
        return Err(ProtocolError::decode(format!(
            "record {} length {} is invalid ({} bytes left)",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(Some(buf.split_to(len as usize)))
}

impl Record {
    pub fn new(key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            key,
            value,
            ..Default::default()
        }
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_i8(self.attributes);
        varint::put_varlong(&mut body, self.timestamp_delta);
        varint::put_varint(&mut body, self.offset_delta);
        put_varint_bytes(&mut body, self.key.as_ref(), "key")?;
        put_varint_bytes(&mut body, self.value.as_ref(), "value")?;
        put_varint_len(&mut body, self.headers.len(), "header count")?;
        for header in &self.headers {
            put_varint_len(&mut body, header.key.len(), "header key")?;
            body.put_slice(header.key.as_bytes());
            put_varint_bytes(&mut body, header.value.as_ref(), "header value")?;
        }

        put_varint_len(buf, body.len(), "body")?;
        buf.put_slice(&body);
        Ok(())
    }

    fn decode_from(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let len = varint::get_varint(buf)?;
        if len < 0 || len as usize > buf.remaining() {
            return Err(ProtocolError::decode(format!(
                "record length {} is invalid ({} bytes left in batch)",
                len,
                buf.remaining()
            )));
        }
        let mut body = buf.split_to(len as usize);

        if !body.has_remaining() {
            return Err(ProtocolError::decode("empty record body"));
        }
        let attributes = body.get_i8();
        let timestamp_delta = varint::get_varlong(&mut body)?;
        let offset_delta = varint::get_varint(&mut body)?;
        let key = get_varint_bytes(&mut body, "key")?;
        let value = get_varint_bytes(&mut body, "value")?;

        let header_count = varint::get_varint(&mut body)?;
        if header_count < 0 || header_count as usize > body.remaining() {
            return Err(ProtocolError::decode(format!(
                "invalid record header count {}",
                header_count
            )));
        }
        let mut headers = Vec::with_capacity(header_count as usize);
        for _ in 0..header_count {
            let key = get_varint_bytes(&mut body, "header key")?
                .ok_or_else(|| ProtocolError::decode("null record header key"))?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|_| ProtocolError::decode("invalid UTF-8 in record header key"))?;
            let value = get_varint_bytes(&mut body, "header value")?;
            headers.push(Header { key, value });
        }

        if body.has_remaining() {
            return Err(ProtocolError::decode(format!(
                "{} unexpected bytes after record",
                body.remaining()
            )));
        }

        Ok(Self {
            attributes,
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers,
        })
    }
}

impl RecordBatch {
    /// Creates an empty batch whose record timestamps are relative to `base_timestamp`.
    pub fn new(base_timestamp: i64) -> Self {
        Self {
            base_timestamp,
            max_timestamp: base_timestamp,
            ..Default::default()
        }
    }

    /// Appends a record, deriving its offset and timestamp deltas.
    ///
    /// Fails once the batch holds `i32::MAX` records, or when `timestamp`
    /// lies too far from the base timestamp for an i64 delta.
    pub fn push_record(
        &mut self,
        key: Option<Bytes>,
        value: Option<Bytes>,
        timestamp: i64,
    ) -> Result<(), ProtocolError> {
        let offset_delta = i32::try_from(self.records.len())
            .map_err(|_| ProtocolError::encode("record batch offset delta overflows int32"))?;
        let timestamp_delta = timestamp.checked_sub(self.base_timestamp).ok_or_else(|| {
            ProtocolError::encode(format!(
                "timestamp {} overflows delta from base timestamp {}",
                timestamp, self.base_timestamp
            ))
        })?;
        self.records.push(Record {
            timestamp_delta,
            offset_delta,
            ..Record::new(key, value)
        });
        self.last_offset_delta = offset_delta;
        self.max_timestamp = self.max_timestamp.max(timestamp);
        Ok(())
    }

    /// Builder form of [`push_record`](Self::push_record).
    pub fn with_record(
        mut self,
        key: Option<Bytes>,
        value: Option<Bytes>,
        timestamp: i64,
    ) -> Result<Self, ProtocolError> {
        self.push_record(key, value, timestamp)?;
        Ok(self)
    }

    pub fn compression(&self) -> i16 {
        self.attributes & COMPRESSION_MASK
    }

    pub fn is_transactional(&self) -> bool {
        self.attributes & TRANSACTIONAL_FLAG != 0
    }

    pub fn is_control(&self) -> bool {
        self.attributes & CONTROL_FLAG != 0
    }

    /// Appends the encoded batch to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if self.compression() != 0 {
            return Err(ProtocolError::encode(format!(
                "compression codec {} is not supported",
                self.compression()
            )));
        }
        let record_count = i32::try_from(self.records.len())
            .map_err(|_| ProtocolError::encode("too many records in batch"))?;

        let start = buf.len();
        buf.put_i64(self.base_offset);
        buf.put_i32(0); // batch length, patched below
        buf.put_i32(self.partition_leader_epoch);
        buf.put_i8(MAGIC_V2);
        buf.put_u32(0); // crc, patched below
        buf.put_i16(self.attributes);
        buf.put_i32(self.last_offset_delta);
        buf.put_i64(self.base_timestamp);
        buf.put_i64(self.max_timestamp);
        buf.put_i64(self.producer_id);
        buf.put_i16(self.producer_epoch);
        buf.put_i32(self.base_sequence);
        buf.put_i32(record_count);
        for record in &self.records {
            if let Err(e) = record.encode_into(buf) {
                buf.truncate(start);
                return Err(e);
            }
        }

        let batch_length = match i32::try_from(buf.len() - start - LOG_OVERHEAD) {
            Ok(len) => len,
            Err(_) => {
                buf.truncate(start);
                return Err(ProtocolError::encode("record batch exceeds int32 length"));
            }
        };
        buf[start + 8..start + LOG_OVERHEAD].copy_from_slice(&batch_length.to_be_bytes());
        let crc = crc32c::crc32c(&buf[start + ATTRIBUTES_OFFSET..]);
        buf[start + CRC_OFFSET..start + ATTRIBUTES_OFFSET].copy_from_slice(&crc.to_be_bytes());
        Ok(())
    }

    /// Decodes one batch from the front of `buf`.
    pub fn decode_from(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < LOG_OVERHEAD {
            return Err(ProtocolError::decode(format!(
                "truncated record batch: {} bytes left",
                buf.remaining()
            )));
        }
        let batch_length = i32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        if batch_length < (BATCH_HEADER_SIZE - LOG_OVERHEAD) as i32 {
            return Err(ProtocolError::decode(format!(
                "record batch length {} is smaller than the batch header",
                batch_length
            )));
        }
        let total = LOG_OVERHEAD + batch_length as usize;
        if buf.remaining() < total {
            return Err(ProtocolError::decode(format!(
                "truncated record batch: declared {} bytes, {} left",
                total,
                buf.remaining()
            )));
        }
        let mut batch = buf.split_to(total);

        let magic = batch[MAGIC_OFFSET] as i8;
        if magic != MAGIC_V2 {
            return Err(ProtocolError::decode(format!(
                "unsupported record batch magic {}",
                magic
            )));
        }
        let expected = u32::from_be_bytes([
            batch[CRC_OFFSET],
            batch[CRC_OFFSET + 1],
            batch[CRC_OFFSET + 2],
            batch[CRC_OFFSET + 3],
        ]);
        let actual = crc32c::crc32c(&batch[ATTRIBUTES_OFFSET..]);
        if expected != actual {
            return Err(ProtocolError::decode(format!(
                "record batch CRC mismatch: expected {:#x}, got {:#x}",
                expected, actual
            )));
        }

        let base_offset = batch.get_i64();
        batch.advance(4); // batch length
        let partition_leader_epoch = batch.get_i32();
        batch.advance(5); // magic + crc
        let attributes = batch.get_i16();
        if attributes & COMPRESSION_MASK != 0 {
            return Err(ProtocolError::decode(format!(
                "compression codec {} is not supported",
                attributes & COMPRESSION_MASK
            )));
        }
        let last_offset_delta = batch.get_i32();
        let base_timestamp = batch.get_i64();
        let max_timestamp = batch.get_i64();
        let producer_id = batch.get_i64();
        let producer_epoch = batch.get_i16();
        let base_sequence = batch.get_i32();
        let record_count = batch.get_i32();
        if record_count < 0 || record_count as usize > batch.remaining() {
            return Err(ProtocolError::decode(format!(
                "invalid record count {}",
                record_count
            )));
        }

        let mut records = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            records.push(Record::decode_from(&mut batch)?);
        }
        if batch.has_remaining() {
            return Err(ProtocolError::decode(format!(
                "{} unexpected bytes after the last record",
                batch.remaining()
            )));
        }

        Ok(Self {
            base_offset,
            partition_leader_epoch,
            attributes,
            last_offset_delta,
            base_timestamp,
            max_timestamp,
            producer_id,
            producer_epoch,
            base_sequence,
            records,
        })
    }
}

/// The batches carried for one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    pub batches: Vec<RecordBatch>,
}

impl RecordSet {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches }
    }

    pub fn record_count(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }

    /// Encodes all batches back to back.
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        for batch in &self.batches {
            batch.encode_into(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Decodes consecutive batches until `data` is used up.
    pub fn from_bytes(mut data: Bytes) -> Result<Self, ProtocolError> {
        let mut batches = Vec::new();
        while data.has_remaining() {
            batches.push(RecordBatch::decode_from(&mut data)?);
        }
        Ok(Self { batches })
    }
}
