//! One-shot byte streams backing streamable message fields.
//!
//! A [`ByteStream`] can be drained exactly once. Encoding a message that
//! holds one consumes it; a second encode observes an empty stream. Callers
//! that encode the same message repeatedly capture the content first and
//! re-arm the stream with [`ByteStream::replace`] between passes.

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Read};

type BoxedReader = Box<dyn Read + Send>;

/// A once-readable sequence of bytes.
pub struct ByteStream {
    reader: Mutex<Option<BoxedReader>>,
}

impl ByteStream {
    /// Wraps an arbitrary reader.
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Mutex::new(Some(Box::new(reader))),
        }
    }

    /// A stream over in-memory bytes.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(data.into().reader())
    }

    /// A stream with no handle, as left behind by [`ByteStream::close`].
    pub fn closed() -> Self {
        Self {
            reader: Mutex::new(None),
        }
    }

    /// Reads everything left in the stream.
    ///
    /// An exhausted stream yields empty bytes; a closed one is an error.
    pub fn read_all(&self) -> io::Result<Bytes> {
        let mut guard = self.reader.lock();
        let reader = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "byte stream is closed"))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Bytes::from(data))
    }

    /// Installs a new reader in place of the current one.
    pub fn replace(&self, reader: impl Read + Send + 'static) {
        *self.reader.lock() = Some(Box::new(reader));
    }

    /// Drops the underlying reader. Safe to call more than once.
    pub fn close(&self) {
        self.reader.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.reader.lock().is_none()
    }
}

impl From<Bytes> for ByteStream {
    fn from(data: Bytes) -> Self {
        Self::from_bytes(data)
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_closed() { "closed" } else { "open" };
        f.debug_struct("ByteStream").field("state", &state).finish()
    }
}
