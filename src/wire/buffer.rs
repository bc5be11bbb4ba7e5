use crate::error::ProbeError;
use crate::util::hex;
use tokio::io::{AsyncRead, AsyncReadExt};

const DEFAULT_INITIAL_CAPACITY: usize = 32 * 1024;
const GROWTH_STEP: usize = 1024 * 1024;

/// Growable byte builder used to assemble and parse wire records. Supports
/// appending from heterogeneous sources and prepending already-known bytes,
/// which is how the ClientHello is wrapped with length-prefixed headers after
/// its inner payload is built.
pub struct ByteAccumulator {
    buf: Vec<u8>,
}

impl ByteAccumulator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, byte: u8) {
        self.reserve(1);
        self.buf.push(byte);
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    pub fn extend_u16(&mut self, value: u16) {
        self.extend(&value.to_be_bytes());
    }

    /// Appends a string of hex digit pairs, with an optional leading "0x".
    pub fn extend_hex(&mut self, hex: &str) -> Result<(), ProbeError> {
        let bytes = hex::decode(hex)?;
        self.extend(&bytes);
        Ok(())
    }

    /// Appends exactly `n` bytes drained from a byte source.
    pub async fn extend_from<R>(&mut self, reader: &mut R, n: usize) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut tmp = vec![0u8; n];
        reader.read_exact(&mut tmp).await?;
        self.extend(&tmp);
        Ok(())
    }

    /// Inserts bytes at the front, shifting existing content right.
    pub fn prepend(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.buf.splice(0..0, bytes.iter().copied());
    }

    pub fn prepend_u16(&mut self, value: u16) {
        self.prepend(&value.to_be_bytes());
    }

    pub fn prepend_hex(&mut self, hex: &str) -> Result<(), ProbeError> {
        let bytes = hex::decode(hex)?;
        self.prepend(&bytes);
        Ok(())
    }

    /// Returns an exact-length copy of the written bytes. An empty
    /// accumulator yields an empty vec, not an error.
    pub fn to_vec(&self) -> Vec<u8> {
        self.buf.clone()
    }

    // Grow by at least a megabyte so repeated small appends during record
    // construction stay amortized.
    fn reserve(&mut self, additional: usize) {
        let remaining = self.buf.capacity() - self.buf.len();
        if remaining < additional {
            self.buf.reserve(GROWTH_STEP.max(additional));
        }
    }
}

impl Default for ByteAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
