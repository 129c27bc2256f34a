//! Fixed-capacity output buffer shared between the session and transport.
//!
//! Uses `bytes::BytesMut` so a finished packet can be handed to the
//! transport without copying. The buffer has:
//! - a write cursor (`len()`)
//! - an end boundary (`capacity()`)
//! - a flush flag the session raises when the transport must drain it
//!
//! # Example
//!
//! ```
//! use nfv9_export::protocol::ExportBuffer;
//!
//! let mut buffer = ExportBuffer::with_capacity(1472);
//! assert_eq!(buffer.remaining(), 1472);
//! assert!(!buffer.flush_requested());
//!
//! // After the session filled it, transport drains it:
//! let packet = buffer.take();
//! assert!(packet.is_empty());
//! assert!(buffer.is_empty());
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::DEFAULT_MAX_PACKET_SIZE;
use crate::error::{ExportError, Result};

/// Output buffer for one packet at a time.
///
/// Only the session writes into it. Every write is bounds-checked against
/// the end boundary; a failed check leaves the buffer untouched.
#[derive(Debug)]
pub struct ExportBuffer {
    /// Bytes written so far.
    buffer: BytesMut,
    /// End boundary.
    capacity: usize,
    /// Set when the packet is finalized and must be sent.
    flush: bool,
}

impl ExportBuffer {
    /// Create a buffer sized for the default packet size (1472 bytes).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_PACKET_SIZE)
    }

    /// Create a buffer with a custom end boundary.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            flush: false,
        }
    }

    /// Number of bytes written (the cursor position).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// End boundary in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes left before the end boundary.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// Check whether the session asked for the buffer to be sent.
    pub fn flush_requested(&self) -> bool {
        self.flush
    }

    /// Written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Hand the written bytes to the transport.
    ///
    /// Resets the cursor and clears the flush flag.
    pub fn take(&mut self) -> Bytes {
        self.flush = false;
        let packet = self.buffer.split().freeze();
        self.buffer.reserve(self.capacity);
        packet
    }

    /// Drop everything written and clear the flush flag.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.flush = false;
    }

    pub(crate) fn request_flush(&mut self) {
        self.flush = true;
    }

    /// Check that `needed` more bytes fit.
    pub(crate) fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ExportError::BufferOverflow { needed, remaining });
        }
        Ok(())
    }

    /// Append a byte slice.
    pub(crate) fn put_slice(&mut self, data: &[u8]) -> Result<()> {
        self.ensure(data.len())?;
        self.buffer.put_slice(data);
        Ok(())
    }

    /// Append `count` zero bytes.
    pub(crate) fn put_zeros(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.buffer.put_bytes(0, count);
        Ok(())
    }

    /// Append a field group of exactly `width` bytes.
    ///
    /// The closure writes through `BufMut`; the bounds check happens once
    /// for the whole group.
    pub(crate) fn put_group<F>(&mut self, width: usize, write: F) -> Result<()>
    where
        F: FnOnce(&mut BytesMut),
    {
        self.ensure(width)?;
        let start = self.buffer.len();
        write(&mut self.buffer);
        debug_assert_eq!(self.buffer.len() - start, width, "field group width mismatch");
        Ok(())
    }

    /// Overwrite already written bytes at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside the written region.
    pub(crate) fn patch(&mut self, offset: usize, data: &[u8]) {
        self.buffer[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Overwrite a big-endian u16 at `offset`.
    pub(crate) fn patch_u16(&mut self, offset: usize, value: u16) {
        self.patch(offset, &value.to_be_bytes());
    }
}

impl Default for ExportBuffer {
    fn default() -> Self {
        Self::new()
    }
}
