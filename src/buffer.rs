//! Fixed capacity byte buffer.
//!
//! A [`BoundedBuffer`] is allocated once and then used as a stack: bytes are
//! appended at the cursor, and (for inbound data) consumed from the head.  It
//! never reallocates.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;
use alloc::vec;

use crate::{Error, Result};

/// Fixed capacity append/consume buffer.
///
/// Invariant: `head <= cursor <= capacity`.
pub struct BoundedBuffer {
    data: Box<[u8]>,
    head: usize,
    cursor: usize,
}

impl BoundedBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            cursor: 0,
        }
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes appended since the last reset
    pub fn size(&self) -> usize {
        self.cursor
    }

    /// Space remaining for appends
    pub fn left(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Appended bytes not yet consumed
    pub fn pending(&self) -> usize {
        self.cursor - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// All appended bytes, consumed or not.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.cursor]
    }

    /// Appended bytes not yet consumed.
    pub fn unconsumed(&self) -> &[u8] {
        &self.data[self.head..self.cursor]
    }

    /// The unused region after the cursor.  Write into it, then [`Self::skip()`]
    /// over what was written.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.cursor..]
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.left() == 0 {
            return Err(Error::PayloadTooLarge);
        }
        self.data[self.cursor] = byte;
        self.cursor += 1;
        Ok(())
    }

    /// Append `bytes`, all or nothing.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.left() {
            return Err(Error::PayloadTooLarge);
        }
        self.data[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        Ok(())
    }

    /// Advance the cursor over `n` bytes already written via
    /// [`Self::spare_mut()`].  Clamped to capacity.
    pub fn skip(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.data.len());
    }

    /// Consume up to `n` pending bytes from the head, returning them.
    pub fn consume(&mut self, n: usize) -> &[u8] {
        let n = n.min(self.pending());
        let start = self.head;
        self.head += n;
        &self.data[start..start + n]
    }

    /// Move unconsumed bytes to the start of the buffer, reclaiming the space
    /// taken by consumed bytes.
    pub fn compact(&mut self) {
        if self.head == 0 {
            return;
        }
        self.data.copy_within(self.head..self.cursor, 0);
        self.cursor -= self.head;
        self.head = 0;
    }

    /// Discard everything.  Contents are left in place but unreachable.
    pub fn reset(&mut self) {
        self.head = 0;
        self.cursor = 0;
    }

    /// Byte at `index` within the filled region.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.filled().get(index).copied()
    }
}

impl core::fmt::Write for BoundedBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.extend(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}

impl core::fmt::Debug for BoundedBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity())
            .field("head", &self.head)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn test_push_and_consume() {
        let mut buf = BoundedBuffer::new(4);
        assert!(buf.is_empty());

        buf.push(1).unwrap();
        buf.extend(&[2, 3]).unwrap();
        assert_eq!(buf.size(), 3);
        assert_eq!(buf.left(), 1);

        assert_eq!(buf.consume(2), &[1, 2]);
        assert_eq!(buf.pending(), 1);
        assert_eq!(buf.unconsumed(), &[3]);

        // Consuming more than pending stops at the cursor
        assert_eq!(buf.consume(10), &[3]);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn test_overflow_is_all_or_nothing() {
        let mut buf = BoundedBuffer::new(3);
        buf.extend(&[1, 2]).unwrap();
        assert_eq!(buf.extend(&[3, 4]), Err(Error::PayloadTooLarge));
        assert_eq!(buf.filled(), &[1, 2]);

        buf.push(3).unwrap();
        assert_eq!(buf.push(4), Err(Error::PayloadTooLarge));
    }

    #[test]
    fn test_compact_reclaims_consumed_space() {
        let mut buf = BoundedBuffer::new(4);
        buf.extend(&[1, 2, 3, 4]).unwrap();
        buf.consume(3);
        buf.compact();

        assert_eq!(buf.filled(), &[4]);
        assert_eq!(buf.left(), 3);
        buf.extend(&[5, 6, 7]).unwrap();
        assert_eq!(buf.unconsumed(), &[4, 5, 6, 7]);
    }

    #[test]
    fn test_spare_and_skip() {
        let mut buf = BoundedBuffer::new(4);
        buf.spare_mut()[..2].copy_from_slice(&[9, 8]);
        buf.skip(2);
        assert_eq!(buf.filled(), &[9, 8]);

        buf.skip(100);
        assert_eq!(buf.size(), 4);
        assert_eq!(buf.left(), 0);
    }

    #[test]
    fn test_fmt_write() {
        let mut buf = BoundedBuffer::new(8);
        write!(buf, "IR-{:04x}", 0xab12).unwrap();
        assert_eq!(buf.filled(), b"IR-ab12");

        assert!(write!(buf, "too long").is_err());
    }
}
