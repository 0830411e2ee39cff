//! Synchronous Stream - used by the device's worker, beacon and the host client
//! alike.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::buffer::BoundedBuffer;
use crate::stream::{PRIMITIVE_LENGTH_MAX, StreamRole};
use crate::stream::{check_field_length, check_width, copy_in, copy_out, reader_only, writer_only};
use crate::Result;

/// Resumable field codec over a [`BoundedBuffer`].
///
/// A Reader stream decodes bytes appended with [`Self::feed()`].  A Writer
/// stream encodes into its buffer, which the owner drains with
/// [`Self::data()`] and [`Self::drain()`].
///
/// Multi-byte values are held little-endian.  With `swap_endian` set they are
/// reversed on the wire, giving a big-endian protocol on any host.
pub struct Stream {
    buffer: BoundedBuffer,
    role: StreamRole,
    swap_endian: bool,

    // Holds a partially read primitive between calls
    primitive: [u8; PRIMITIVE_LENGTH_MAX],

    position: u16,
    total_length: u16,
}

impl Stream {
    /// Create a new stream with its own buffer of `capacity` bytes.
    ///
    /// Arguments:
    /// - `role` - Whether the stream decodes (Reader) or encodes (Writer)
    /// - `capacity` - Buffer size in bytes
    /// - `swap_endian` - Reverse the byte order of primitives on the wire
    pub fn new(role: StreamRole, capacity: usize, swap_endian: bool) -> Self {
        Self {
            buffer: BoundedBuffer::new(capacity),
            role,
            swap_endian,
            primitive: [0; PRIMITIVE_LENGTH_MAX],
            position: 0,
            total_length: 0,
        }
    }

    /// Create a Reader stream
    pub fn reader(capacity: usize, swap_endian: bool) -> Self {
        Self::new(StreamRole::Reader, capacity, swap_endian)
    }

    /// Create a Writer stream
    pub fn writer(capacity: usize, swap_endian: bool) -> Self {
        Self::new(StreamRole::Writer, capacity, swap_endian)
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    pub fn swap_endian(&self) -> bool {
        self.swap_endian
    }

    /// Progress through the current field.  0 between fields.
    pub fn position(&self) -> u16 {
        self.position
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Reader: bytes received but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buffer.pending()
    }

    /// Writer: space left for encoding.
    pub fn left(&self) -> usize {
        self.buffer.left()
    }

    /// Writer: the encoded bytes awaiting transmission.
    pub fn data(&self) -> &[u8] {
        self.buffer.filled()
    }

    /// Reader: Append newly received bytes, first reclaiming the space of
    /// bytes already decoded.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        reader_only(self.role)?;
        self.buffer.compact();
        self.buffer.extend(data)?;
        trace!("Fed {} bytes, {} pending", data.len(), self.buffer.pending());
        Ok(())
    }

    /// Writer: Empty the buffer once its contents have been handed off.  The
    /// current field's position is kept, so a primitive split across the
    /// hand-off continues correctly.
    pub fn drain(&mut self) {
        self.buffer.reset();
    }

    /// Discard buffered data and any partially transferred field.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.position = 0;
        self.total_length = 0;
    }

    /// Start (or continue) a field of `declared_length` bytes.
    ///
    /// Returns the number of bytes of the field that can be transferred right
    /// now - bytes pending for a Reader, space left for a Writer - which may be
    /// less than what remains of the field.
    pub fn begin_field(&mut self, declared_length: u16) -> u16 {
        self.total_length = declared_length;

        let left = declared_length.saturating_sub(self.position) as usize;
        let available = match self.role {
            StreamRole::Reader => self.buffer.pending(),
            StreamRole::Writer => self.buffer.left(),
        };
        left.min(available) as u16
    }

    /// Reader: Read a primitive of `dest.len()` bytes into `dest`.
    ///
    /// `dest` holds the partially read value between calls, so must be the
    /// same storage each time until this returns `Ok(true)`.
    pub fn read_fixed(&mut self, dest: &mut [u8]) -> Result<bool> {
        reader_only(self.role)?;
        check_width(dest.len())?;

        let limit = self.begin_field(dest.len() as u16);
        let src = self.buffer.consume(limit as usize);
        copy_in(src, dest, self.position, self.total_length, self.swap_endian);

        Ok(self.end_field(limit))
    }

    /// Writer: Write the primitive held in `src`.  Pass the same value until
    /// this returns `Ok(true)`.
    pub fn write_fixed(&mut self, src: &[u8]) -> Result<bool> {
        writer_only(self.role)?;
        check_width(src.len())?;

        let limit = self.begin_field(src.len() as u16);
        let dest = &mut self.buffer.spare_mut()[..limit as usize];
        copy_out(src, dest, self.position, self.total_length, self.swap_endian);
        self.buffer.skip(limit as usize);

        Ok(self.end_field(limit))
    }

    /// Reader: Read opaque bytes, filling all of `dest`.  No byte order
    /// handling.
    pub fn read_bytes(&mut self, dest: &mut [u8]) -> Result<bool> {
        reader_only(self.role)?;
        let length = check_field_length(dest.len())?;

        let limit = self.begin_field(length);
        let src = self.buffer.consume(limit as usize);
        copy_in(src, dest, self.position, self.total_length, false);

        Ok(self.end_field(limit))
    }

    /// Writer: Write all of `src` as opaque bytes.
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<bool> {
        writer_only(self.role)?;
        let length = check_field_length(src.len())?;

        let limit = self.begin_field(length);
        let dest = &mut self.buffer.spare_mut()[..limit as usize];
        copy_out(src, dest, self.position, self.total_length, false);
        self.buffer.skip(limit as usize);

        Ok(self.end_field(limit))
    }

    /// Reader: Read a `u8`, returning `Some` once complete.
    pub fn read_u8(&mut self) -> Result<Option<u8>> {
        if self.read_primitive(1)? {
            Ok(Some(self.primitive[0]))
        } else {
            Ok(None)
        }
    }

    /// Reader: Read a `u16`, returning `Some` once complete.
    pub fn read_u16(&mut self) -> Result<Option<u16>> {
        if self.read_primitive(2)? {
            let p = &self.primitive;
            Ok(Some(u16::from_le_bytes([p[0], p[1]])))
        } else {
            Ok(None)
        }
    }

    /// Reader: Read a `u32`, returning `Some` once complete.
    pub fn read_u32(&mut self) -> Result<Option<u32>> {
        if self.read_primitive(4)? {
            let p = &self.primitive;
            Ok(Some(u32::from_le_bytes([p[0], p[1], p[2], p[3]])))
        } else {
            Ok(None)
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<bool> {
        self.write_fixed(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<bool> {
        self.write_fixed(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<bool> {
        self.write_fixed(&value.to_le_bytes())
    }
}

// Internal functions
impl Stream {
    fn read_primitive(&mut self, width: usize) -> Result<bool> {
        reader_only(self.role)?;

        let limit = self.begin_field(width as u16);
        let src = self.buffer.consume(limit as usize);
        copy_in(
            src,
            &mut self.primitive[..width],
            self.position,
            self.total_length,
            self.swap_endian,
        );

        Ok(self.end_field(limit))
    }

    fn end_field(&mut self, delta: u16) -> bool {
        self.position += delta;

        if self.position >= self.total_length {
            self.position = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_read_u16_big_endian() {
        let mut s = Stream::reader(8, true);
        s.feed(&[0x12, 0x34]).unwrap();
        assert_eq!(s.read_u16().unwrap(), Some(0x1234));
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_read_u16_little_endian() {
        let mut s = Stream::reader(8, false);
        s.feed(&[0x12, 0x34]).unwrap();
        assert_eq!(s.read_u16().unwrap(), Some(0x3412));
    }

    #[test]
    fn test_split_primitive_resumes() {
        let mut s = Stream::reader(8, true);

        s.feed(&[0xDE]).unwrap();
        assert_eq!(s.read_u32().unwrap(), None);
        assert_eq!(s.position(), 1);

        s.feed(&[0xAD, 0xBE]).unwrap();
        assert_eq!(s.read_u32().unwrap(), None);
        assert_eq!(s.position(), 3);

        s.feed(&[0xEF, 0x99]).unwrap();
        assert_eq!(s.read_u32().unwrap(), Some(0xDEADBEEF));
        assert_eq!(s.position(), 0);
        // The trailing byte belongs to the next field
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn test_read_with_no_data_changes_nothing() {
        let mut s = Stream::reader(8, true);
        s.feed(&[0x01]).unwrap();
        assert_eq!(s.read_u16().unwrap(), None);
        assert_eq!(s.position(), 1);

        for _ in 0..3 {
            assert_eq!(s.read_u16().unwrap(), None);
            assert_eq!(s.position(), 1);
        }

        s.feed(&[0x02]).unwrap();
        assert_eq!(s.read_u16().unwrap(), Some(0x0102));
    }

    #[test]
    fn test_read_fixed_into_caller_storage() {
        let mut s = Stream::reader(8, true);
        let mut value = [0u8; 2];

        s.feed(&[0x03]).unwrap();
        assert!(!s.read_fixed(&mut value).unwrap());
        s.feed(&[0x84]).unwrap();
        assert!(s.read_fixed(&mut value).unwrap());
        assert_eq!(u16::from_le_bytes(value), 900);
    }

    #[test]
    fn test_write_split_by_drain() {
        let mut s = Stream::writer(3, true);
        assert!(s.write_u8(7).unwrap());
        // Only two of the four bytes fit
        assert!(!s.write_u32(0x01020304).unwrap());
        assert_eq!(s.data(), &[7, 0x01, 0x02]);

        s.drain();
        assert!(s.write_u32(0x01020304).unwrap());
        assert_eq!(s.data(), &[0x03, 0x04]);
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut w = Stream::writer(16, true);
        assert!(w.write_bytes(b"IR-ab12").unwrap());
        // Opaque bytes are never reversed
        assert_eq!(w.data(), b"IR-ab12");

        let mut r = Stream::reader(16, true);
        let mut name = [0u8; 7];
        r.feed(&w.data()[..3]).unwrap();
        assert!(!r.read_bytes(&mut name).unwrap());
        r.feed(&w.data()[3..]).unwrap();
        assert!(r.read_bytes(&mut name).unwrap());
        assert_eq!(&name, b"IR-ab12");
    }

    #[test]
    fn test_zero_length_field_completes() {
        let mut r = Stream::reader(4, true);
        assert!(r.read_bytes(&mut []).unwrap());
        let mut w = Stream::writer(0, true);
        assert!(w.write_bytes(&[]).unwrap());
    }

    #[test]
    fn test_role_enforced() {
        let mut r = Stream::reader(4, true);
        assert_eq!(r.write_u8(1), Err(Error::InvalidOperation));
        let mut w = Stream::writer(4, true);
        assert_eq!(w.read_u8(), Err(Error::InvalidOperation));
        assert_eq!(w.feed(&[1]), Err(Error::InvalidOperation));
    }

    #[test]
    fn test_width_limit() {
        let mut r = Stream::reader(16, false);
        let mut wide = [0u8; 9];
        assert_eq!(r.read_fixed(&mut wide), Err(Error::InvalidWidth));
    }

    #[test]
    fn test_feed_overflow() {
        let mut r = Stream::reader(4, false);
        r.feed(&[1, 2, 3]).unwrap();
        assert_eq!(r.feed(&[4, 5]), Err(Error::PayloadTooLarge));

        // Consumed bytes are reclaimed by the next feed
        r.read_u16().unwrap();
        r.feed(&[4, 5]).unwrap();
        assert_eq!(r.pending(), 3);
    }
}
