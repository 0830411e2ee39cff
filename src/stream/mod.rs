//! Resumable, length-delimited field codec.
//!
//! TCP delivers data in arbitrary fragments, and the device has neither the RAM
//! to buffer whole messages nor the time to block waiting for them.  Every field
//! of a message is therefore read (or written) through a [`Stream`], which
//! remembers how far through the current field it got.  When the next fragment
//! arrives the caller simply repeats the same call, and the field carries on
//! from where it stopped.
//!
//! A field's total length is declared up front.  A call returns `Ok(true)` only
//! once the entire declared field has been transferred, across however many
//! calls that took, and `Ok(false)` otherwise.
//!
//! See [`crate`] for how the worker uses streams.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[cfg(feature = "async")]
pub mod futures;
pub mod sync;

#[cfg(feature = "async")]
pub use futures::{AsyncFrameIo, ReaderWriterFrameIo};
pub use sync::Stream;

use crate::{Error, Result};

/// Largest primitive a stream will transfer with byte-order handling.
pub const PRIMITIVE_LENGTH_MAX: usize = 8;

/// Whether the user of this Stream decodes inbound data or encodes outbound
/// data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    Reader,
    Writer,
}

// Helper functions

fn check_width(width: usize) -> Result<()> {
    if width > PRIMITIVE_LENGTH_MAX {
        Err(Error::InvalidWidth)
    } else {
        Ok(())
    }
}

fn check_field_length(length: usize) -> Result<u16> {
    u16::try_from(length).map_err(|_| Error::PayloadTooLarge)
}

fn reader_only(role: StreamRole) -> Result<()> {
    if role != StreamRole::Reader {
        Err(Error::InvalidOperation)
    } else {
        Ok(())
    }
}

fn writer_only(role: StreamRole) -> Result<()> {
    if role != StreamRole::Writer {
        Err(Error::InvalidOperation)
    } else {
        Ok(())
    }
}

/// Copy `src`, which holds wire bytes starting at `position` of a field of
/// `total` bytes, into the field's storage `dest`.
///
/// With `swap` set the field is reversed as a whole, so wire byte `n` lands
/// in `dest[total - 1 - n]`, however the field was split.
fn copy_in(src: &[u8], dest: &mut [u8], position: u16, total: u16, swap: bool) {
    if src.is_empty() {
        return;
    }
    let position = position as usize;
    if swap {
        let top = total as usize - 1 - position;
        for (i, byte) in src.iter().enumerate() {
            dest[top - i] = *byte;
        }
    } else {
        dest[position..position + src.len()].copy_from_slice(src);
    }
}

/// Inverse of [`copy_in()`]: fill `dest` with wire bytes starting at
/// `position` of the field stored in `src`.
fn copy_out(src: &[u8], dest: &mut [u8], position: u16, total: u16, swap: bool) {
    if dest.is_empty() {
        return;
    }
    let position = position as usize;
    if swap {
        let top = total as usize - 1 - position;
        for (i, byte) in dest.iter_mut().enumerate() {
            *byte = src[top - i];
        }
    } else {
        dest.copy_from_slice(&src[position..position + dest.len()]);
    }
}
