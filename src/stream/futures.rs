//! Asynchronous framing - typically used by a Host.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;
use async_trait::async_trait;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::io::{Reader, Writer};
use crate::{Error, Result};

/// Trait for exchanging whole frames with a device.
///
/// Unlike [`Reader`] and [`Writer`], which may transfer partial buffers, these
/// complete the whole transfer or fail.
#[async_trait(?Send)]
pub trait AsyncFrameIo {
    /// Fill all of `buf`.  Fails with [`Error::Disconnected`] if the peer
    /// closes first.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `data`.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;
}

/// Frame I/O implementation using [`crate::io::Reader`] and
/// [`crate::io::Writer`] traits.
pub struct ReaderWriterFrameIo<'a, R: Reader, W: Writer> {
    reader: &'a mut R,
    writer: &'a mut W,
}

impl<'a, R: Reader, W: Writer> ReaderWriterFrameIo<'a, R, W> {
    /// Create new instance
    pub fn new(reader: &'a mut R, writer: &'a mut W) -> Self {
        Self { reader, writer }
    }
}

#[async_trait(?Send)]
impl<R: Reader, W: Writer> AsyncFrameIo for ReaderWriterFrameIo<'_, R, W> {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..]).await.map_err(|e| {
                warn!("Read failed: {e:?}");
                Error::Io
            })?;
            if n == 0 {
                debug!("Connection closed after {filled}/{} bytes", buf.len());
                return Err(Error::Disconnected);
            }
            filled += n;
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self.writer.write(&data[written..]).await.map_err(|e| {
                warn!("Write failed: {e:?}");
                Error::Io
            })?;
            if n == 0 {
                return Err(Error::Disconnected);
            }
            written += n;
        }
        Ok(())
    }
}
