//! Asynchronous Client - typically used by a Host.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::vec;
use alloc::vec::Vec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::client::ClientConfig;
use crate::io::{Reader, Writer};
use crate::protocol::{HEAD_LENGTH, PULSES_HEAD_LENGTH, PacketType};
use crate::protocol::{config_body_length, pulses_body_length};
use crate::stream::{AsyncFrameIo, ReaderWriterFrameIo, Stream};
use crate::{Error, Result};

/// A captured signal, as returned by [`AsyncIrClient::receive()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Always 0: the device does not measure the carrier
    pub carrier_frequency: u32,
    /// Alternating mark and space durations, µs, starting with a mark
    pub pulses: Vec<u32>,
}

/// Async client for one request to a device.
///
/// The device serves one request per connection, so create a new client (on
/// a new connection) for each request.
///
/// Example usage:
///
/// ```rust,ignore
/// use ir_station::client::{AsyncIrClient, ClientConfig};
///
/// let (mut reader, mut writer) = ...; // implement Reader and Writer traits
/// let mut client = AsyncIrClient::new(&mut reader, &mut writer, ClientConfig::default());
/// client.send(38_000, &[900, 450, 900, 1700]).await?;
/// ```
pub struct AsyncIrClient<'a, R: Reader, W: Writer> {
    io: ReaderWriterFrameIo<'a, R, W>,
    config: ClientConfig,
}

impl<'a, R: Reader, W: Writer> AsyncIrClient<'a, R, W> {
    /// Create a new AsyncIrClient
    ///
    /// Arguments:
    /// - `reader`: Reader for the connection to the device
    /// - `writer`: Writer for the connection to the device
    /// - `config`: Wire format settings, matching the device's
    pub fn new(reader: &'a mut R, writer: &'a mut W, config: ClientConfig) -> Self {
        Self {
            io: ReaderWriterFrameIo::new(reader, writer),
            config,
        }
    }

    /// Transmit `pulses`, modulated at `frequency` Hz.  Returns once the device
    /// has finished transmitting.
    pub async fn send(&mut self, frequency: u32, pulses: &[u32]) -> Result<()> {
        let width = self.config.pulse_width;
        let length = pulses_body_length(pulses.len(), width)?;
        let count = u16::try_from(pulses.len()).map_err(|_| Error::PayloadTooLarge)?;

        let mut request = self.request(PacketType::SendRequest, length)?;
        complete(request.write_u32(frequency)?)?;
        complete(request.write_u16(count)?)?;
        let mut pulse = [0u8; 4];
        for value in pulses {
            width.encode(*value, &mut pulse);
            complete(request.write_fixed(&pulse[..width.bytes()])?)?;
        }

        debug!("Sending {count} pulses at {frequency}Hz");
        let body = self.exchange(&request, PacketType::SendResponse).await?;
        expect_empty(&body)
    }

    /// Capture the next signal the device sees.
    pub async fn receive(&mut self) -> Result<Capture> {
        let request = self.request(PacketType::ReceiveRequest, 0)?;
        let body = self.exchange(&request, PacketType::ReceiveResponse).await?;

        let width = self.config.pulse_width;
        let mut response = Stream::reader(body.len(), self.config.swap_endian);
        response.feed(&body)?;

        let carrier_frequency = field(response.read_u32()?)?;
        let count = field(response.read_u16()?)?;
        if body.len() != PULSES_HEAD_LENGTH + count as usize * width.bytes() {
            warn!("Receive response of {} bytes for {count} pulses", body.len());
            return Err(Error::LengthMismatch);
        }

        let mut pulses = Vec::with_capacity(count as usize);
        let mut pulse = [0u8; 4];
        for _ in 0..count {
            complete(response.read_fixed(&mut pulse[..width.bytes()])?)?;
            pulses.push(width.decode(&pulse));
        }

        debug!("Received {count} pulses");
        Ok(Capture {
            carrier_frequency,
            pulses,
        })
    }

    /// Set the device's name and network credentials.
    pub async fn configure(&mut self, name: &[u8], ssid: &[u8], password: &[u8]) -> Result<()> {
        let length = config_body_length(name, ssid, password)?;

        let mut request = self.request(PacketType::ConfigRequest, length)?;
        for value in [name, ssid, password] {
            // Lengths were checked to fit a u8
            complete(request.write_u8(value.len() as u8)?)?;
            complete(request.write_bytes(value)?)?;
        }

        debug!("Configuring device name ({} bytes)", name.len());
        let body = self.exchange(&request, PacketType::ConfigResponse).await?;
        expect_empty(&body)
    }
}

// Internal functions
impl<R: Reader, W: Writer> AsyncIrClient<'_, R, W> {
    /// A Writer stream sized for the whole request, with the head written.
    fn request(&self, kind: PacketType, length: u16) -> Result<Stream> {
        let mut request = Stream::writer(HEAD_LENGTH + length as usize, self.config.swap_endian);
        complete(request.write_u8(kind as u8)?)?;
        complete(request.write_u16(length)?)?;
        Ok(request)
    }

    /// Send the request, and return the body of the response.
    async fn exchange(&mut self, request: &Stream, expected: PacketType) -> Result<Vec<u8>> {
        self.io.write_all(request.data()).await?;

        let mut head = [0u8; HEAD_LENGTH];
        self.io.read_exact(&mut head).await?;

        let mut response = Stream::reader(HEAD_LENGTH, self.config.swap_endian);
        response.feed(&head)?;
        let code = field(response.read_u8()?)?;
        let length = field(response.read_u16()?)?;

        if code != expected as u8 {
            warn!("Expected {expected:?} response, got type {code}");
            return Err(Error::UnexpectedResponse);
        }

        let mut body = vec![0u8; length as usize];
        self.io.read_exact(&mut body).await?;
        trace!("Response {expected:?}, {length} bytes");
        Ok(body)
    }
}

// Every field of a fully buffered message completes in one call
fn complete(done: bool) -> Result<()> {
    if done {
        Ok(())
    } else {
        Err(Error::BufferTooSmall)
    }
}

fn field<T>(value: Option<T>) -> Result<T> {
    value.ok_or(Error::LengthMismatch)
}

fn expect_empty(body: &[u8]) -> Result<()> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(Error::LengthMismatch)
    }
}
