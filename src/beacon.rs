//! Discovery beacon.
//!
//! Clients find the device by listening for a UDP broadcast carrying the
//! service port and device name:
//!
//! ```text
//! service_port:u16  name_len:u8  name[name_len]
//! ```
//!
//! The payload is packed once, whenever the name changes, and rebroadcast
//! each time the beacon timer expires.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::io::{TimerId, Timer, Transport};
use crate::protocol::BEACON_HEAD_LENGTH;
use crate::stream::Stream;
use crate::{Error, Result};

/// Packs and periodically broadcasts the discovery payload.
pub struct Beacon {
    port: u16,
    interval_ms: u32,
    payload: Stream,
    running: bool,
}

impl Beacon {
    /// Create a new beacon.
    ///
    /// Arguments:
    /// - `port` - UDP port to broadcast to
    /// - `interval_ms` - Time between broadcasts
    /// - `name_length_max` - Longest name the payload must hold
    /// - `swap_endian` - Byte order of the service port, as for the protocol
    pub fn new(port: u16, interval_ms: u32, name_length_max: usize, swap_endian: bool) -> Self {
        Self {
            port,
            interval_ms,
            payload: Stream::writer(BEACON_HEAD_LENGTH + name_length_max, swap_endian),
            running: false,
        }
    }

    /// The packed payload.  Empty if the last pack failed.
    pub fn payload(&self) -> &[u8] {
        self.payload.data()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pack a new payload.  On failure the payload is cleared, and nothing is
    /// broadcast until the next successful pack.
    pub fn pack(&mut self, service_port: u16, name: &[u8]) -> Result<()> {
        self.payload.reset();
        self.encode(service_port, name).inspect_err(|e| {
            warn!("Failed to pack beacon: {e:?}");
            self.payload.reset();
        })
    }

    /// Start broadcasting.  The first beacon goes out when the timer first
    /// expires.
    pub fn start<T: Timer>(&mut self, timer: &mut T) {
        debug!("Beacon started, every {}ms to port {}", self.interval_ms, self.port);
        self.running = true;
        timer.arm(TimerId::Beacon, self.interval_ms);
    }

    pub fn stop<T: Timer>(&mut self, timer: &mut T) {
        self.running = false;
        timer.disarm(TimerId::Beacon);
    }

    /// Beacon timer expired: broadcast the payload and re-arm.
    pub fn tick<N: Transport + Timer>(&mut self, net: &mut N) {
        if !self.running {
            return;
        }

        if !self.payload().is_empty() {
            trace!("Broadcasting beacon");
            if let Err(e) = net.broadcast(self.port, self.payload.data()) {
                warn!("Beacon broadcast failed: {e:?}");
            }
        }

        net.arm(TimerId::Beacon, self.interval_ms);
    }
}

// Internal functions
impl Beacon {
    fn encode(&mut self, service_port: u16, name: &[u8]) -> Result<()> {
        let name_len = u8::try_from(name.len()).map_err(|_| Error::PayloadTooLarge)?;
        if BEACON_HEAD_LENGTH + name.len() > self.payload.capacity() {
            return Err(Error::PayloadTooLarge);
        }

        // Capacity was checked, so every field completes in one call
        if self.payload.write_u16(service_port)?
            && self.payload.write_u8(name_len)?
            && self.payload.write_bytes(name)?
        {
            Ok(())
        } else {
            Err(Error::BufferTooSmall)
        }
    }
}
