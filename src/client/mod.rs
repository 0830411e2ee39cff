//! Client for controlling a device from a host.
//!
//! Each request is sent on a fresh connection to the device's service port,
//! and the device closes the connection after responding.
//!
//! See [`AsyncIrClient`] for async client usage.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[cfg(feature = "async")]
pub mod futures;

#[cfg(feature = "async")]
pub use futures::{AsyncIrClient, Capture};

use crate::signal::PulseWidth;

/// Configuration for creating a Client.  Must match the device's
/// [`crate::config::ServerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Reverse multi-byte values on the wire.  `true` gives big-endian.
    pub swap_endian: bool,
    /// Wire width of each pulse duration
    pub pulse_width: PulseWidth,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            swap_endian: true,
            pulse_width: PulseWidth::U16,
        }
    }
}
