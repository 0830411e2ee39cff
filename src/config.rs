//! Device configuration and defaults.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::fmt::Write;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::buffer::BoundedBuffer;
use crate::protocol::{BEACON_HEAD_LENGTH, HEAD_LENGTH, pulses_body_length};
use crate::signal::{DEFAULT_PULSE_TIMEOUT, DEFAULT_SIGNAL_TIMEOUT, PulseWidth};
use crate::{Error, Result};

/// Default TCP service port
pub const DEFAULT_PORT: u16 = 1234;

/// Default UDP port the discovery beacon is broadcast to
pub const DEFAULT_BEACON_PORT: u16 = 8888;

/// Default interval between beacons
pub const DEFAULT_BEACON_INTERVAL_MS: u32 = 1000;

/// Default pulse scratch capacity, in pulses
pub const DEFAULT_PULSES_MAX: u16 = 128;

pub const DEFAULT_SEND_BUFFER_LENGTH: usize = 1024;

/// Default inbound stream capacity - one TCP segment on Ethernet MTU
pub const DEFAULT_RECEIVE_BUFFER_LENGTH: usize = 1460;

pub const DEFAULT_SEND_PIN: u8 = 0;
pub const DEFAULT_RECEIVE_PIN: u8 = 2;

/// Longest device name, in bytes
pub const NAME_LENGTH_MAX: usize = 32;

/// Prefix of generated device names
pub const NAME_PREFIX: &str = "IR-";

/// Device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP service port
    pub port: u16,
    /// Reverse multi-byte values on the wire.  `true` gives big-endian.
    pub swap_endian: bool,
    /// Storage and wire width of each pulse duration
    pub pulse_width: PulseWidth,
    /// Capacity of the pulse scratch buffer, in pulses
    pub pulses_max: u16,
    pub send_buffer_length: usize,
    pub receive_buffer_length: usize,
    pub send_pin: u8,
    pub receive_pin: u8,
    /// Maximum length of a captured signal, µs
    pub signal_timeout_us: u32,
    /// Maximum length of a captured pulse, µs
    pub pulse_timeout_us: u32,
    pub name_length_max: usize,
    pub beacon_port: u16,
    pub beacon_interval_ms: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            swap_endian: true,
            pulse_width: PulseWidth::U16,
            pulses_max: DEFAULT_PULSES_MAX,
            send_buffer_length: DEFAULT_SEND_BUFFER_LENGTH,
            receive_buffer_length: DEFAULT_RECEIVE_BUFFER_LENGTH,
            send_pin: DEFAULT_SEND_PIN,
            receive_pin: DEFAULT_RECEIVE_PIN,
            signal_timeout_us: DEFAULT_SIGNAL_TIMEOUT,
            pulse_timeout_us: DEFAULT_PULSE_TIMEOUT,
            name_length_max: NAME_LENGTH_MAX,
            beacon_port: DEFAULT_BEACON_PORT,
            beacon_interval_ms: DEFAULT_BEACON_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Size of the pulse scratch buffer in bytes
    pub fn scratch_length(&self) -> usize {
        self.pulses_max as usize * self.pulse_width.bytes()
    }

    /// Size of the beacon payload buffer in bytes
    pub fn beacon_length(&self) -> usize {
        BEACON_HEAD_LENGTH + self.name_length_max
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.send_buffer_length < HEAD_LENGTH || self.receive_buffer_length < HEAD_LENGTH {
            warn!("Stream buffers must hold at least a packet head");
            return Err(Error::InvalidConfig);
        }
        if self.pulses_max == 0 {
            warn!("Pulse scratch buffer is empty");
            return Err(Error::InvalidConfig);
        }
        if pulses_body_length(self.pulses_max as usize, self.pulse_width).is_err() {
            warn!("{} pulses will not fit a packet body", self.pulses_max);
            return Err(Error::InvalidConfig);
        }
        if self.name_length_max > u8::MAX as usize {
            warn!("Name length {} exceeds u8", self.name_length_max);
            return Err(Error::InvalidConfig);
        }
        if self.signal_timeout_us == 0 || self.pulse_timeout_us == 0 {
            warn!("Capture timeouts must be non-zero");
            return Err(Error::InvalidConfig);
        }
        if self.beacon_interval_ms == 0 {
            warn!("Beacon interval must be non-zero");
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}

/// Write a device name derived from `chip_id` into `name`, replacing its
/// contents: `IR-` followed by four hex digits.
pub fn generate_name(chip_id: u32, name: &mut BoundedBuffer) -> Result<()> {
    let suffix = ((chip_id >> 16) & 0xFFFF) ^ (chip_id & 0xFFFF);

    name.reset();
    write!(name, "{NAME_PREFIX}{suffix:04x}").map_err(|_| {
        name.reset();
        Error::BufferTooSmall
    })?;

    debug!("Generated name from chip ID {chip_id:#010x}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = ServerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.port, 1234);
        assert_eq!(config.scratch_length(), 256);
        assert_eq!(config.beacon_length(), 35);
    }

    #[test]
    fn test_validate_rejects() {
        let config = ServerConfig {
            send_buffer_length: 2,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidConfig));

        let config = ServerConfig {
            pulses_max: 40_000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidConfig));

        let config = ServerConfig {
            name_length_max: 256,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidConfig));

        let config = ServerConfig {
            pulse_timeout_us: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidConfig));
    }

    #[test]
    fn test_generate_name() {
        let mut name = BoundedBuffer::new(NAME_LENGTH_MAX);
        name.extend(b"old").unwrap();

        generate_name(0x1234_b926, &mut name).unwrap();
        assert_eq!(name.filled(), b"IR-ab12");

        generate_name(0x0000_0001, &mut name).unwrap();
        assert_eq!(name.filled(), b"IR-0001");
    }

    #[test]
    fn test_generate_name_too_small() {
        let mut name = BoundedBuffer::new(4);
        assert_eq!(generate_name(1, &mut name), Err(Error::BufferTooSmall));
        assert!(name.is_empty());
    }
}
