//! Wire protocol definitions.
//!
//! Every request and response is framed as:
//!
//! ```text
//! type:u8  length:u16  body[length]
//! ```
//!
//! with response codes paired 1:1 with request codes.  Bodies:
//!
//! | Type | Body |
//! |------|------|
//! | SendRequest (0) | `carrier_frequency:u32, pulse_count:u16, pulses:uW[pulse_count]` |
//! | SendResponse (1) | empty |
//! | ReceiveRequest (2) | empty |
//! | ReceiveResponse (3) | `carrier_frequency:u32, count:u16, pulses:uW[count]` |
//! | ConfigRequest (4) | `name_len:u8, name, ssid_len:u8, ssid, password_len:u8, password` |
//! | ConfigResponse (5) | empty |
//!
//! `W` is the configured pulse width, 2 bytes by default.  The ReceiveResponse
//! carrier frequency is reserved: the device does not measure it, and always
//! sends 0.
//!
//! The discovery beacon payload is `service_port:u16, name_len:u8, name`.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use crate::signal::PulseWidth;
use crate::{Error, Result};

/// Protocol version implemented by this crate
pub const PROTOCOL_VERSION: u8 = 1;

/// Length of the `type` and `length` fields preceding every body
pub const HEAD_LENGTH: usize = 3;

/// Length of the fixed part of a Send request or Receive response body
pub const PULSES_HEAD_LENGTH: usize = 6;

/// Length of the fixed part of the beacon payload
pub const BEACON_HEAD_LENGTH: usize = 3;

/// Packet type codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SendRequest = 0,
    SendResponse = 1,
    ReceiveRequest = 2,
    ReceiveResponse = 3,
    ConfigRequest = 4,
    ConfigResponse = 5,
}

impl PacketType {
    /// The response type paired with a request type.  `None` for response types.
    pub fn response(self) -> Option<PacketType> {
        match self {
            PacketType::SendRequest => Some(PacketType::SendResponse),
            PacketType::ReceiveRequest => Some(PacketType::ReceiveResponse),
            PacketType::ConfigRequest => Some(PacketType::ConfigResponse),
            _ => None,
        }
    }

    pub fn is_request(self) -> bool {
        (self as u8) % 2 == 0
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::SendRequest),
            1 => Ok(PacketType::SendResponse),
            2 => Ok(PacketType::ReceiveRequest),
            3 => Ok(PacketType::ReceiveResponse),
            4 => Ok(PacketType::ConfigRequest),
            5 => Ok(PacketType::ConfigResponse),
            other => Err(Error::UnknownType(other)),
        }
    }
}

/// Body length of a Send request or Receive response carrying `count` pulses.
pub fn pulses_body_length(count: usize, width: PulseWidth) -> Result<u16> {
    let length = PULSES_HEAD_LENGTH + count * width.bytes();
    u16::try_from(length).map_err(|_| Error::PayloadTooLarge)
}

/// Body length of a Config request.
pub fn config_body_length(name: &[u8], ssid: &[u8], password: &[u8]) -> Result<u16> {
    let mut length = 0;
    for field in [name, ssid, password] {
        if field.len() > u8::MAX as usize {
            return Err(Error::PayloadTooLarge);
        }
        length += 1 + field.len();
    }
    u16::try_from(length).map_err(|_| Error::PayloadTooLarge)
}
