//! Network-controlled infrared transceiver for microcontrollers with a single
//! digital I/O pin.
//!
//! The device records and replays infrared remote-control signals, expressed as
//! sequences of mark/space pulse durations, over a small binary TCP protocol.  It
//! advertises itself with a periodic UDP beacon so clients can discover it.
//!
//! `no_std`.  Requires `alloc`: every buffer is allocated once, when the
//! [`server::Server`] is created, and never grows afterwards.
//!
//! ## Architecture
//!
//! There is a single thread of control.  The platform (an SDK event loop, an
//! executor, or a test harness) feeds [`server::Event`]s into
//! [`server::Server::handle()`] as they happen:
//! - socket connect, receive, sent-confirmation and disconnect
//! - the receive pin's edge interrupt
//! - expiry of the beacon timer
//!
//! and calls [`server::Server::run_pending()`] whenever it is idle, to let the
//! worker continue after it yielded.
//!
//! The server owns exactly one [`worker::Worker`], which handles one client
//! conversation at a time:
//!
//! ```text
//! Ready -> Request -> Process -> Response -> Finish -> (reset to Ready)
//! ```
//!
//! Each step is re-entrant.  TCP delivers arbitrary fragments, so requests are
//! decoded with a resumable [`stream::Stream`], which picks up every field exactly
//! where the previous fragment left off.  Responses are encoded the same way into
//! a bounded send buffer, and sent in as many chunks as required, waiting for the
//! transport's sent-confirmation between chunks.
//!
//! The [`signal::SignalStation`] performs the timing-critical work on the pin:
//! - transmit: bit-bangs a carrier-modulated square wave for each mark and holds
//!   the pin low for each space.  Blocking.
//! - capture: armed by the worker, runs to completion inside the edge interrupt
//!   and hands a [`signal::CaptureReport`] back to the worker.
//!
//! ## Wire protocol
//!
//! Requests and responses share one framing: `type:u8, length:u16, body`.
//! Multi-byte values are big-endian by default (see
//! [`config::ServerConfig::swap_endian`]).  See [`protocol`] for the type codes
//! and body layouts.
//!
//! ## Modules
//!
//! - [`buffer`] - Fixed capacity byte buffer with append and consume cursors
//! - [`stream`] - Resumable field codec, plus async framing for hosts
//! - [`protocol`] - Packet types and body layouts
//! - [`signal`] - Transmit and capture of pulse sequences on a GPIO pin
//! - [`worker`] - The request/process/response state machine
//! - [`beacon`] - Discovery beacon payload and retrigger cycle
//! - [`server`] - Session front-end owning the worker, station and beacon
//! - [`config`] - Device configuration and defaults
//! - [`io`] - Traits the platform implements: transport, timer, GPIO, clock
//! - [`client`] - Async client for controlling a device from a host
//!
//! ## Features
//!
//! Default features:
//! - `async` - Enable the async host client and framing traits.
//!
//! Compile with `--no-default-features` for the device firmware.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod beacon;
pub mod buffer;
pub mod client;
pub mod config;
pub mod io;
pub mod protocol;
pub mod server;
pub mod signal;
pub mod stream;
pub mod worker;

/// Errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// No data available
    NoData,
    /// An operation is already in flight
    Busy,
    /// Invalid operation, such as reading from a Writer stream
    InvalidOperation,
    /// Primitive wider than supported
    InvalidWidth,
    /// Unknown packet type code
    UnknownType(u8),
    /// Declared and actual body length disagree
    LengthMismatch,
    /// Payload too large for buffer
    PayloadTooLarge,
    /// Buffer too small for operation
    BufferTooSmall,
    /// Configuration rejected
    InvalidConfig,
    /// Response type does not match the request
    UnexpectedResponse,
    /// Peer closed the connection
    Disconnected,
    /// I/O error
    Io,
}

/// Type to represent the result of an operation
pub type Result<T> = core::result::Result<T, Error>;
