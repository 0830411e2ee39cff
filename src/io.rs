//! Traits the platform implements for the device and the host.
//!
//! The crate never touches hardware or sockets directly.  On the device the
//! platform supplies:
//! - [`Transport`] - the TCP service socket and UDP broadcast
//! - [`Timer`] - one-shot millisecond timers
//! - [`Gpio`] - pin direction, level and edge interrupt control
//! - [`Clock`] - a microsecond timestamp and busy-wait delay
//!
//! Events flowing the other way (data received, send confirmed, edge interrupt
//! fired, timer expired) are delivered by the platform calling
//! [`crate::server::Server::handle()`].
//!
//! On a host, the [`crate::client`] needs [`Reader`] and [`Writer`]
//! implementations, typically wrapping a TCP stream from whichever async
//! runtime the application uses.
//!
//! # Pins
//!
//! Pins are identified by their SDK number.  The implementation is responsible
//! for mapping this to whatever register or peripheral handle it needs.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Identifies one accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(pub u32);

/// Identifies a timer armed through [`Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    /// Retriggers the discovery beacon
    Beacon,
}

/// Network transport trait.
pub trait Transport {
    /// The error type returned by transport operations.
    ///
    /// This allows implementations to use their own error types (e.g. SDK
    /// error codes, `std::io::Error` in a simulator).
    type Error: core::fmt::Debug;

    /// Start accepting TCP connections on `port`.
    fn listen(&mut self, port: u16) -> Result<(), Self::Error>;

    /// Stop accepting connections.
    fn shutdown(&mut self);

    /// Queue `data` for sending on `connection`.
    ///
    /// The transport must take a copy of `data` before returning, and must later
    /// deliver a [`crate::server::Event::Sent`] for the connection once the data
    /// has been handed to the network.  No further send is issued on the
    /// connection until then.
    fn send(&mut self, connection: ConnectionId, data: &[u8]) -> Result<(), Self::Error>;

    /// Close `connection`.  No further events should be delivered for it.
    fn close(&mut self, connection: ConnectionId);

    /// Broadcast a UDP datagram to `port`.
    fn broadcast(&mut self, port: u16, data: &[u8]) -> Result<(), Self::Error>;
}

/// One-shot timer trait.
///
/// When an armed timer expires the platform delivers
/// [`crate::server::Event::TimerExpired`].
pub trait Timer {
    /// Arm `timer` to expire once after `delay_ms`, replacing any previous
    /// arming.
    fn arm(&mut self, timer: TimerId, delay_ms: u32);

    /// Cancel `timer` if armed.
    fn disarm(&mut self, timer: TimerId);
}

/// GPIO trait.
///
/// The edge interrupt is a single source: once the handler runs, the signal
/// station disables interrupts and they stay disabled until the next capture
/// is armed.
pub trait Gpio {
    /// Configure `pin` as an output, driving `level`.
    fn configure_output(&mut self, pin: u8, level: bool);

    /// Configure `pin` as an input.
    fn configure_input(&mut self, pin: u8);

    /// Read the logic level of `pin`.
    fn read(&mut self, pin: u8) -> bool;

    /// Drive `pin` to `level`.  This is in the transmit loop so must be fast.
    fn write(&mut self, pin: u8, level: bool);

    /// Clear any latched edge status for `pin`.
    fn clear_edge(&mut self, pin: u8);

    /// Route any-edge interrupts for `pin` to
    /// [`crate::server::Event::EdgeInterrupt`].
    fn attach_edge_interrupt(&mut self, pin: u8);

    /// Enable GPIO interrupts.
    fn enable_interrupts(&mut self);

    /// Disable GPIO interrupts.
    fn disable_interrupts(&mut self);
}

/// Microsecond clock trait.
pub trait Clock {
    /// Microseconds since an arbitrary epoch.  Expected to wrap.
    fn now_us(&mut self) -> u32;

    /// Busy-wait for `us` microseconds.
    fn delay_us(&mut self, us: u32);
}

/// Reader trait, for a host's connection to the device.
pub trait Reader {
    /// The error type returned by read operations.
    type Error: core::fmt::Debug;

    /// Read available bytes into `buf`, returning how many were read.  0 means
    /// the connection was closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying connection fails.
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> impl core::future::Future<Output = Result<usize, Self::Error>>;
}

/// Writer trait, for a host's connection to the device.
pub trait Writer {
    /// The error type returned by write operations.
    type Error: core::fmt::Debug;

    /// Write some of `data`, returning how many bytes were accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying connection fails.
    fn write(
        &mut self,
        data: &[u8],
    ) -> impl core::future::Future<Output = Result<usize, Self::Error>>;
}
