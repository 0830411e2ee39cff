//! Session front-end.
//!
//! The [`Server`] owns everything the device needs at runtime: the one
//! [`Worker`], the [`SignalStation`], the device name, the discovery
//! [`Beacon`], and the platform's transport and hardware handles.  There is no
//! global state.
//!
//! The platform drives it with two calls:
//! - [`Server::handle()`] for each [`Event`] as it happens
//! - [`Server::run_pending()`] when idle, to run any continuation the worker
//!   queued by yielding
//!
//! ```ignore
//! let mut server = Server::new(ServerConfig::default(), net, hw)?;
//! server.generate_name(chip_id)?;
//! server.start()?;
//! loop {
//!     while let Some(event) = platform.poll() {
//!         server.handle(event);
//!     }
//!     server.run_pending();
//! }
//! ```

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::beacon::Beacon;
use crate::buffer::BoundedBuffer;
use crate::config::{ServerConfig, generate_name};
use crate::io::{Clock, ConnectionId, Gpio, Timer, TimerId, Transport};
use crate::signal::SignalStation;
use crate::worker::{Context, Progress, Worker, WorkerState};
use crate::{Error, Result};

/// Something that happened, delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// A client connected to the service port
    Connect(ConnectionId),
    /// Bytes arrived on a connection
    Receive(ConnectionId, &'a [u8]),
    /// The last [`Transport::send()`] on a connection has been handed to the
    /// network
    Sent(ConnectionId),
    /// A connection closed or failed
    Disconnect(ConnectionId),
    /// The receive pin's edge interrupt fired.  Deliver from the interrupt
    /// handler, as the capture that follows is timing critical.
    EdgeInterrupt,
    /// A timer armed through [`Timer`] expired
    TimerExpired(TimerId),
}

/// New settings from a completed Config request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigUpdate<'a> {
    pub name: &'a [u8],
    pub ssid: &'a [u8],
    pub password: &'a [u8],
}

/// Receives configuration changes, typically to persist them and rejoin the
/// network.
pub trait ConfigListener {
    fn config_changed(&mut self, update: &ConfigUpdate<'_>);
}

/// The device's server.
pub struct Server<N: Transport + Timer, H: Gpio + Clock> {
    config: ServerConfig,
    net: N,
    hw: H,

    worker: Worker,
    station: SignalStation,
    name: BoundedBuffer,
    beacon: Beacon,
    listener: Option<Box<dyn ConfigListener>>,

    running: bool,
    continue_pending: bool,
}

impl<N: Transport + Timer, H: Gpio + Clock> Server<N, H> {
    /// Create a new server, allocating all of its buffers.
    ///
    /// Fails with [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(config: ServerConfig, net: N, hw: H) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            worker: Worker::new(&config),
            station: SignalStation::new(
                config.pulse_width,
                config.signal_timeout_us,
                config.pulse_timeout_us,
            ),
            name: BoundedBuffer::new(config.name_length_max),
            beacon: Beacon::new(
                config.beacon_port,
                config.beacon_interval_ms,
                config.name_length_max,
                config.swap_endian,
            ),
            listener: None,
            running: false,
            continue_pending: false,
            config,
            net,
            hw,
        })
    }

    /// Register to be told about configuration changes.
    pub fn set_config_listener(&mut self, listener: impl ConfigListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Set the device name, for example from stored configuration.
    pub fn set_name(&mut self, name: &[u8]) -> Result<()> {
        if name.len() > self.name.capacity() {
            return Err(Error::PayloadTooLarge);
        }
        self.name.reset();
        self.name.extend(name)?;
        self.beacon.pack(self.config.port, self.name.filled())
    }

    /// Set the device name from the chip ID, for when none is stored.
    pub fn generate_name(&mut self, chip_id: u32) -> Result<()> {
        generate_name(chip_id, &mut self.name)?;
        self.beacon.pack(self.config.port, self.name.filled())
    }

    pub fn name(&self) -> &[u8] {
        self.name.filled()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start listening for connections and broadcasting the beacon.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::Busy);
        }

        // An unnamed device still serves requests, it just isn't advertised
        let _ = self.beacon.pack(self.config.port, self.name.filled());
        self.net.listen(self.config.port).map_err(|e| {
            error!("Failed to listen on port {}: {e:?}", self.config.port);
            Error::Io
        })?;
        self.beacon.start(&mut self.net);
        self.running = true;

        info!("Server listening on port {}", self.config.port);
        Ok(())
    }

    /// Stop the server, abandoning any conversation in progress.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        if self.worker.is_attached() {
            self.with_worker(|worker, ctx| worker.stop(ctx));
        }
        self.continue_pending = false;
        self.beacon.stop(&mut self.net);
        self.net.shutdown();
        self.running = false;

        info!("Server stopped");
    }

    /// Handle an event from the platform.
    pub fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Connect(connection) => self.connect(connection),
            Event::Receive(connection, data) => {
                if self.is_current(connection) {
                    let progress = self.with_worker(|worker, ctx| worker.receive(ctx, data));
                    self.progress(progress);
                }
            }
            Event::Sent(connection) => {
                if self.is_current(connection) {
                    let progress = self.with_worker(|worker, ctx| worker.sent(ctx));
                    self.progress(progress);
                }
            }
            Event::Disconnect(connection) => {
                if self.is_current(connection) {
                    self.with_worker(|worker, ctx| worker.disconnect(ctx));
                    self.continue_pending = false;
                }
            }
            Event::EdgeInterrupt => {
                let progress = self.with_worker(|worker, ctx| worker.edge_interrupt(ctx));
                self.progress(progress);
            }
            Event::TimerExpired(TimerId::Beacon) => self.beacon.tick(&mut self.net),
        }
    }

    /// Run the worker's queued continuation, if any.  Returns whether one ran.
    pub fn run_pending(&mut self) -> bool {
        if !self.continue_pending {
            return false;
        }

        self.continue_pending = false;
        let progress = self.with_worker(|worker, ctx| worker.run(ctx));
        self.progress(progress);
        true
    }

    pub fn has_pending(&self) -> bool {
        self.continue_pending
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// The current beacon payload
    pub fn beacon_payload(&self) -> &[u8] {
        self.beacon.payload()
    }

    pub fn net(&self) -> &N {
        &self.net
    }

    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }

    pub fn hw(&self) -> &H {
        &self.hw
    }

    pub fn hw_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

// Internal functions
impl<N: Transport + Timer, H: Gpio + Clock> Server<N, H> {
    fn connect(&mut self, connection: ConnectionId) {
        if !self.running {
            warn!("Refusing connection {}: not running", connection.0);
            self.net.close(connection);
            return;
        }

        if let Err(e) = self.worker.attach(connection) {
            warn!("Refusing connection {}: {e:?}", connection.0);
            self.net.close(connection);
            return;
        }

        debug!("Accepted connection {}", connection.0);
    }

    fn is_current(&self, connection: ConnectionId) -> bool {
        if self.worker.connection() == Some(connection) {
            true
        } else {
            trace!("Ignoring event for connection {}", connection.0);
            false
        }
    }

    fn progress(&mut self, progress: Progress) {
        match progress {
            Progress::Yield => self.continue_pending = true,
            Progress::Done => self.continue_pending = false,
            Progress::Blocked => (),
        }
    }

    fn with_worker<R>(&mut self, f: impl FnOnce(&mut Worker, &mut Context<'_, N, H>) -> R) -> R {
        let mut ctx = Context {
            net: &mut self.net,
            hw: &mut self.hw,
            station: &mut self.station,
            name: &mut self.name,
            beacon: &mut self.beacon,
            listener: &mut self.listener,
            service_port: self.config.port,
            send_pin: self.config.send_pin,
            receive_pin: self.config.receive_pin,
        };
        f(&mut self.worker, &mut ctx)
    }
}
