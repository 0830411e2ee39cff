//! The request/process/response state machine.
//!
//! A [`Worker`] handles one client conversation at a time:
//!
//! ```text
//! Ready -> Request -> Process -> Response -> Finish -> (reset to Ready)
//! ```
//!
//! Each state is re-entrant.  Whenever something happens (bytes arrive, a
//! send is confirmed, a capture completes, a continuation runs) the worker
//! runs from its current state until it completes the conversation or has to
//! wait for another event.
//!
//! - Request decodes the packet head, then the type-specific body, from the
//!   inbound stream.  The body must end exactly at its declared length.
//! - Process transmits a Send request's pulses, or arms a capture for a
//!   Receive request and waits for it to complete.
//! - Response encodes the response into the bounded outbound stream, sending
//!   and waiting for confirmation each time it fills.
//! - Finish applies a Config request, then resets the worker, closing the
//!   connection.  One request is served per connection.
//!
//! Any protocol or capacity violation, or transport error, stops the worker:
//! the connection is closed and no response is sent.
//!
//! Once a request is decoded the worker yields rather than going straight on
//! to Process, and the server runs it again from its continuation queue.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;
use core::ops::Range;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::beacon::Beacon;
use crate::buffer::BoundedBuffer;
use crate::config::ServerConfig;
use crate::io::{Clock, ConnectionId, Gpio, Timer, Transport};
use crate::protocol::{PacketType, pulses_body_length};
use crate::server::{ConfigListener, ConfigUpdate};
use crate::signal::{CaptureReport, PulseWidth, SignalStation};
use crate::stream::Stream;
use crate::{Error, Result};

/// Worker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Ready,
    Request,
    Process,
    Response,
    Finish,
}

/// What the worker needs next, returned by each entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Waiting for an event: data, send confirmation or capture.
    Blocked,
    /// Wants to be run again from the continuation queue.
    Yield,
    /// The conversation is over and the worker is back in Ready.
    Done,
}

/// Everything outside the worker it uses while running, lent by the server
/// for one step.
pub struct Context<'a, N, H> {
    pub net: &'a mut N,
    pub hw: &'a mut H,
    pub station: &'a mut SignalStation,
    /// Device name slot
    pub name: &'a mut BoundedBuffer,
    pub beacon: &'a mut Beacon,
    pub listener: &'a mut Option<Box<dyn ConfigListener>>,
    /// TCP service port, advertised by the beacon
    pub service_port: u16,
    pub send_pin: u8,
    pub receive_pin: u8,
}

/// Handles one client conversation at a time.
pub struct Worker {
    state: WorkerState,
    connection: Option<ConnectionId>,

    inbound: Stream,
    outbound: Stream,
    // Pulses for Send and Receive, strings for Config
    scratch: BoundedBuffer,

    pulse_width: PulseWidth,
    name_length_max: usize,

    head: RequestHead,
    exchange: Option<Exchange>,
    response: ResponseStep,
    awaiting_sent: bool,
    aborted: bool,
}

impl Worker {
    /// Create a new worker, allocating its streams and scratch buffer.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            state: WorkerState::Ready,
            connection: None,
            inbound: Stream::reader(config.receive_buffer_length, config.swap_endian),
            outbound: Stream::writer(config.send_buffer_length, config.swap_endian),
            scratch: BoundedBuffer::new(config.scratch_length()),
            pulse_width: config.pulse_width,
            name_length_max: config.name_length_max,
            head: RequestHead::default(),
            exchange: None,
            response: ResponseStep::Type,
            awaiting_sent: false,
            aborted: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// The connection being served, if any
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn is_attached(&self) -> bool {
        self.connection.is_some()
    }

    /// Start a conversation on `connection`.
    ///
    /// Fails with [`Error::Busy`] if a conversation is already in progress.
    pub fn attach(&mut self, connection: ConnectionId) -> Result<()> {
        if self.connection.is_some() || self.state != WorkerState::Ready {
            return Err(Error::Busy);
        }

        debug!("Attached to connection {}", connection.0);
        self.connection = Some(connection);
        self.set_state(WorkerState::Request);
        Ok(())
    }

    /// Bytes received on the attached connection.
    pub fn receive<N, H>(&mut self, ctx: &mut Context<'_, N, H>, data: &[u8]) -> Progress
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        if self.state != WorkerState::Request {
            trace!("Dropping {} bytes received in {:?}", data.len(), self.state);
            return Progress::Blocked;
        }

        if let Err(e) = self.inbound.feed(data) {
            warn!("Request overflows receive buffer: {e:?}");
            self.stop(ctx);
            return Progress::Done;
        }

        self.run(ctx)
    }

    /// The transport confirmed the last send.
    pub fn sent<N, H>(&mut self, ctx: &mut Context<'_, N, H>) -> Progress
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        if !self.awaiting_sent {
            trace!("Unexpected send confirmation");
            return Progress::Blocked;
        }

        self.awaiting_sent = false;
        self.run(ctx)
    }

    /// The attached connection went away.  Abandons the conversation.
    pub fn disconnect<N, H>(&mut self, ctx: &mut Context<'_, N, H>)
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        if let Some(connection) = self.connection.take() {
            debug!("Connection {} closed in {:?}", connection.0, self.state);
        }
        self.stop(ctx);
    }

    /// The receive pin's edge interrupt fired.  Runs the capture if one is
    /// armed.
    pub fn edge_interrupt<N, H>(&mut self, ctx: &mut Context<'_, N, H>) -> Progress
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        let Some(report) = ctx.station.capture(ctx.hw, &mut self.scratch) else {
            return Progress::Blocked;
        };

        match &mut self.exchange {
            Some(Exchange::Receive(receive)) if self.state == WorkerState::Process => {
                receive.report = Some(report);
                Progress::Yield
            }
            _ => {
                warn!("Capture completed with no Receive request in progress");
                Progress::Blocked
            }
        }
    }

    /// Run from the current state until blocked, yielding, or done.
    pub fn run<N, H>(&mut self, ctx: &mut Context<'_, N, H>) -> Progress
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        match self.step(ctx) {
            Ok(progress) => progress,
            Err(e) => {
                warn!("Stopping worker in {:?}: {e:?}", self.state);
                self.stop(ctx);
                Progress::Done
            }
        }
    }

    /// Abandon the conversation, closing the connection and sending nothing
    /// further.
    pub fn stop<N, H>(&mut self, ctx: &mut Context<'_, N, H>)
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        self.aborted = true;
        self.set_state(WorkerState::Finish);
        self.finish(ctx);
    }
}

// Internal functions
impl Worker {
    fn set_state(&mut self, state: WorkerState) {
        if self.state != state {
            debug!("Worker {:?} -> {state:?}", self.state);
            self.state = state;
        }
    }

    fn step<N, H>(&mut self, ctx: &mut Context<'_, N, H>) -> Result<Progress>
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        loop {
            match self.state {
                WorkerState::Ready => {
                    if self.connection.is_none() {
                        return Ok(Progress::Blocked);
                    }
                    self.set_state(WorkerState::Request);
                }
                WorkerState::Request => {
                    if !self.request()? {
                        return Ok(Progress::Blocked);
                    }
                    self.set_state(WorkerState::Process);
                    return Ok(Progress::Yield);
                }
                WorkerState::Process => {
                    if !self.process(ctx)? {
                        return Ok(Progress::Blocked);
                    }
                    self.set_state(WorkerState::Response);
                }
                WorkerState::Response => {
                    if !self.respond(ctx)? {
                        return Ok(Progress::Blocked);
                    }
                    self.set_state(WorkerState::Finish);
                }
                WorkerState::Finish => {
                    self.finish(ctx);
                    return Ok(Progress::Done);
                }
            }
        }
    }

    fn request(&mut self) -> Result<bool> {
        loop {
            match self.head.step {
                HeadStep::Type => {
                    let Some(code) = self.inbound.read_u8()? else {
                        return Ok(false);
                    };
                    let kind = PacketType::try_from(code)?;
                    let exchange = Exchange::for_request(kind).ok_or(Error::UnknownType(code))?;
                    debug!("Request {kind:?}");
                    self.exchange = Some(exchange);
                    self.head.step = HeadStep::Length;
                }
                HeadStep::Length => {
                    let Some(length) = self.inbound.read_u16()? else {
                        return Ok(false);
                    };
                    debug!("Request body length {length}");
                    self.head.length = length as usize;
                    self.head.step = HeadStep::Body;
                }
                HeadStep::Body => {
                    let exchange = self.exchange.as_mut().ok_or(Error::InvalidOperation)?;

                    let before = self.inbound.pending();
                    let done = exchange.decode(
                        &mut self.inbound,
                        &mut self.scratch,
                        self.pulse_width,
                        self.name_length_max,
                    )?;
                    self.head.read += before - self.inbound.pending();

                    let read = self.head.read;
                    if read > self.head.length || done != (read == self.head.length) {
                        warn!(
                            "Request body decoded {read} bytes, declared {}",
                            self.head.length
                        );
                        return Err(Error::LengthMismatch);
                    }
                    return Ok(done);
                }
            }
        }
    }

    fn process<N, H>(&mut self, ctx: &mut Context<'_, N, H>) -> Result<bool>
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        match self.exchange.as_mut().ok_or(Error::InvalidOperation)? {
            Exchange::Send(send) => {
                let count = ctx.station.transmit(
                    ctx.hw,
                    ctx.send_pin,
                    send.frequency,
                    self.scratch.filled(),
                );
                debug!("Transmitted {count} pulses");
                Ok(true)
            }
            Exchange::Receive(receive) => {
                if receive.report.is_some() {
                    return Ok(true);
                }
                if !ctx.station.is_armed() {
                    self.scratch.reset();
                    ctx.station.arm_capture(ctx.hw, ctx.receive_pin);
                }
                Ok(false)
            }
            Exchange::Config(_) => Ok(true),
        }
    }

    fn respond<N, H>(&mut self, ctx: &mut Context<'_, N, H>) -> Result<bool>
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        if self.awaiting_sent {
            return Ok(false);
        }

        let encoded = self.encode_response()?;

        if !self.outbound.data().is_empty() {
            let connection = self.connection.ok_or(Error::Disconnected)?;
            ctx.net
                .send(connection, self.outbound.data())
                .map_err(|e| {
                    warn!("Send failed: {e:?}");
                    Error::Io
                })?;
            trace!("Sent {} response bytes", self.outbound.data().len());

            self.outbound.drain();
            self.awaiting_sent = true;
            return Ok(false);
        }

        if encoded {
            Ok(true)
        } else {
            // Nothing fitted in an empty buffer
            Err(Error::BufferTooSmall)
        }
    }

    fn encode_response(&mut self) -> Result<bool> {
        let exchange = self.exchange.as_mut().ok_or(Error::InvalidOperation)?;
        let kind = exchange.kind().response().ok_or(Error::InvalidOperation)?;

        loop {
            match self.response {
                ResponseStep::Type => {
                    if !self.outbound.write_u8(kind as u8)? {
                        return Ok(false);
                    }
                    self.response = ResponseStep::Length;
                }
                ResponseStep::Length => {
                    let length = exchange.response_length(self.pulse_width)?;
                    if !self.outbound.write_u16(length)? {
                        return Ok(false);
                    }
                    self.response = ResponseStep::Body;
                }
                ResponseStep::Body => {
                    if !exchange.encode(&mut self.outbound, &self.scratch, self.pulse_width)? {
                        return Ok(false);
                    }
                    self.response = ResponseStep::Done;
                }
                ResponseStep::Done => return Ok(true),
            }
        }
    }

    fn finish<N, H>(&mut self, ctx: &mut Context<'_, N, H>)
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        if let (false, Some(Exchange::Config(config))) = (self.aborted, &self.exchange) {
            let strings = self.scratch.filled();

            ctx.name.reset();
            if ctx.name.extend(&strings[config.name.clone()]).is_err() {
                warn!("Name does not fit the name slot");
            }
            let _ = ctx.beacon.pack(ctx.service_port, ctx.name.filled());

            if let Some(listener) = ctx.listener.as_mut() {
                listener.config_changed(&ConfigUpdate {
                    name: ctx.name.filled(),
                    ssid: &strings[config.ssid.clone()],
                    password: &strings[config.password.clone()],
                });
            }
            info!("Configuration updated");
        }

        self.reset(ctx);
    }

    fn reset<N, H>(&mut self, ctx: &mut Context<'_, N, H>)
    where
        N: Transport + Timer,
        H: Gpio + Clock,
    {
        if let Some(connection) = self.connection.take() {
            ctx.net.close(connection);
        }
        ctx.station.reset(ctx.hw);

        self.inbound.reset();
        self.outbound.reset();
        self.scratch.reset();
        self.head = RequestHead::default();
        self.exchange = None;
        self.response = ResponseStep::Type;
        self.awaiting_sent = false;
        self.aborted = false;
        self.set_state(WorkerState::Ready);
    }
}

#[derive(Debug, Default)]
struct RequestHead {
    step: HeadStep,
    // Declared body length
    length: usize,
    // Body bytes consumed so far
    read: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum HeadStep {
    #[default]
    Type,
    Length,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseStep {
    Type,
    Length,
    Body,
    Done,
}

/// Per-request state, carried from Request through to Finish.
#[derive(Debug)]
enum Exchange {
    Send(SendExchange),
    Receive(ReceiveExchange),
    Config(ConfigExchange),
}

impl Exchange {
    fn for_request(kind: PacketType) -> Option<Self> {
        match kind {
            PacketType::SendRequest => Some(Exchange::Send(SendExchange::default())),
            PacketType::ReceiveRequest => Some(Exchange::Receive(ReceiveExchange::default())),
            PacketType::ConfigRequest => Some(Exchange::Config(ConfigExchange::default())),
            _ => None,
        }
    }

    fn kind(&self) -> PacketType {
        match self {
            Exchange::Send(_) => PacketType::SendRequest,
            Exchange::Receive(_) => PacketType::ReceiveRequest,
            Exchange::Config(_) => PacketType::ConfigRequest,
        }
    }

    fn decode(
        &mut self,
        inbound: &mut Stream,
        scratch: &mut BoundedBuffer,
        width: PulseWidth,
        name_length_max: usize,
    ) -> Result<bool> {
        match self {
            Exchange::Send(send) => send.decode(inbound, scratch, width),
            Exchange::Receive(_) => Ok(true),
            Exchange::Config(config) => config.decode(inbound, scratch, name_length_max),
        }
    }

    fn response_length(&self, width: PulseWidth) -> Result<u16> {
        match self {
            Exchange::Receive(receive) => {
                let report = receive.report.ok_or(Error::NoData)?;
                pulses_body_length(report.count as usize, width)
            }
            _ => Ok(0),
        }
    }

    fn encode(
        &mut self,
        outbound: &mut Stream,
        scratch: &BoundedBuffer,
        width: PulseWidth,
    ) -> Result<bool> {
        match self {
            Exchange::Receive(receive) => receive.encode(outbound, scratch, width),
            _ => Ok(true),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum SendStep {
    #[default]
    Frequency,
    Count,
    Pulses,
}

#[derive(Debug, Default)]
struct SendExchange {
    step: SendStep,
    frequency: u32,
    count: u16,
    read: u16,
}

impl SendExchange {
    fn decode(
        &mut self,
        inbound: &mut Stream,
        scratch: &mut BoundedBuffer,
        width: PulseWidth,
    ) -> Result<bool> {
        loop {
            match self.step {
                SendStep::Frequency => {
                    let Some(frequency) = inbound.read_u32()? else {
                        return Ok(false);
                    };
                    self.frequency = frequency;
                    self.step = SendStep::Count;
                }
                SendStep::Count => {
                    let Some(count) = inbound.read_u16()? else {
                        return Ok(false);
                    };
                    let capacity = scratch.capacity() / width.bytes();
                    if count as usize > capacity {
                        warn!("Send request of {count} pulses, room for {capacity}");
                        return Err(Error::PayloadTooLarge);
                    }
                    debug!("Send {count} pulses at {}Hz", self.frequency);
                    self.count = count;
                    self.step = SendStep::Pulses;
                }
                SendStep::Pulses => {
                    let width = width.bytes();
                    while self.read < self.count {
                        if !inbound.read_fixed(&mut scratch.spare_mut()[..width])? {
                            return Ok(false);
                        }
                        scratch.skip(width);
                        self.read += 1;
                    }
                    return Ok(true);
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ReceiveStep {
    #[default]
    Frequency,
    Count,
    Pulses,
}

#[derive(Debug, Default)]
struct ReceiveExchange {
    report: Option<CaptureReport>,
    step: ReceiveStep,
    written: u16,
}

impl ReceiveExchange {
    fn encode(
        &mut self,
        outbound: &mut Stream,
        scratch: &BoundedBuffer,
        width: PulseWidth,
    ) -> Result<bool> {
        let count = self.report.ok_or(Error::NoData)?.count;

        loop {
            match self.step {
                ReceiveStep::Frequency => {
                    // Not measured
                    if !outbound.write_u32(0)? {
                        return Ok(false);
                    }
                    self.step = ReceiveStep::Count;
                }
                ReceiveStep::Count => {
                    if !outbound.write_u16(count)? {
                        return Ok(false);
                    }
                    self.step = ReceiveStep::Pulses;
                }
                ReceiveStep::Pulses => {
                    let width = width.bytes();
                    while self.written < count {
                        let offset = self.written as usize * width;
                        let pulse = &scratch.filled()[offset..offset + width];
                        if !outbound.write_fixed(pulse)? {
                            return Ok(false);
                        }
                        self.written += 1;
                    }
                    return Ok(true);
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ConfigStep {
    #[default]
    NameLength,
    Name,
    SsidLength,
    Ssid,
    PasswordLength,
    Password,
}

/// Config strings are staged in the scratch buffer, and applied at Finish.
#[derive(Debug, Default)]
struct ConfigExchange {
    step: ConfigStep,
    length: usize,
    name: Range<usize>,
    ssid: Range<usize>,
    password: Range<usize>,
}

impl ConfigExchange {
    fn decode(
        &mut self,
        inbound: &mut Stream,
        scratch: &mut BoundedBuffer,
        name_length_max: usize,
    ) -> Result<bool> {
        loop {
            match self.step {
                ConfigStep::NameLength => {
                    let Some(length) = inbound.read_u8()? else {
                        return Ok(false);
                    };
                    if length as usize > name_length_max {
                        warn!("Name length {length} exceeds {name_length_max}");
                        return Err(Error::PayloadTooLarge);
                    }
                    self.length = Self::check_space(length, scratch)?;
                    self.step = ConfigStep::Name;
                }
                ConfigStep::Name => {
                    let Some(range) = Self::read_string(inbound, scratch, self.length)? else {
                        return Ok(false);
                    };
                    self.name = range;
                    self.step = ConfigStep::SsidLength;
                }
                ConfigStep::SsidLength => {
                    let Some(length) = inbound.read_u8()? else {
                        return Ok(false);
                    };
                    self.length = Self::check_space(length, scratch)?;
                    self.step = ConfigStep::Ssid;
                }
                ConfigStep::Ssid => {
                    let Some(range) = Self::read_string(inbound, scratch, self.length)? else {
                        return Ok(false);
                    };
                    self.ssid = range;
                    self.step = ConfigStep::PasswordLength;
                }
                ConfigStep::PasswordLength => {
                    let Some(length) = inbound.read_u8()? else {
                        return Ok(false);
                    };
                    self.length = Self::check_space(length, scratch)?;
                    self.step = ConfigStep::Password;
                }
                ConfigStep::Password => {
                    let Some(range) = Self::read_string(inbound, scratch, self.length)? else {
                        return Ok(false);
                    };
                    self.password = range;
                    debug!(
                        "Config name {} bytes, ssid {} bytes",
                        self.name.len(),
                        self.ssid.len()
                    );
                    return Ok(true);
                }
            }
        }
    }

    fn check_space(length: u8, scratch: &BoundedBuffer) -> Result<usize> {
        let length = length as usize;
        if length > scratch.left() {
            warn!("Config string of {length} bytes, {} left", scratch.left());
            return Err(Error::PayloadTooLarge);
        }
        Ok(length)
    }

    fn read_string(
        inbound: &mut Stream,
        scratch: &mut BoundedBuffer,
        length: usize,
    ) -> Result<Option<Range<usize>>> {
        let start = scratch.size();
        if !inbound.read_bytes(&mut scratch.spare_mut()[..length])? {
            return Ok(None);
        }
        scratch.skip(length);
        Ok(Some(start..start + length))
    }
}
