// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Mock platform for the integration tests: a recording transport and timer,
//! and a simulated pin and clock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll, Waker};

use ir_station::config::ServerConfig;
use ir_station::io::{Clock, ConnectionId, Gpio, Timer, TimerId, Transport};
use ir_station::server::{Event, Server};

pub type TestServer = Server<MockNet, SimHw>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Records everything the server asks of the network.
#[derive(Debug, Default)]
pub struct MockNet {
    pub listening: Option<u16>,
    pub sends: Vec<(ConnectionId, Vec<u8>)>,
    pub closed: Vec<ConnectionId>,
    pub broadcasts: Vec<(u16, Vec<u8>)>,
    pub timers: HashMap<u16, u32>,
    /// Connection with a send awaiting confirmation
    pub unconfirmed: Option<ConnectionId>,
    pub fail_sends: bool,
}

impl MockNet {
    /// Everything sent on `connection`, in order.
    pub fn sent_to(&self, connection: ConnectionId) -> Vec<u8> {
        self.sends
            .iter()
            .filter(|(c, _)| *c == connection)
            .flat_map(|(_, data)| data.iter().copied())
            .collect()
    }

    pub fn beacon_timer(&self) -> Option<u32> {
        self.timers.get(&timer_key(TimerId::Beacon)).copied()
    }
}

fn timer_key(timer: TimerId) -> u16 {
    match timer {
        TimerId::Beacon => 0,
    }
}

impl Transport for MockNet {
    type Error = &'static str;

    fn listen(&mut self, port: u16) -> Result<(), Self::Error> {
        self.listening = Some(port);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.listening = None;
    }

    fn send(&mut self, connection: ConnectionId, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_sends {
            return Err("send failed");
        }
        assert!(self.unconfirmed.is_none(), "send before previous confirmed");
        self.sends.push((connection, data.to_vec()));
        self.unconfirmed = Some(connection);
        Ok(())
    }

    fn close(&mut self, connection: ConnectionId) {
        self.closed.push(connection);
        if self.unconfirmed == Some(connection) {
            self.unconfirmed = None;
        }
    }

    fn broadcast(&mut self, port: u16, data: &[u8]) -> Result<(), Self::Error> {
        self.broadcasts.push((port, data.to_vec()));
        Ok(())
    }
}

impl Timer for MockNet {
    fn arm(&mut self, timer: TimerId, delay_ms: u32) {
        self.timers.insert(timer_key(timer), delay_ms);
    }

    fn disarm(&mut self, timer: TimerId) {
        self.timers.remove(&timer_key(timer));
    }
}

/// Simulated pins and clock.
///
/// Time advances 1µs per clock read and by the requested amount per delay.
/// The input level toggles at each scheduled edge.
#[derive(Debug, Default)]
pub struct SimHw {
    pub now: u32,
    idle: bool,
    edges: Vec<u32>,
    pub high_writes: usize,
    pub last_level: Option<bool>,
    pub interrupts: bool,
    pub attached: Option<u8>,
}

impl SimHw {
    /// Schedule an incoming signal starting now, with the given pulse
    /// durations.
    pub fn schedule(&mut self, pulses: &[u32]) {
        self.idle = self.level();
        let mut at = self.now;
        self.edges = vec![at];
        for pulse in pulses {
            at += pulse;
            self.edges.push(at);
        }
    }

    /// Whether a capture is waiting for an edge
    pub fn capture_armed(&self) -> bool {
        self.interrupts && self.attached.is_some()
    }

    fn level(&self) -> bool {
        let toggles = self.edges.iter().filter(|e| **e <= self.now).count();
        self.idle ^ (toggles % 2 == 1)
    }
}

impl Gpio for SimHw {
    fn configure_output(&mut self, _pin: u8, level: bool) {
        self.last_level = Some(level);
    }

    fn configure_input(&mut self, _pin: u8) {}

    fn read(&mut self, _pin: u8) -> bool {
        self.level()
    }

    fn write(&mut self, _pin: u8, level: bool) {
        if level {
            self.high_writes += 1;
        }
        self.last_level = Some(level);
    }

    fn clear_edge(&mut self, _pin: u8) {}

    fn attach_edge_interrupt(&mut self, pin: u8) {
        self.attached = Some(pin);
    }

    fn enable_interrupts(&mut self) {
        self.interrupts = true;
    }

    fn disable_interrupts(&mut self) {
        self.interrupts = false;
    }
}

impl Clock for SimHw {
    fn now_us(&mut self) -> u32 {
        let now = self.now;
        self.now += 1;
        now
    }

    fn delay_us(&mut self, us: u32) {
        self.now += us;
    }
}

/// A started server with the default configuration and a name.
pub fn started_server() -> TestServer {
    started_server_with(ServerConfig::default())
}

pub fn started_server_with(config: ServerConfig) -> TestServer {
    init_logging();
    let mut server = Server::new(config, MockNet::default(), SimHw::default()).unwrap();
    server.set_name(b"IR-ab12").unwrap();
    server.start().unwrap();
    server
}

/// Run continuations and confirm sends until the server is waiting on
/// something else.
pub fn pump(server: &mut TestServer) {
    loop {
        while server.run_pending() {}
        match server.net_mut().unconfirmed.take() {
            Some(connection) => server.handle(Event::Sent(connection)),
            None => break,
        }
    }
}

/// Deliver `data` on `connection` in chunks of `chunk` bytes, pumping after
/// each.
pub fn deliver(server: &mut TestServer, connection: ConnectionId, data: &[u8], chunk: usize) {
    for piece in data.chunks(chunk.max(1)) {
        server.handle(Event::Receive(connection, piece));
        pump(server);
    }
}

/// Minimal executor: everything in the tests completes without waiting.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let mut cx = Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
    }
}

/// SendRequest at 38kHz carrying 900, 450, 900, 1700µs
pub const SEND_REQUEST: [u8; 17] = [
    0, 0, 14, 0, 0, 0x94, 0x70, 0, 4, 0x03, 0x84, 0x01, 0xC2, 0x03, 0x84, 0x06, 0xA4,
];

/// ConfigRequest body fields, framed.
pub fn config_request(name: &[u8], ssid: &[u8], password: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for field in [name, ssid, password] {
        body.push(field.len() as u8);
        body.extend_from_slice(field);
    }
    let mut request = vec![4];
    request.extend_from_slice(&(body.len() as u16).to_be_bytes());
    request.extend(body);
    request
}
