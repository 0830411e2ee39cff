//! Infrared signal transmit and capture on a single GPIO pin.
//!
//! A signal is a sequence of pulse durations in microseconds, alternating mark
//! (carrier active) and space (idle), starting with a mark.  Durations are
//! stored little-endian in a byte buffer at a fixed [`PulseWidth`].
//!
//! Both directions are timing critical and run as blocking, non-preemptible
//! loops:
//! - [`SignalStation::transmit()`] bit-bangs the carrier on the send pin for
//!   the whole signal before returning.
//! - [`SignalStation::arm_capture()`] installs an any-edge interrupt on the
//!   receive pin and returns immediately.  When the first edge fires, the
//!   platform calls [`SignalStation::capture()`] from its interrupt handler,
//!   which samples the pin until the signal ends, then hands back a
//!   [`CaptureReport`].
//!
//! The station never owns the pulse buffer - it is loaned for each operation.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::buffer::BoundedBuffer;
use crate::io::{Clock, Gpio};
use crate::{Error, Result};

/// Default limit on the length of a whole captured signal, in microseconds
pub const DEFAULT_SIGNAL_TIMEOUT: u32 = 100_000;

/// Default limit on a single captured pulse, in microseconds.  A longer gap
/// ends the signal.
pub const DEFAULT_PULSE_TIMEOUT: u32 = 10_000;

/// Storage width of each pulse duration
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PulseWidth {
    U8 = 1,
    #[default]
    U16 = 2,
    U32 = 4,
}

impl PulseWidth {
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Largest representable duration
    pub const fn max(self) -> u32 {
        match self {
            PulseWidth::U8 => u8::MAX as u32,
            PulseWidth::U16 => u16::MAX as u32,
            PulseWidth::U32 => u32::MAX,
        }
    }

    /// Decode one little-endian duration from the first `bytes()` of `src`.
    pub fn decode(self, src: &[u8]) -> u32 {
        match self {
            PulseWidth::U8 => src[0] as u32,
            PulseWidth::U16 => u16::from_le_bytes([src[0], src[1]]) as u32,
            PulseWidth::U32 => u32::from_le_bytes([src[0], src[1], src[2], src[3]]),
        }
    }

    /// Encode `value` little-endian into the first `bytes()` of `dest`,
    /// saturating at [`Self::max()`].
    pub fn encode(self, value: u32, dest: &mut [u8]) {
        let value = value.min(self.max());
        dest[..self.bytes()].copy_from_slice(&value.to_le_bytes()[..self.bytes()]);
    }
}

impl TryFrom<u8> for PulseWidth {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PulseWidth::U8),
            2 => Ok(PulseWidth::U16),
            4 => Ok(PulseWidth::U32),
            _ => Err(Error::InvalidWidth),
        }
    }
}

/// Why a capture stopped.  None of these are errors: the pulses recorded up to
/// that point form the captured signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The whole signal ran longer than the signal timeout
    SignalTimeout,
    /// No edge within the pulse timeout - the usual end of a signal
    PulseTimeout,
    /// The pulse buffer filled up
    BufferOverflow,
}

/// Result of a completed capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReport {
    /// Number of pulses recorded into the loaned buffer
    pub count: u16,
    /// Why the capture stopped
    pub end: CaptureEnd,
}

/// Drives and samples the infrared pins.
#[derive(Debug)]
pub struct SignalStation {
    pin: u8,
    carrier_frequency: u32,
    half_period: u32,
    pulse_width: PulseWidth,
    signal_timeout: u32,
    pulse_timeout: u32,

    cursor: u16,
    armed: bool,
}

impl SignalStation {
    /// Create a new station.
    ///
    /// Arguments:
    /// - `pulse_width` - Storage width of each duration in loaned buffers
    /// - `signal_timeout` - Maximum length of a captured signal, µs
    /// - `pulse_timeout` - Maximum length of a captured pulse, µs
    pub fn new(pulse_width: PulseWidth, signal_timeout: u32, pulse_timeout: u32) -> Self {
        Self {
            pin: 0,
            carrier_frequency: 0,
            half_period: 0,
            pulse_width,
            signal_timeout,
            pulse_timeout,
            cursor: 0,
            armed: false,
        }
    }

    pub fn pulse_width(&self) -> PulseWidth {
        self.pulse_width
    }

    /// Carrier frequency of the last transmit, Hz
    pub fn carrier_frequency(&self) -> u32 {
        self.carrier_frequency
    }

    /// Pulses transmitted or captured by the last operation
    pub fn len(&self) -> u16 {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Whether a capture is waiting for its first edge
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// How many pulses a buffer of `bytes` can hold.
    pub fn capacity(&self, bytes: usize) -> u16 {
        (bytes / self.pulse_width.bytes()).min(u16::MAX as usize) as u16
    }

    /// Transmit `pulses` on `pin`, modulating each mark at `frequency` Hz.
    ///
    /// Blocks for the duration of the signal.  A frequency of 0 disables
    /// modulation.  Returns the number of pulses transmitted.
    pub fn transmit<H: Gpio + Clock>(
        &mut self,
        hw: &mut H,
        pin: u8,
        frequency: u32,
        pulses: &[u8],
    ) -> u16 {
        self.init(pin, frequency);
        debug!(
            "Transmit {} pulses on pin {pin} at {frequency}Hz",
            self.capacity(pulses.len())
        );

        let half_period = self.half_period;
        let mut lease = PinLease::new(hw, pin);
        while let Some(mark) = self.next_pulse(pulses) {
            lease.mark(mark, half_period);
            let Some(space) = self.next_pulse(pulses) else {
                break;
            };
            lease.space(space);
        }

        self.cursor
    }

    /// Arm an interrupt-driven capture on `pin`.  Returns immediately - the
    /// capture itself happens in [`Self::capture()`] when the first edge
    /// arrives.
    pub fn arm_capture<H: Gpio>(&mut self, hw: &mut H, pin: u8) {
        self.init(pin, 0);
        hw.configure_input(pin);

        hw.disable_interrupts();
        hw.clear_edge(pin);
        hw.attach_edge_interrupt(pin);
        self.armed = true;
        hw.enable_interrupts();

        debug!("Capture armed on pin {pin}");
    }

    /// Edge interrupt handler: capture the signal now arriving into `pulses`.
    ///
    /// Blocks until the signal ends.  Interrupts are left disabled.  Returns
    /// `None` if no capture was armed.
    pub fn capture<H: Gpio + Clock>(
        &mut self,
        hw: &mut H,
        pulses: &mut BoundedBuffer,
    ) -> Option<CaptureReport> {
        hw.disable_interrupts();
        if !self.armed {
            warn!("Edge interrupt with no capture armed");
            return None;
        }
        self.armed = false;

        pulses.reset();
        let capacity = self.capacity(pulses.capacity());
        let width = self.pulse_width.bytes();

        let mut current = hw.read(self.pin);
        let start = hw.now_us();
        let mut last = start;

        let end = loop {
            let level = hw.read(self.pin);
            let now = hw.now_us();
            let elapsed = now.wrapping_sub(last);

            if now.wrapping_sub(start) >= self.signal_timeout {
                break CaptureEnd::SignalTimeout;
            }
            if elapsed >= self.pulse_timeout {
                break CaptureEnd::PulseTimeout;
            }
            if level == current {
                continue;
            }
            if self.cursor >= capacity {
                break CaptureEnd::BufferOverflow;
            }

            self.pulse_width.encode(elapsed, &mut pulses.spare_mut()[..width]);
            pulses.skip(width);
            self.cursor += 1;

            last = now;
            current = level;
        };

        debug!("Captured {} pulses, ended by {end:?}", self.cursor);
        Some(CaptureReport {
            count: self.cursor,
            end,
        })
    }

    /// Abandon any armed capture.
    pub fn reset<H: Gpio>(&mut self, hw: &mut H) {
        hw.disable_interrupts();
        self.armed = false;
        self.cursor = 0;
    }
}

// Internal functions
impl SignalStation {
    fn init(&mut self, pin: u8, frequency: u32) {
        self.pin = pin;
        self.cursor = 0;
        self.carrier_frequency = frequency;
        self.half_period = if frequency > 0 {
            (1_000_000 / frequency) >> 1
        } else {
            0
        };
    }

    fn next_pulse(&mut self, pulses: &[u8]) -> Option<u32> {
        if self.cursor >= self.capacity(pulses.len()) {
            return None;
        }

        let width = self.pulse_width.bytes();
        let offset = self.cursor as usize * width;
        let value = self.pulse_width.decode(&pulses[offset..offset + width]);
        self.cursor += 1;
        Some(value)
    }
}

/// Exclusive use of an output pin for the length of a transmission.  The pin
/// is driven low (idle) when the lease is dropped.
struct PinLease<'a, H: Gpio + Clock> {
    hw: &'a mut H,
    pin: u8,
}

impl<'a, H: Gpio + Clock> PinLease<'a, H> {
    fn new(hw: &'a mut H, pin: u8) -> Self {
        hw.configure_output(pin, false);
        Self { hw, pin }
    }

    /// Square wave of `half_period` half-cycles for `time` µs, ending low.
    fn mark(&mut self, time: u32, half_period: u32) {
        if half_period == 0 {
            self.space(time);
            return;
        }

        let n = time / half_period;
        for i in 1..=n {
            self.hw.write(self.pin, i & 1 == 1);
            self.hw.delay_us(half_period);
        }
        self.hw.write(self.pin, false);
    }

    fn space(&mut self, time: u32) {
        self.hw.write(self.pin, false);
        self.hw.delay_us(time);
    }
}

impl<H: Gpio + Clock> Drop for PinLease<'_, H> {
    fn drop(&mut self) {
        self.hw.write(self.pin, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Simulated pin and clock.  Time advances 1µs per clock read and by the
    /// requested amount per delay.  The input level toggles at each edge time.
    #[derive(Default)]
    struct SimPin {
        now: u32,
        idle: bool,
        edges: Vec<u32>,
        writes: Vec<(u32, bool)>,
        interrupts: bool,
        attached: Option<u8>,
        output: Option<u8>,
    }

    impl SimPin {
        fn with_edges(edges: &[u32]) -> Self {
            Self {
                idle: true,
                edges: edges.to_vec(),
                ..Default::default()
            }
        }

        fn highs(&self) -> usize {
            self.writes.iter().filter(|(_, level)| *level).count()
        }
    }

    impl Gpio for SimPin {
        fn configure_output(&mut self, pin: u8, level: bool) {
            self.output = Some(pin);
            self.writes.push((self.now, level));
        }
        fn configure_input(&mut self, _pin: u8) {
            self.output = None;
        }
        fn read(&mut self, _pin: u8) -> bool {
            let toggles = self.edges.iter().filter(|e| **e <= self.now).count();
            self.idle ^ (toggles % 2 == 1)
        }
        fn write(&mut self, _pin: u8, level: bool) {
            self.writes.push((self.now, level));
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

    impl Clock for SimPin {
        fn now_us(&mut self) -> u32 {
            let now = self.now;
            self.now += 1;
            now
        }
        fn delay_us(&mut self, us: u32) {
            self.now += us;
        }
    }

    fn pulse_bytes(width: PulseWidth, pulses: &[u32]) -> Vec<u8> {
        let mut bytes = vec![0u8; pulses.len() * width.bytes()];
        for (i, p) in pulses.iter().enumerate() {
            width.encode(*p, &mut bytes[i * width.bytes()..]);
        }
        bytes
    }

    #[test]
    fn test_pulse_width_saturates() {
        let mut buf = [0u8; 4];
        PulseWidth::U8.encode(900, &mut buf);
        assert_eq!(PulseWidth::U8.decode(&buf), 255);
        PulseWidth::U16.encode(70_000, &mut buf);
        assert_eq!(PulseWidth::U16.decode(&buf), 65_535);
        PulseWidth::U32.encode(70_000, &mut buf);
        assert_eq!(PulseWidth::U32.decode(&buf), 70_000);
        assert_eq!(PulseWidth::try_from(3), Err(Error::InvalidWidth));
    }

    #[test]
    fn test_transmit_modulated() {
        let mut hw = SimPin::default();
        let mut station = SignalStation::new(PulseWidth::U16, 100_000, 10_000);
        let pulses = pulse_bytes(PulseWidth::U16, &[900, 450, 900, 1700]);

        let sent = station.transmit(&mut hw, 0, 38_000, &pulses);
        assert_eq!(sent, 4);
        assert_eq!(station.carrier_frequency(), 38_000);

        // 13µs half period: 69 half-cycles per 900µs mark, 35 of them high
        assert_eq!(hw.highs(), 70);
        assert_eq!(hw.now, 69 * 13 + 450 + 69 * 13 + 1700);
        assert_eq!(hw.writes.last(), Some(&(hw.now, false)));
        assert_eq!(hw.output, Some(0));
    }

    #[test]
    fn test_transmit_unmodulated() {
        let mut hw = SimPin::default();
        let mut station = SignalStation::new(PulseWidth::U16, 100_000, 10_000);
        let pulses = pulse_bytes(PulseWidth::U16, &[900, 450, 900]);

        assert_eq!(station.transmit(&mut hw, 0, 0, &pulses), 3);
        assert_eq!(hw.highs(), 0);
        assert_eq!(hw.now, 900 + 450 + 900);
    }

    #[test]
    fn test_capture_until_pulse_timeout() {
        let mut hw = SimPin::with_edges(&[0, 900, 1350, 2250, 3950]);
        let mut station = SignalStation::new(PulseWidth::U16, 100_000, 10_000);
        let mut buf = BoundedBuffer::new(16);

        station.arm_capture(&mut hw, 2);
        assert!(station.is_armed());
        assert!(hw.interrupts);
        assert_eq!(hw.attached, Some(2));

        let report = station.capture(&mut hw, &mut buf).unwrap();
        assert_eq!(
            report,
            CaptureReport {
                count: 4,
                end: CaptureEnd::PulseTimeout
            }
        );
        assert_eq!(buf.filled(), pulse_bytes(PulseWidth::U16, &[900, 450, 900, 1700]));
        assert!(!hw.interrupts);
        assert!(!station.is_armed());
    }

    #[test]
    fn test_capture_signal_timeout() {
        let edges: Vec<u32> = (0..100).map(|i| i * 500).collect();
        let mut hw = SimPin::with_edges(&edges);
        let mut station = SignalStation::new(PulseWidth::U16, 10_000, 1_000);
        let mut buf = BoundedBuffer::new(256);

        station.arm_capture(&mut hw, 2);
        let report = station.capture(&mut hw, &mut buf).unwrap();
        assert_eq!(report.end, CaptureEnd::SignalTimeout);
        assert_eq!(report.count, 19);
    }

    #[test]
    fn test_capture_overflow() {
        let mut hw = SimPin::with_edges(&[0, 100, 200, 300, 400]);
        let mut station = SignalStation::new(PulseWidth::U16, 100_000, 10_000);
        let mut buf = BoundedBuffer::new(4);

        station.arm_capture(&mut hw, 2);
        let report = station.capture(&mut hw, &mut buf).unwrap();
        assert_eq!(
            report,
            CaptureReport {
                count: 2,
                end: CaptureEnd::BufferOverflow
            }
        );
        assert_eq!(buf.left(), 0);
    }

    #[test]
    fn test_capture_saturates_narrow_width() {
        let mut hw = SimPin::with_edges(&[0, 900, 1000]);
        let mut station = SignalStation::new(PulseWidth::U8, 100_000, 10_000);
        let mut buf = BoundedBuffer::new(8);

        station.arm_capture(&mut hw, 2);
        let report = station.capture(&mut hw, &mut buf).unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(buf.filled(), &[255, 100]);
    }

    #[test]
    fn test_spurious_interrupt_ignored() {
        let mut hw = SimPin::with_edges(&[0]);
        let mut station = SignalStation::new(PulseWidth::U16, 100_000, 10_000);
        let mut buf = BoundedBuffer::new(8);
        assert_eq!(station.capture(&mut hw, &mut buf), None);

        station.arm_capture(&mut hw, 2);
        station.reset(&mut hw);
        assert!(!station.is_armed());
        assert_eq!(station.capture(&mut hw, &mut buf), None);
    }
}
