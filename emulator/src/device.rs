//! Simulated DHT22 and data line for the host emulator.
//!
//! The sensor answers each request with the edge timestamps a real device
//! would produce, built from [`frame_to_intervals`]. Faults reshape that edge
//! train so retry, stall and checksum handling can be exercised by hand.

use std::time::Duration;

use dht22_core::TimestampMicros;
use dht22_core::decode::{SensorFrame, frame_to_intervals};
use dht22_core::protocol::{DataLine, LineAction, PREAMBLE_EDGE_COUNT, PulseDelay, TRIGGER_EDGE_COUNT};

/// Lowest temperature the DHT22 reports, in tenths of a degree.
pub const MIN_TEMPERATURE_DECIS: i16 = -400;
/// Highest temperature the DHT22 reports, in tenths of a degree.
pub const MAX_TEMPERATURE_DECIS: i16 = 800;
/// Highest humidity the DHT22 reports, in tenths of a percent.
pub const MAX_HUMIDITY_DECIS: u16 = 1000;

/// Data interval disturbed by the edge faults (a bit value interval).
const FAULT_INTERVAL: usize = PREAMBLE_EDGE_COUNT + 21;
/// Width of the glitch inserted by [`FaultMode::ExtraEdge`] (µs).
const GLITCH_US: i32 = 5;

/// How the next response is corrupted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultMode {
    None,
    /// One data edge goes missing, so the capture never completes.
    DropEdge,
    /// A payload bit is inverted, so the checksum fails.
    FlipBit,
    /// The sensor does not answer; only our own pulse is seen.
    Silent,
    /// A short glitch adds one edge mid-frame.
    ExtraEdge,
}

impl FaultMode {
    pub const TAGS: &'static [&'static str] =
        &["none", "drop-edge", "flip-bit", "silent", "extra-edge"];

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        match tag.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "drop-edge" => Ok(Self::DropEdge),
            "flip-bit" => Ok(Self::FlipBit),
            "silent" => Ok(Self::Silent),
            "extra-edge" => Ok(Self::ExtraEdge),
            _ => Err(format!("unknown fault `{tag}`")),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DropEdge => "drop-edge",
            Self::FlipBit => "flip-bit",
            Self::Silent => "silent",
            Self::ExtraEdge => "extra-edge",
        }
    }
}

/// Sensor model driven by the emulator session.
#[derive(Debug)]
pub struct SimulatedSensor {
    temperature_decis: i16,
    humidity_decis: u16,
    fault: FaultMode,
    sticky: bool,
    responses: u32,
}

impl SimulatedSensor {
    pub fn new(temperature_decis: i16, humidity_decis: u16) -> Self {
        Self {
            temperature_decis,
            humidity_decis,
            fault: FaultMode::None,
            sticky: false,
            responses: 0,
        }
    }

    pub fn environment(&self) -> (i16, u16) {
        (self.temperature_decis, self.humidity_decis)
    }

    /// Changes the conditions reported from the next response on.
    pub fn set_environment(&mut self, temperature_decis: i16, humidity_decis: u16) -> Result<(), String> {
        if !(MIN_TEMPERATURE_DECIS..=MAX_TEMPERATURE_DECIS).contains(&temperature_decis) {
            return Err(format!(
                "temperature out of range ({MIN_TEMPERATURE_DECIS}..={MAX_TEMPERATURE_DECIS} tenths)"
            ));
        }
        if humidity_decis > MAX_HUMIDITY_DECIS {
            return Err(format!("humidity out of range (0..={MAX_HUMIDITY_DECIS} tenths)"));
        }
        self.temperature_decis = temperature_decis;
        self.humidity_decis = humidity_decis;
        Ok(())
    }

    /// Arms a fault. One-shot faults clear after the next response.
    pub fn inject(&mut self, fault: FaultMode, sticky: bool) {
        self.fault = fault;
        self.sticky = sticky && fault != FaultMode::None;
    }

    pub fn fault(&self) -> (FaultMode, bool) {
        (self.fault, self.sticky)
    }

    pub fn responses(&self) -> u32 {
        self.responses
    }

    fn take_fault(&mut self) -> FaultMode {
        let fault = self.fault;
        if !self.sticky {
            self.fault = FaultMode::None;
        }
        fault
    }

    /// Edge timestamps observed for a request whose cycle began at `requested_at`.
    pub fn respond(&mut self, requested_at: TimestampMicros) -> Vec<TimestampMicros> {
        self.responses += 1;
        let fault = self.take_fault();

        let mut frame = SensorFrame::from_reading(self.temperature_decis, self.humidity_decis);
        if fault == FaultMode::FlipBit {
            let mut bytes = frame.bytes();
            bytes[1] ^= 0x01;
            frame = SensorFrame::from_bytes(bytes);
        }

        let mut intervals = frame_to_intervals(&frame).as_slice().to_vec();
        match fault {
            FaultMode::Silent => intervals.truncate(TRIGGER_EDGE_COUNT),
            FaultMode::DropEdge => {
                let merged = intervals.remove(FAULT_INTERVAL);
                intervals[FAULT_INTERVAL] += merged;
            }
            FaultMode::ExtraEdge => {
                intervals[FAULT_INTERVAL] -= GLITCH_US;
                intervals.insert(FAULT_INTERVAL, GLITCH_US);
            }
            FaultMode::None | FaultMode::FlipBit => {}
        }

        intervals
            .iter()
            .scan(requested_at, |at, interval| {
                *at += u64::try_from(*interval).unwrap_or(0);
                Some(*at)
            })
            .collect()
    }
}

/// Data line that remembers what was driven onto it.
#[derive(Debug)]
pub struct EmulatedLine {
    level: LineAction,
    transitions: u32,
}

impl EmulatedLine {
    pub fn new() -> Self {
        Self {
            level: LineAction::ReleaseHigh,
            transitions: 0,
        }
    }

    pub fn level(&self) -> LineAction {
        self.level
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }
}

impl Default for EmulatedLine {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLine for EmulatedLine {
    fn apply(&mut self, action: LineAction) {
        if action != self.level {
            self.transitions += 1;
        }
        self.level = action;
    }
}

/// Delay that only accounts for the time it was asked to hold.
#[derive(Debug, Default)]
pub struct VirtualDelay {
    held: Duration,
}

impl VirtualDelay {
    pub fn held(&self) -> Duration {
        self.held
    }
}

impl PulseDelay for VirtualDelay {
    fn hold(&mut self, duration: Duration) {
        self.held += duration;
    }
}
