//! Protocol constants and line-control abstractions shared by firmware and host targets.
//!
//! The DHT22 answers a host pulse with a fixed edge geometry: the two edges of
//! our own request pulse, a three-edge acknowledgment, 40 data bits of two
//! edges each, and a final release edge. Everything in this module is
//! `no_std` friendly so the same definitions compile for the STM32 firmware
//! and the host-side emulator.

use core::time::Duration;

pub mod trigger;

pub use trigger::{TRIGGER_PULSE, TRIGGER_PULSE_STEPS, run_trigger_pulse};

/// Edges produced by our own request pulse (drive low, release).
pub const TRIGGER_EDGE_COUNT: usize = 2;
/// Edges of the device acknowledgment (low, high, first bit start).
pub const HANDSHAKE_EDGE_COUNT: usize = 3;
/// Number of data bits in one frame.
pub const DATA_BITS: usize = 40;
/// Bits per transmitted byte.
pub const BITS_PER_BYTE: usize = 8;
/// Number of bytes in one frame (humidity, temperature, checksum).
pub const FRAME_BYTES: usize = DATA_BITS / BITS_PER_BYTE;
/// Each bit contributes a bit-start interval and a value interval.
pub const DATA_EDGE_COUNT: usize = DATA_BITS * 2;
/// Rising edge emitted when the device releases the line after the last bit.
pub const TRAILER_EDGE_COUNT: usize = 1;
/// Intervals that precede the first data interval.
pub const PREAMBLE_EDGE_COUNT: usize = TRIGGER_EDGE_COUNT + HANDSHAKE_EDGE_COUNT;
/// Total edges observed during one complete cycle.
pub const EXPECTED_EDGE_COUNT: usize = PREAMBLE_EDGE_COUNT + DATA_EDGE_COUNT + TRAILER_EDGE_COUNT;

/// Value intervals strictly longer than this encode a logical one (µs).
pub const BIT_THRESHOLD_US: i32 = 50;

/// Nominal bit-start low period sent before every bit (µs).
pub const BIT_START_US: i32 = 50;
/// Nominal high period for a logical zero (µs).
pub const BIT_ZERO_US: i32 = 26;
/// Nominal high period for a logical one (µs).
pub const BIT_ONE_US: i32 = 70;
/// Delay between the host releasing the line and the device pulling it low (µs).
pub const RESPONSE_DELAY_US: i32 = 30;
/// Device acknowledgment low period (µs).
pub const RESPONSE_LOW_US: i32 = 80;
/// Device acknowledgment high period (µs).
pub const RESPONSE_HIGH_US: i32 = 80;

/// Period between retry attempts while autoupdate is disabled.
pub const RETRY_PERIOD: Duration = Duration::from_secs(3);
/// Retry attempts allowed before the retry timer disarms.
pub const MAX_RETRY_ATTEMPTS: u8 = 5;
/// Extra delay added to the next periodic tick after a stalled cycle was reset.
pub const STALL_BACKOFF: Duration = Duration::from_secs(1);
/// Delay before the first periodic tick after startup.
pub const STARTUP_DELAY: Duration = Duration::from_micros(100);

/// Logical action applied to the data line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineAction {
    DriveLow,
    ReleaseHigh,
}

impl LineAction {
    /// Short label used by logs and the emulator.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            LineAction::DriveLow => "drive-low",
            LineAction::ReleaseHigh => "release-high",
        }
    }
}

/// Abstraction over the physical data line driver.
pub trait DataLine {
    /// Applies the requested action to the line.
    fn apply(&mut self, action: LineAction);

    /// Returns the line to its passive, pulled-up state.
    fn release(&mut self) {
        self.apply(LineAction::ReleaseHigh);
    }
}

/// Blocking delay provider used while the trigger pulse is in flight.
///
/// Implementations must hold for at least the requested duration and must only
/// be used from the deferred-work context.
pub trait PulseDelay {
    fn hold(&mut self, duration: Duration);
}

/// Ordered operation applied to the data line during the trigger pulse.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseStep {
    pub action: LineAction,
    pub hold_for: Duration,
}

impl PulseStep {
    pub const fn new(action: LineAction, hold_for: Duration) -> Self {
        Self { action, hold_for }
    }
}
