//! Host request pulse that starts one DHT22 read cycle.
//!
//! The datasheet asks for the line to idle high for 100–250 ms, be pulled low
//! for at least 1 ms (we hold 10 ms), and then be released so the pull-up
//! brings it back high for 20–40 µs before the sensor takes over.

use core::time::Duration;

use super::{DataLine, LineAction, PulseDelay, PulseStep};

/// Idle-high settle period before the line is pulled low.
pub const TRIGGER_SETTLE: Duration = Duration::from_millis(100);
/// Duration the line is held low to request a reading.
pub const TRIGGER_ASSERT: Duration = Duration::from_millis(10);
/// Guard interval after release before edges are trusted.
pub const TRIGGER_POST_RELEASE: Duration = Duration::from_micros(40);

/// Ordered line steps that implement the request pulse.
pub const TRIGGER_PULSE_STEPS: [PulseStep; 3] = [
    // Let the line settle at its idle level.
    PulseStep::new(LineAction::ReleaseHigh, TRIGGER_SETTLE),
    // Start signal.
    PulseStep::new(LineAction::DriveLow, TRIGGER_ASSERT),
    // Hand the line back to the sensor.
    PulseStep::new(LineAction::ReleaseHigh, TRIGGER_POST_RELEASE),
];

/// The request pulse as a slice.
pub const TRIGGER_PULSE: &[PulseStep] = &TRIGGER_PULSE_STEPS;

/// Walks the request pulse on `line`, blocking in `delay` for every step.
///
/// Runs to completion once started. Callers must have moved the cycle into the
/// triggered state beforehand so the echo edges of this pulse are captured.
pub fn run_trigger_pulse<L, D>(line: &mut L, delay: &mut D)
where
    L: DataLine + ?Sized,
    D: PulseDelay + ?Sized,
{
    for step in TRIGGER_PULSE {
        line.apply(step.action);
        delay.hold(step.hold_for);
    }
}

/// Total time the pulse occupies the deferred-work context.
#[must_use]
pub fn trigger_pulse_duration() -> Duration {
    TRIGGER_PULSE
        .iter()
        .fold(Duration::ZERO, |total, step| total + step.hold_for)
}
