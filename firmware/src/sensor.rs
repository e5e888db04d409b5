//! Glue between the board and the shared [`TriggerOrchestrator`].
//!
//! The data line is wired to two pins: PA6 drives it open-drain for the
//! request pulse and PA7 senses it through EXTI, so edges keep arriving while
//! the pulse is being driven.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use dht22_core::TimestampMicros;
use dht22_core::config::{DEFAULT_GPIO, DEFAULT_INTERVAL_MS, SensorConfig, TimingConfig};
use embassy_time::Instant;

#[cfg(target_os = "none")]
use core::cell::RefCell;
#[cfg(target_os = "none")]
use dht22_core::orchestrator::TriggerOrchestrator;
#[cfg(target_os = "none")]
use dht22_core::protocol::{DataLine, LineAction, PulseDelay};
#[cfg(target_os = "none")]
use embassy_stm32::gpio::OutputOpenDrain;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

/// Boot-time configuration. The board reads periodically out of the box.
pub const BOOT_CONFIG: SensorConfig =
    SensorConfig::new(DEFAULT_GPIO, TimingConfig::new(DEFAULT_INTERVAL_MS, true));

/// Orchestrator shared by the edge, worker, timer and console tasks.
#[cfg(target_os = "none")]
pub type SharedSensor = Mutex<CriticalSectionRawMutex, RefCell<TriggerOrchestrator>>;

/// Runs `f` with exclusive access to the orchestrator.
///
/// Holds a critical section, so `f` must not block.
#[cfg(target_os = "none")]
pub fn with_sensor<R>(sensor: &SharedSensor, f: impl FnOnce(&mut TriggerOrchestrator) -> R) -> R {
    sensor.lock(|cell| f(&mut cell.borrow_mut()))
}

/// Converts an Embassy instant into orchestrator time.
pub fn timestamp(instant: Instant) -> TimestampMicros {
    instant.as_micros()
}

/// Converts an orchestrator deadline back into an Embassy instant.
pub fn instant_at(timestamp: TimestampMicros) -> Instant {
    Instant::from_micros(timestamp)
}

/// Current orchestrator time.
#[cfg(target_os = "none")]
pub fn now() -> TimestampMicros {
    timestamp(Instant::now())
}

/// Open-drain driver for the sensor data line.
#[cfg(target_os = "none")]
pub struct HardwareLine<'d> {
    pin: OutputOpenDrain<'d>,
}

#[cfg(target_os = "none")]
impl<'d> HardwareLine<'d> {
    pub fn new(pin: OutputOpenDrain<'d>) -> Self {
        Self { pin }
    }
}

#[cfg(target_os = "none")]
impl DataLine for HardwareLine<'_> {
    fn apply(&mut self, action: LineAction) {
        match action {
            LineAction::DriveLow => self.pin.set_low(),
            LineAction::ReleaseHigh => self.pin.set_high(),
        }
    }
}

/// Busy-waits on the Embassy clock. Only the worker task may use it.
#[cfg(target_os = "none")]
pub struct BusyWaitDelay;

#[cfg(target_os = "none")]
impl PulseDelay for BusyWaitDelay {
    fn hold(&mut self, duration: core::time::Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        embassy_time::block_for(embassy_time::Duration::from_micros(micros));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instants_round_trip_through_timestamps() {
        let instant = Instant::from_micros(1_234_567);
        assert_eq!(timestamp(instant), 1_234_567);
        assert_eq!(instant_at(timestamp(instant)), instant);
    }

    #[test]
    fn boot_config_reads_periodically() {
        assert!(BOOT_CONFIG.timing.autoupdate());
        assert_eq!(BOOT_CONFIG.timing.interval_ms(), DEFAULT_INTERVAL_MS);
        assert_eq!(BOOT_CONFIG.gpio, DEFAULT_GPIO);
    }
}
