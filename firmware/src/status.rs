#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The report task copies the interesting parts of the orchestrator into
//! atomics so the console can print a [`StatusSnapshot`] without taking the
//! sensor lock.

use core::fmt;
use core::time::Duration;

use dht22_core::TimestampMicros;
use dht22_core::decode::{RawReading, Tenths};
use dht22_core::orchestrator::{OrchestratorPhase, TriggerOrchestrator};
use dht22_core::telemetry::TelemetryEventKind;
use portable_atomic::{AtomicI32, AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Temperature of the last good reading, in tenths.
static TEMPERATURE_DECIS: AtomicI32 = AtomicI32::new(0);
/// Humidity of the last good reading, in tenths.
static HUMIDITY_DECIS: AtomicU32 = AtomicU32::new(0);
/// Decode time (µs, +1) of the last good reading.
static READING_MICROS: AtomicU64 = AtomicU64::new(0);
static PHASE: AtomicU8 = AtomicU8::new(0);
static READINGS: AtomicU32 = AtomicU32::new(0);
static FAILURES: AtomicU32 = AtomicU32::new(0);
/// Raw code (+1) of the most recent telemetry event.
static LAST_EVENT: AtomicU32 = AtomicU32::new(0);

fn encode_micros(micros: TimestampMicros) -> u64 {
    micros.saturating_add(1)
}

fn decode_micros(raw: u64) -> Option<TimestampMicros> {
    raw.checked_sub(1)
}

const fn phase_code(phase: OrchestratorPhase) -> u8 {
    match phase {
        OrchestratorPhase::Idle => 0,
        OrchestratorPhase::PulseInProgress => 1,
        OrchestratorPhase::AwaitingRetryWindow => 2,
    }
}

const fn phase_from_code(code: u8) -> OrchestratorPhase {
    match code {
        1 => OrchestratorPhase::PulseInProgress,
        2 => OrchestratorPhase::AwaitingRetryWindow,
        _ => OrchestratorPhase::Idle,
    }
}

/// Copies the orchestrator's externally visible state into the atomics.
pub fn publish(orchestrator: &TriggerOrchestrator) {
    if let Some(reading) = orchestrator.last_reading() {
        TEMPERATURE_DECIS.store(i32::from(reading.temperature_decis), Ordering::Relaxed);
        HUMIDITY_DECIS.store(u32::from(reading.humidity_decis), Ordering::Relaxed);
        READING_MICROS.store(encode_micros(reading.decoded_at), Ordering::Relaxed);
    }

    PHASE.store(phase_code(orchestrator.phase()), Ordering::Relaxed);
    let counters = orchestrator.telemetry().counters();
    READINGS.store(counters.readings, Ordering::Relaxed);
    FAILURES.store(counters.failures(), Ordering::Relaxed);
    if let Some(record) = orchestrator.telemetry().latest() {
        LAST_EVENT.store(u32::from(record.event.to_raw()) + 1, Ordering::Relaxed);
    }
}

/// Point-in-time view of the sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub reading: Option<RawReading>,
    pub reading_age: Option<Duration>,
    pub phase: OrchestratorPhase,
    pub readings: u32,
    pub failures: u32,
    pub last_event: Option<TelemetryEventKind>,
}

/// Builds a [`StatusSnapshot`] from the stored values.
pub fn snapshot(now: TimestampMicros) -> StatusSnapshot {
    let reading = decode_micros(READING_MICROS.load(Ordering::Relaxed)).map(|decoded_at| {
        RawReading {
            temperature_decis: i16::try_from(TEMPERATURE_DECIS.load(Ordering::Relaxed))
                .unwrap_or_default(),
            humidity_decis: u16::try_from(HUMIDITY_DECIS.load(Ordering::Relaxed))
                .unwrap_or_default(),
            decoded_at,
        }
    });
    let last_event = match LAST_EVENT.load(Ordering::Relaxed) {
        0 => None,
        raw => u16::try_from(raw - 1).ok().map(TelemetryEventKind::from_raw),
    };

    StatusSnapshot {
        reading,
        reading_age: reading
            .map(|reading| Duration::from_micros(now.saturating_sub(reading.decoded_at))),
        phase: phase_from_code(PHASE.load(Ordering::Relaxed)),
        readings: READINGS.load(Ordering::Relaxed),
        failures: FAILURES.load(Ordering::Relaxed),
        last_event,
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.reading, self.reading_age) {
            (Some(reading), Some(age)) => writeln!(f, "{reading} ({} s ago)", age.as_secs())?,
            _ => writeln!(f, "no reading yet ({} C, {}%)", Tenths(0), Tenths(0))?,
        }
        write!(
            f,
            "phase {} readings {} failures {}",
            self.phase.label(),
            self.readings,
            self.failures
        )?;
        if let Some(event) = self.last_event {
            write!(f, " last {event}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dht22_core::config::SensorConfig;

    #[test]
    fn phase_codes_round_trip() {
        for phase in [
            OrchestratorPhase::Idle,
            OrchestratorPhase::PulseInProgress,
            OrchestratorPhase::AwaitingRetryWindow,
        ] {
            assert_eq!(phase_from_code(phase_code(phase)), phase);
        }
    }

    // The atomics are process-wide, so everything touching them lives here.
    #[test]
    fn snapshot_reflects_published_orchestrator() {
        let orchestrator = TriggerOrchestrator::new(SensorConfig::default(), 0);
        publish(&orchestrator);
        let empty = snapshot(10);
        assert_eq!(empty.reading, None);
        assert_eq!(empty.phase, OrchestratorPhase::Idle);
        assert!(empty.to_string().starts_with("no reading yet"));

        TEMPERATURE_DECIS.store(-15, Ordering::Relaxed);
        HUMIDITY_DECIS.store(655, Ordering::Relaxed);
        READING_MICROS.store(encode_micros(1_000_000), Ordering::Relaxed);
        let snap = snapshot(4_000_000);
        assert_eq!(snap.reading.map(|r| r.temperature_decis), Some(-15));
        assert_eq!(snap.reading_age, Some(Duration::from_secs(3)));
        assert!(
            snap.to_string()
                .starts_with("temperature -1.5 C, humidity 65.5% (3 s ago)")
        );
    }
}
