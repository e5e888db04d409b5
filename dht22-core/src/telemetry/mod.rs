//! Cycle telemetry shared by firmware and host targets.
//!
//! Every notable orchestrator decision is stored as a [`TelemetryRecord`] in a
//! fixed-size ring so the firmware reporter and the emulator console can show
//! what happened without the core depending on a logging backend. Running
//! counters survive ring wrap-around. Event kinds encode to compact numeric
//! codes so targets can publish the most recent event through an atomic.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::TimestampMicros;
use crate::cycle::CycleState;
use crate::orchestrator::TriggerRejection;

/// Identifier assigned to every recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    TriggerIssued,
    TriggerRejected,
    CaptureCompleted,
    ReadingDecoded,
    ChecksumMismatch,
    IncompleteCapture,
    SpuriousEdge,
    CaptureOverrun,
    CaptureStalled,
    RetryArmed,
    RetryAttempt,
    RetryExhausted,
    AutoupdateChanged,
    IntervalChanged,
    ShutdownRequested,
    Custom(u16),
}

impl TelemetryEventKind {
    const ALL: [TelemetryEventKind; 15] = [
        TelemetryEventKind::TriggerIssued,
        TelemetryEventKind::TriggerRejected,
        TelemetryEventKind::CaptureCompleted,
        TelemetryEventKind::ReadingDecoded,
        TelemetryEventKind::ChecksumMismatch,
        TelemetryEventKind::IncompleteCapture,
        TelemetryEventKind::SpuriousEdge,
        TelemetryEventKind::CaptureOverrun,
        TelemetryEventKind::CaptureStalled,
        TelemetryEventKind::RetryArmed,
        TelemetryEventKind::RetryAttempt,
        TelemetryEventKind::RetryExhausted,
        TelemetryEventKind::AutoupdateChanged,
        TelemetryEventKind::IntervalChanged,
        TelemetryEventKind::ShutdownRequested,
    ];

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::TriggerIssued => 0x01,
            TelemetryEventKind::TriggerRejected => 0x02,
            TelemetryEventKind::CaptureCompleted => 0x03,
            TelemetryEventKind::ReadingDecoded => 0x04,
            TelemetryEventKind::ChecksumMismatch => 0x10,
            TelemetryEventKind::IncompleteCapture => 0x11,
            TelemetryEventKind::SpuriousEdge => 0x12,
            TelemetryEventKind::CaptureOverrun => 0x13,
            TelemetryEventKind::CaptureStalled => 0x14,
            TelemetryEventKind::RetryArmed => 0x20,
            TelemetryEventKind::RetryAttempt => 0x21,
            TelemetryEventKind::RetryExhausted => 0x22,
            TelemetryEventKind::AutoupdateChanged => 0x30,
            TelemetryEventKind::IntervalChanged => 0x31,
            TelemetryEventKind::ShutdownRequested => 0x3F,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`Custom`](Self::Custom).
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_raw() == code)
            .unwrap_or(TelemetryEventKind::Custom(code))
    }

    /// Severity class used by targets to pick a log level.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            TelemetryEventKind::ChecksumMismatch
            | TelemetryEventKind::IncompleteCapture
            | TelemetryEventKind::CaptureOverrun
            | TelemetryEventKind::CaptureStalled
            | TelemetryEventKind::RetryExhausted => Severity::Error,
            TelemetryEventKind::TriggerRejected
            | TelemetryEventKind::SpuriousEdge
            | TelemetryEventKind::RetryAttempt => Severity::Warn,
            _ => Severity::Info,
        }
    }

    /// Short label used by logs and the emulator.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TelemetryEventKind::TriggerIssued => "trigger-issued",
            TelemetryEventKind::TriggerRejected => "trigger-rejected",
            TelemetryEventKind::CaptureCompleted => "capture-completed",
            TelemetryEventKind::ReadingDecoded => "reading-decoded",
            TelemetryEventKind::ChecksumMismatch => "checksum-mismatch",
            TelemetryEventKind::IncompleteCapture => "incomplete-capture",
            TelemetryEventKind::SpuriousEdge => "spurious-edge",
            TelemetryEventKind::CaptureOverrun => "capture-overrun",
            TelemetryEventKind::CaptureStalled => "capture-stalled",
            TelemetryEventKind::RetryArmed => "retry-armed",
            TelemetryEventKind::RetryAttempt => "retry-attempt",
            TelemetryEventKind::RetryExhausted => "retry-exhausted",
            TelemetryEventKind::AutoupdateChanged => "autoupdate-changed",
            TelemetryEventKind::IntervalChanged => "interval-changed",
            TelemetryEventKind::ShutdownRequested => "shutdown-requested",
            TelemetryEventKind::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Coarse severity attached to each event kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Values produced by a successful decode, in tenths.
    Reading {
        temperature_decis: i16,
        humidity_decis: u16,
    },
    /// Checksum bytes that disagreed.
    Checksum { expected: u8, received: u8 },
    /// Edges captured when the cycle was abandoned, and the state it was in.
    Capture { edges: u8, state: CycleState },
    /// Retry attempt number out of the allowed maximum.
    Retry { attempt: u8, max: u8 },
    /// Reason a trigger request was turned down.
    Rejection(TriggerRejection),
    /// Timing configuration after a change.
    Config { interval_ms: u32, autoupdate: bool },
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }

    /// Capture payload with the edge count truncated to `u8`.
    #[must_use]
    pub fn capture(edges: usize, state: CycleState) -> Self {
        TelemetryPayload::Capture {
            edges: truncate_count(edges),
            state,
        }
    }
}

impl fmt::Display for TelemetryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Reading {
                temperature_decis,
                humidity_decis,
            } => write!(
                f,
                "{} C {}%",
                crate::decode::Tenths(i32::from(*temperature_decis)),
                crate::decode::Tenths(i32::from(*humidity_decis))
            ),
            TelemetryPayload::Checksum { expected, received } => {
                write!(f, "expected={expected:#04x} received={received:#04x}")
            }
            TelemetryPayload::Capture { edges, state } => write!(f, "edges={edges} state={state}"),
            TelemetryPayload::Retry { attempt, max } => write!(f, "attempt {attempt} of {max}"),
            TelemetryPayload::Rejection(reason) => write!(f, "{reason}"),
            TelemetryPayload::Config {
                interval_ms,
                autoupdate,
            } => write!(f, "interval={interval_ms}ms autoupdate={}", u8::from(*autoupdate)),
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: TimestampMicros,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} @{}us {}", self.id, self.timestamp, self.event)?;
        if self.details != TelemetryPayload::None {
            write!(f, " {}", self.details)?;
        }
        Ok(())
    }
}

/// Running totals that are not lost when the ring wraps.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TelemetryCounters {
    pub triggers: u32,
    pub rejected_triggers: u32,
    pub readings: u32,
    pub checksum_failures: u32,
    pub incomplete_captures: u32,
    pub spurious_edges: u32,
    pub overruns: u32,
    pub stalls: u32,
    pub retries: u32,
    pub retry_exhaustions: u32,
}

impl TelemetryCounters {
    fn bump(&mut self, event: TelemetryEventKind) {
        let slot = match event {
            TelemetryEventKind::TriggerIssued => &mut self.triggers,
            TelemetryEventKind::TriggerRejected => &mut self.rejected_triggers,
            TelemetryEventKind::ReadingDecoded => &mut self.readings,
            TelemetryEventKind::ChecksumMismatch => &mut self.checksum_failures,
            TelemetryEventKind::IncompleteCapture => &mut self.incomplete_captures,
            TelemetryEventKind::SpuriousEdge => &mut self.spurious_edges,
            TelemetryEventKind::CaptureOverrun => &mut self.overruns,
            TelemetryEventKind::CaptureStalled => &mut self.stalls,
            TelemetryEventKind::RetryAttempt => &mut self.retries,
            TelemetryEventKind::RetryExhausted => &mut self.retry_exhaustions,
            _ => return,
        };
        *slot = slot.saturating_add(1);
    }

    /// Failures of any kind observed so far.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.checksum_failures
            .saturating_add(self.incomplete_captures)
            .saturating_add(self.overruns)
            .saturating_add(self.stalls)
    }
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    counters: TelemetryCounters,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            counters: TelemetryCounters {
                triggers: 0,
                rejected_triggers: 0,
                readings: 0,
                checksum_failures: 0,
                incomplete_captures: 0,
                spurious_edges: 0,
                overruns: 0,
                stalls: 0,
                retries: 0,
                retry_exhaustions: 0,
            },
            next_event_id: 0,
        }
    }

    /// Records an event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TimestampMicros,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.counters.bump(event);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Records whose id is at least `cursor`, oldest first.
    ///
    /// Consumers keep the id after the last record they handled and pass it
    /// back here. Records overwritten since then are skipped.
    pub fn since(&self, cursor: EventId) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        self.ring
            .oldest_ordered()
            .filter(move |record| record.id.wrapping_sub(cursor) < EventId::MAX / 2)
    }

    /// Id that the next recorded event will receive.
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    pub const fn counters(&self) -> &TelemetryCounters {
        &self.counters
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_count(count: usize) -> u8 {
    match u8::try_from(count) {
        Ok(value) => value,
        Err(_) => u8::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip() {
        for kind in TelemetryEventKind::ALL {
            assert_eq!(TelemetryEventKind::from_raw(kind.to_raw()), kind);
        }
        assert_eq!(
            TelemetryEventKind::from_raw(0xBEEF),
            TelemetryEventKind::Custom(0xBEEF)
        );
    }

    #[test]
    fn counters_survive_ring_wrap() {
        let mut recorder = TelemetryRecorder::<4>::new();
        for ts in 0..10 {
            recorder.record(
                TelemetryEventKind::SpuriousEdge,
                TelemetryPayload::none(),
                ts,
            );
        }
        recorder.record(
            TelemetryEventKind::ChecksumMismatch,
            TelemetryPayload::Checksum {
                expected: 0x59,
                received: 0x58,
            },
            10,
        );

        assert_eq!(recorder.len(), 4);
        assert_eq!(recorder.counters().spurious_edges, 10);
        assert_eq!(recorder.counters().checksum_failures, 1);
        assert_eq!(recorder.counters().failures(), 1);
        assert_eq!(recorder.latest().map(|r| r.id), Some(10));
    }

    #[test]
    fn since_returns_only_new_records() {
        let mut recorder = TelemetryRecorder::<8>::new();
        recorder.record(TelemetryEventKind::TriggerIssued, TelemetryPayload::none(), 1);
        let cursor = recorder.next_id();
        recorder.record(
            TelemetryEventKind::CaptureCompleted,
            TelemetryPayload::none(),
            2,
        );
        recorder.record(
            TelemetryEventKind::ReadingDecoded,
            TelemetryPayload::Reading {
                temperature_decis: -15,
                humidity_decis: 455,
            },
            3,
        );

        let events: heapless::Vec<TelemetryEventKind, 8> =
            recorder.since(cursor).map(|r| r.event).collect();
        assert_eq!(
            events.as_slice(),
            &[
                TelemetryEventKind::CaptureCompleted,
                TelemetryEventKind::ReadingDecoded
            ]
        );
        assert_eq!(recorder.since(recorder.next_id()).count(), 0);
    }

    #[test]
    fn severity_classes() {
        assert_eq!(
            TelemetryEventKind::ChecksumMismatch.severity(),
            Severity::Error
        );
        assert_eq!(TelemetryEventKind::SpuriousEdge.severity(), Severity::Warn);
        assert_eq!(TelemetryEventKind::ReadingDecoded.severity(), Severity::Info);
    }

    #[test]
    fn records_render_for_consoles() {
        extern crate std;
        use std::string::ToString;

        let record = TelemetryRecord {
            id: 7,
            timestamp: 1_500,
            event: TelemetryEventKind::ReadingDecoded,
            details: TelemetryPayload::Reading {
                temperature_decis: -200,
                humidity_decis: 400,
            },
        };
        assert_eq!(record.to_string(), "#7 @1500us reading-decoded -20.0 C 40.0%");
    }
}
