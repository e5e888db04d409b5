//! Forwards orchestrator telemetry to defmt (or stdout on the host).
//!
//! Records are copied out under the sensor lock by [`TelemetryForwarder`] and
//! logged afterwards, so formatting never happens inside a critical section.
//! Nothing is copied while a capture is running, when the edge task needs the
//! lock at microsecond latency.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use dht22_core::orchestrator::TriggerOrchestrator;
use dht22_core::telemetry::{
    EventId, Severity, TELEMETRY_RING_CAPACITY, TelemetryRecord, TelemetryRecorder,
};
use heapless::Vec;

/// Records pulled from the ring in one pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TelemetryBatch {
    pub records: Vec<TelemetryRecord, TELEMETRY_RING_CAPACITY>,
    /// Records overwritten before they could be forwarded.
    pub dropped: u32,
}

/// Tracks which telemetry records have already been forwarded.
pub struct TelemetryForwarder {
    cursor: EventId,
}

impl TelemetryForwarder {
    pub const fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Copies every record newer than the cursor and advances it.
    pub fn collect(&mut self, recorder: &TelemetryRecorder) -> TelemetryBatch {
        let mut batch = TelemetryBatch::default();
        for record in recorder.since(self.cursor) {
            if batch.records.push(*record).is_err() {
                break;
            }
        }

        if let Some(first) = batch.records.first() {
            batch.dropped = first.id.wrapping_sub(self.cursor);
        }
        if let Some(last) = batch.records.last() {
            self.cursor = last.id.wrapping_add(1);
        }
        batch
    }

    /// Like [`collect`](Self::collect), but yields nothing while a cycle is
    /// live. Pending records are picked up on a later pass.
    pub fn collect_when_quiet(
        &mut self,
        orchestrator: &TriggerOrchestrator,
    ) -> Option<TelemetryBatch> {
        if orchestrator.cycle().state().is_live() {
            return None;
        }
        Some(self.collect(orchestrator.telemetry()))
    }
}

impl Default for TelemetryForwarder {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs a batch at the severity of each event.
pub fn emit_batch(batch: &TelemetryBatch) {
    if batch.dropped > 0 {
        emit_dropped(batch.dropped);
    }
    for record in &batch.records {
        emit(record);
    }
}

#[cfg(target_os = "none")]
fn emit(record: &TelemetryRecord) {
    let line = defmt::Display2Format(record);
    match record.event.severity() {
        Severity::Info => defmt::info!("telemetry {}", line),
        Severity::Warn => defmt::warn!("telemetry {}", line),
        Severity::Error => defmt::error!("telemetry {}", line),
    }
}

#[cfg(not(target_os = "none"))]
fn emit(record: &TelemetryRecord) {
    let level = match record.event.severity() {
        Severity::Info => "info",
        Severity::Warn => "warn",
        Severity::Error => "error",
    };
    println!("telemetry {level} {record}");
}

#[cfg(target_os = "none")]
fn emit_dropped(count: u32) {
    defmt::warn!("telemetry: {} records overwritten before forwarding", count);
}

#[cfg(not(target_os = "none"))]
fn emit_dropped(count: u32) {
    println!("telemetry: {count} records overwritten before forwarding");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dht22_core::orchestrator::TriggerOrchestrator;
    use dht22_core::config::SensorConfig;
    use dht22_core::telemetry::{TelemetryEventKind, TelemetryPayload};

    fn filled(count: u64) -> TelemetryRecorder {
        let mut recorder = TelemetryRecorder::new();
        for at in 0..count {
            recorder.record(TelemetryEventKind::TriggerIssued, TelemetryPayload::None, at);
        }
        recorder
    }

    #[test]
    fn forwards_each_record_once() {
        let mut recorder = filled(3);
        let mut forwarder = TelemetryForwarder::new();

        let first = forwarder.collect(&recorder);
        assert_eq!(first.records.len(), 3);
        assert_eq!(first.dropped, 0);
        assert!(forwarder.collect(&recorder).records.is_empty());

        recorder.record(TelemetryEventKind::ReadingDecoded, TelemetryPayload::None, 9);
        let second = forwarder.collect(&recorder);
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].event, TelemetryEventKind::ReadingDecoded);
    }

    #[test]
    fn reports_records_lost_to_wraparound() {
        let recorder = filled(TELEMETRY_RING_CAPACITY as u64 + 5);
        let batch = TelemetryForwarder::new().collect(&recorder);
        assert_eq!(batch.records.len(), TELEMETRY_RING_CAPACITY);
        assert_eq!(batch.dropped, 5);
    }

    #[test]
    fn live_capture_defers_forwarding() {
        let mut orchestrator = TriggerOrchestrator::new(SensorConfig::default(), 0);
        let mut forwarder = TelemetryForwarder::new();

        orchestrator.begin_trigger(10).unwrap();
        assert!(forwarder.collect_when_quiet(&orchestrator).is_none());

        orchestrator.end_trigger(20);
        orchestrator.cleanup();
        let batch = forwarder.collect_when_quiet(&orchestrator).unwrap();
        assert_eq!(batch.dropped, 0);
        assert_eq!(batch.records[0].event, TelemetryEventKind::TriggerIssued);
    }
}
