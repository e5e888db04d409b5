use std::collections::VecDeque;
use std::time::Duration;

use dht22_core::TimestampMicros;
use dht22_core::config::{SensorConfig, TimingConfig};
use dht22_core::cycle::{CycleState, EdgeOutcome};
use dht22_core::decode::{SensorFrame, frame_to_intervals};
use dht22_core::orchestrator::{TriggerOrchestrator, TriggerRejection, WorkItem, WorkReport};
use dht22_core::protocol::{
    DataLine, LineAction, MAX_RETRY_ATTEMPTS, PulseDelay, TRIGGER_EDGE_COUNT,
};
use dht22_core::telemetry::TelemetryEventKind;

#[derive(Default)]
struct MockLine {
    actions: Vec<LineAction>,
}

impl DataLine for MockLine {
    fn apply(&mut self, action: LineAction) {
        self.actions.push(action);
    }
}

struct NoopDelay;

impl PulseDelay for NoopDelay {
    fn hold(&mut self, _: Duration) {}
}

#[derive(Copy, Clone, Debug)]
enum Reply {
    Healthy(SensorFrame),
    /// Only the echoes of our own pulse are seen.
    Silent,
    /// Frame with a corrupted checksum byte.
    Corrupt(SensorFrame),
}

/// Single-context executor driving the orchestrator against scripted replies.
struct Bench {
    orch: TriggerOrchestrator,
    now: TimestampMicros,
    line: MockLine,
    script: VecDeque<Reply>,
    fallback: Reply,
    triggers: usize,
}

impl Bench {
    fn new(autoupdate: bool, fallback: Reply) -> Self {
        let config = SensorConfig::new(6, TimingConfig::new(2_000, autoupdate));
        Self {
            orch: TriggerOrchestrator::new(config, 0),
            now: 0,
            line: MockLine::default(),
            script: VecDeque::new(),
            fallback,
            triggers: 0,
        }
    }

    fn then(mut self, reply: Reply) -> Self {
        self.script.push_back(reply);
        self
    }

    fn drain_work(&mut self) {
        while let Some(item) = self.orch.next_work() {
            let report = self
                .orch
                .run_work(item, self.now, &mut self.line, &mut NoopDelay);
            if report == WorkReport::Triggered {
                self.triggers += 1;
                self.respond();
            }
        }
    }

    fn respond(&mut self) {
        let reply = self.script.pop_front().unwrap_or(self.fallback);
        let intervals = match reply {
            Reply::Healthy(frame) => frame_to_intervals(&frame),
            Reply::Silent => frame_to_intervals(&SensorFrame::default()),
            Reply::Corrupt(frame) => {
                let mut bytes = frame.bytes();
                bytes[4] ^= 0x01;
                frame_to_intervals(&SensorFrame::from_bytes(bytes))
            }
        };
        let edges = match reply {
            Reply::Silent => TRIGGER_EDGE_COUNT,
            _ => intervals.len(),
        };

        let mut at = self.now;
        for interval in &intervals.as_slice()[..edges] {
            at += u64::try_from(*interval).unwrap();
            self.orch.on_edge(at);
        }
        self.now = at;
    }

    fn run_until(&mut self, until: TimestampMicros) {
        loop {
            self.drain_work();
            match self.orch.next_deadline() {
                Some(deadline) if deadline <= until => {
                    self.now = self.now.max(deadline);
                    self.orch.poll_timers(self.now);
                }
                _ => break,
            }
        }
        self.now = self.now.max(until);
    }

    fn count(&self, kind: TelemetryEventKind) -> usize {
        self.orch
            .telemetry()
            .oldest_first()
            .filter(|record| record.event == kind)
            .count()
    }
}

fn reference() -> SensorFrame {
    SensorFrame::from_bytes([0x01, 0x90, 0x00, 0xC8, 0x59])
}

const SECOND: TimestampMicros = 1_000_000;

#[test]
fn startup_reading_without_autoupdate_takes_one_cycle() {
    let mut bench = Bench::new(false, Reply::Healthy(reference()));
    bench.run_until(60 * SECOND);

    assert_eq!(bench.triggers, 1);
    let reading = bench.orch.last_reading().copied().unwrap();
    assert_eq!(reading.temperature_decis, 200);
    assert_eq!(reading.humidity_decis, 400);
    assert!(!bench.orch.retry().is_pending());
    assert_eq!(bench.orch.next_deadline(), None);
    assert!(bench.orch.cycle().is_idle());
    assert_eq!(
        bench.line.actions,
        [
            LineAction::ReleaseHigh,
            LineAction::DriveLow,
            LineAction::ReleaseHigh
        ]
    );
}

#[test]
fn retries_stop_after_the_attempt_budget() {
    let mut bench = Bench::new(false, Reply::Silent);
    bench.run_until(120 * SECOND);

    let budget = usize::from(MAX_RETRY_ATTEMPTS);
    assert_eq!(bench.triggers, 1 + budget);
    assert_eq!(bench.count(TelemetryEventKind::RetryAttempt), budget);
    assert_eq!(bench.count(TelemetryEventKind::RetryExhausted), 1);
    assert_eq!(bench.orch.retry().attempts(), 0);
    assert!(!bench.orch.retry().is_pending());
    assert_eq!(bench.orch.next_deadline(), None);
    assert!(bench.orch.last_reading().is_none());

    // Nothing else happens on its own.
    bench.run_until(600 * SECOND);
    assert_eq!(bench.triggers, 1 + budget);

    // A manual request starts a fresh retry window.
    bench.fallback = Reply::Healthy(reference());
    bench.orch.manual_trigger(bench.now).unwrap();
    bench.run_until(bench.now + 1);
    assert_eq!(bench.triggers, 2 + budget);
    assert!(bench.orch.last_reading().is_some());
}

#[test]
fn checksum_failure_is_retried_and_recovers() {
    let mut bench =
        Bench::new(false, Reply::Healthy(reference())).then(Reply::Corrupt(reference()));
    bench.run_until(2 * SECOND);

    assert!(bench.orch.last_reading().is_none());
    assert_eq!(bench.orch.telemetry().counters().checksum_failures, 1);
    assert!(bench.orch.retry().is_pending());
    assert!(bench.orch.cycle().is_idle());

    bench.run_until(10 * SECOND);
    assert_eq!(bench.triggers, 2);
    assert_eq!(bench.orch.last_reading().map(|r| r.temperature_decis), Some(200));
    assert_eq!(bench.orch.retry().attempts(), 0);
    assert_eq!(bench.orch.retry_deadline(), None);
}

#[test]
fn stalled_cycle_is_reset_with_backoff() {
    let mut bench = Bench::new(true, Reply::Healthy(reference())).then(Reply::Silent);
    bench.run_until(SECOND);
    assert_eq!(bench.orch.cycle().state(), CycleState::Capturing);
    assert_eq!(bench.orch.autoupdate_deadline(), Some(100 + 2 * SECOND));

    bench.run_until(3 * SECOND);
    assert_eq!(bench.orch.telemetry().counters().stalls, 1);
    assert_eq!(bench.triggers, 2);
    assert!(bench.orch.last_reading().is_some());
    // Interval plus the one-second backoff.
    assert_eq!(bench.orch.autoupdate_deadline(), Some(100 + 5 * SECOND));
}

#[test]
fn failed_cycle_keeps_last_good_reading() {
    let hot = SensorFrame::from_reading(351, 220);
    let mut bench = Bench::new(true, Reply::Corrupt(hot)).then(Reply::Healthy(hot));
    bench.run_until(SECOND);
    let first = bench.orch.last_reading().copied().unwrap();

    bench.run_until(3 * SECOND);
    assert_eq!(bench.triggers, 2);
    assert_eq!(bench.orch.telemetry().counters().checksum_failures, 1);
    assert_eq!(bench.orch.last_reading().copied(), Some(first));
}

#[test]
fn periodic_mode_keeps_reading_at_the_interval() {
    let mut bench = Bench::new(true, Reply::Healthy(reference()));
    bench.run_until(10 * SECOND);

    // Ticks at 100us, then every 2 s.
    assert_eq!(bench.triggers, 5);
    assert_eq!(bench.orch.telemetry().counters().readings, 5);
    assert_eq!(bench.orch.retry_deadline(), None);
}

#[test]
fn spurious_edge_while_idle_only_requests_cleanup() {
    let mut bench = Bench::new(false, Reply::Healthy(reference()));
    bench.run_until(SECOND);
    let reading = bench.orch.last_reading().copied();

    assert!(matches!(
        bench.orch.on_edge(bench.now + 10),
        EdgeOutcome::Rejected(_)
    ));
    assert_eq!(bench.orch.work().iter().copied().collect::<Vec<_>>(), [WorkItem::Cleanup]);

    bench.drain_work();
    assert!(bench.orch.cycle().is_idle());
    assert_eq!(bench.orch.last_reading().copied(), reading);
    assert_eq!(bench.orch.telemetry().counters().spurious_edges, 1);
}

#[test]
fn late_edge_does_not_preempt_pending_decode() {
    let mut orch = TriggerOrchestrator::new(SensorConfig::default(), 0);
    orch.begin_trigger(0).unwrap();
    orch.end_trigger(0);

    let mut at = 0;
    for interval in frame_to_intervals(&reference()).as_slice() {
        at += u64::try_from(*interval).unwrap();
        orch.on_edge(at);
    }
    assert_eq!(orch.cycle().state(), CycleState::Finished);
    orch.on_edge(at + 50);

    assert_eq!(orch.next_work(), Some(WorkItem::Decode));
    assert!(orch.process_capture(at + 60).is_ok());
    assert_eq!(orch.next_work(), Some(WorkItem::Cleanup));
    orch.cleanup();
    assert!(orch.cycle().is_idle());
}

#[test]
fn manual_trigger_respects_minimum_spacing() {
    let mut bench = Bench::new(false, Reply::Healthy(reference()));
    bench.run_until(SECOND);
    let requested_at = bench.orch.last_request_at().unwrap();

    assert!(matches!(
        bench.orch.manual_trigger(requested_at + SECOND),
        Err(TriggerRejection::TooSoon { .. })
    ));
    assert!(bench.orch.manual_trigger(requested_at + 2 * SECOND + 1).is_ok());
}

#[test]
fn enabling_autoupdate_takes_over_from_retry() {
    let mut bench = Bench::new(false, Reply::Silent);
    bench.run_until(SECOND);
    assert!(bench.orch.retry().is_pending());

    bench.fallback = Reply::Healthy(reference());
    bench.orch.set_autoupdate(true, bench.now);
    bench.run_until(bench.now + 1);

    assert!(!bench.orch.retry().is_pending());
    assert_eq!(bench.orch.retry_deadline(), None);
    assert_eq!(bench.orch.telemetry().counters().stalls, 1);
    assert!(bench.orch.last_reading().is_some());
}

#[test]
fn shutdown_drains_queued_work_then_goes_quiet() {
    let mut orch = TriggerOrchestrator::new(SensorConfig::default(), 0);
    orch.begin_trigger(0).unwrap();
    orch.end_trigger(0);
    let mut at = 0;
    for interval in frame_to_intervals(&reference()).as_slice() {
        at += u64::try_from(*interval).unwrap();
        orch.on_edge(at);
    }
    orch.manual_trigger(at + 3 * SECOND).unwrap();

    orch.shutdown(at + 3 * SECOND);
    assert_eq!(orch.next_deadline(), None);

    let mut line = MockLine::default();
    let mut reports = Vec::new();
    while let Some(item) = orch.next_work() {
        reports.push(orch.run_work(item, at + 3 * SECOND, &mut line, &mut NoopDelay));
    }
    line.release();

    assert!(matches!(reports[0], WorkReport::Decoded(Ok(_))));
    assert_eq!(
        reports[1],
        WorkReport::TriggerRejected(TriggerRejection::ShuttingDown)
    );
    assert_eq!(line.actions, [LineAction::ReleaseHigh]);
    assert!(orch.last_reading().is_some());

    orch.poll_timers(u64::MAX);
    assert!(orch.next_work().is_none());
}
