//! Trigger orchestration shared between firmware and host targets.
//!
//! [`TriggerOrchestrator`] owns everything that decides what happens next:
//! the per-cycle capture state, the retry bookkeeping, the two timer
//! deadlines, the deferred-work queue and the telemetry ring. Targets supply
//! the clock, feed edges through [`on_edge`](TriggerOrchestrator::on_edge),
//! call [`poll_timers`](TriggerOrchestrator::poll_timers) when
//! [`next_deadline`](TriggerOrchestrator::next_deadline) elapses and execute
//! the [`WorkItem`]s returned by [`next_work`](TriggerOrchestrator::next_work).
//!
//! The request pulse blocks for more than 100 ms. Targets that run edges in a
//! separate context therefore use the split form: [`begin_trigger`] under the
//! lock, [`run_trigger_pulse`] without it, then [`end_trigger`] under the lock
//! again. Single-context targets can use [`run_work`] instead.
//!
//! [`begin_trigger`]: TriggerOrchestrator::begin_trigger
//! [`end_trigger`]: TriggerOrchestrator::end_trigger
//! [`run_work`]: TriggerOrchestrator::run_work
//! [`run_trigger_pulse`]: crate::protocol::run_trigger_pulse

use core::{fmt, time::Duration};

pub mod retry;
pub mod work;

pub use retry::RetryState;
pub use work::{WORK_QUEUE_CAPACITY, WorkItem, WorkQueue, WorkQueueError};

use crate::TimestampMicros;
use crate::config::{MIN_INTERVAL_MS, SensorConfig};
use crate::cycle::{CaptureFault, CycleContext, CycleState, EdgeOutcome};
use crate::decode::{DecodeError, RawReading, decode};
use crate::protocol::trigger::trigger_pulse_duration;
use crate::protocol::{
    DataLine, MAX_RETRY_ATTEMPTS, PulseDelay, RETRY_PERIOD, STALL_BACKOFF, STARTUP_DELAY,
    run_trigger_pulse,
};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};

/// Coarse orchestrator phase reported to status surfaces.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OrchestratorPhase {
    Idle,
    PulseInProgress,
    AwaitingRetryWindow,
}

impl OrchestratorPhase {
    pub const fn label(self) -> &'static str {
        match self {
            OrchestratorPhase::Idle => "idle",
            OrchestratorPhase::PulseInProgress => "pulse-in-progress",
            OrchestratorPhase::AwaitingRetryWindow => "awaiting-retry-window",
        }
    }
}

/// Reason a trigger request was turned down.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TriggerRejection {
    /// A cycle is already live or waiting for cleanup.
    CycleBusy(CycleState),
    /// Another request pulse is still being driven.
    PulseInFlight,
    /// Manual requests must be spaced by the minimum interval.
    TooSoon { retry_in_ms: u32 },
    /// Shutdown has started.
    ShuttingDown,
}

impl fmt::Display for TriggerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerRejection::CycleBusy(state) => write!(f, "cycle busy ({state})"),
            TriggerRejection::PulseInFlight => f.write_str("pulse already in flight"),
            TriggerRejection::TooSoon { retry_in_ms } => {
                write!(f, "too soon, retry in {retry_in_ms} ms")
            }
            TriggerRejection::ShuttingDown => f.write_str("shutting down"),
        }
    }
}

/// What a single call to [`TriggerOrchestrator::run_work`] did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WorkReport {
    Triggered,
    TriggerRejected(TriggerRejection),
    Decoded(Result<RawReading, DecodeError>),
    CleanedUp,
}

/// Single owned aggregate for one sensor.
pub struct TriggerOrchestrator {
    config: SensorConfig,
    cycle: CycleContext,
    retry: RetryState,
    work: WorkQueue,
    telemetry: TelemetryRecorder,
    last_reading: Option<RawReading>,
    last_request_at: Option<TimestampMicros>,
    pulse_in_progress: bool,
    autoupdate_deadline: Option<TimestampMicros>,
    retry_deadline: Option<TimestampMicros>,
    shutting_down: bool,
}

impl TriggerOrchestrator {
    /// Creates the orchestrator with the periodic timer armed shortly after
    /// `now`, so one reading is taken at startup even with autoupdate off.
    pub fn new(config: SensorConfig, now: TimestampMicros) -> Self {
        Self {
            config,
            cycle: CycleContext::new(),
            retry: RetryState::new(),
            work: WorkQueue::new(),
            telemetry: TelemetryRecorder::new(),
            last_reading: None,
            last_request_at: None,
            pulse_in_progress: false,
            autoupdate_deadline: Some(after(now, STARTUP_DELAY)),
            retry_deadline: None,
            shutting_down: false,
        }
    }

    pub const fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub const fn cycle(&self) -> &CycleContext {
        &self.cycle
    }

    pub const fn retry(&self) -> &RetryState {
        &self.retry
    }

    pub const fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub const fn work(&self) -> &WorkQueue {
        &self.work
    }

    /// Most recent successful reading. Failed cycles never overwrite it.
    pub const fn last_reading(&self) -> Option<&RawReading> {
        self.last_reading.as_ref()
    }

    pub const fn last_request_at(&self) -> Option<TimestampMicros> {
        self.last_request_at
    }

    pub const fn autoupdate_deadline(&self) -> Option<TimestampMicros> {
        self.autoupdate_deadline
    }

    pub const fn retry_deadline(&self) -> Option<TimestampMicros> {
        self.retry_deadline
    }

    pub const fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub const fn phase(&self) -> OrchestratorPhase {
        if self.pulse_in_progress {
            OrchestratorPhase::PulseInProgress
        } else if self.retry.is_pending() && self.retry_deadline.is_some() {
            OrchestratorPhase::AwaitingRetryWindow
        } else {
            OrchestratorPhase::Idle
        }
    }

    /// Earliest armed timer deadline.
    pub fn next_deadline(&self) -> Option<TimestampMicros> {
        match (self.autoupdate_deadline, self.retry_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Pops the oldest pending work item.
    pub fn next_work(&mut self) -> Option<WorkItem> {
        self.work.pop()
    }

    fn schedule(&mut self, item: WorkItem) {
        // Closed only during shutdown, where dropping new work is intended.
        let _ = self.work.schedule(item);
    }

    fn record(&mut self, event: TelemetryEventKind, payload: TelemetryPayload, now: TimestampMicros) {
        self.telemetry.record(event, payload, now);
    }

    /// Starts a cycle: Idle → Triggered, records the request time and marks
    /// the pulse as in flight. The caller then drives the pulse and calls
    /// [`end_trigger`](Self::end_trigger).
    pub fn begin_trigger(&mut self, now: TimestampMicros) -> Result<(), TriggerRejection> {
        let outcome = self.try_begin_trigger(now);
        match outcome {
            Ok(()) => self.record(
                TelemetryEventKind::TriggerIssued,
                TelemetryPayload::none(),
                now,
            ),
            Err(reason) => self.record(
                TelemetryEventKind::TriggerRejected,
                TelemetryPayload::Rejection(reason),
                now,
            ),
        }
        outcome
    }

    fn try_begin_trigger(&mut self, now: TimestampMicros) -> Result<(), TriggerRejection> {
        if self.shutting_down {
            return Err(TriggerRejection::ShuttingDown);
        }
        if self.pulse_in_progress {
            return Err(TriggerRejection::PulseInFlight);
        }
        self.cycle
            .begin(now)
            .map_err(|err| TriggerRejection::CycleBusy(err.from))?;
        self.pulse_in_progress = true;
        self.last_request_at = Some(now);
        Ok(())
    }

    /// Finishes the pulse. With autoupdate disabled this arms the retry
    /// timer unless it is already running.
    pub fn end_trigger(&mut self, now: TimestampMicros) {
        self.pulse_in_progress = false;
        if self.shutting_down || self.config.timing.autoupdate() || self.retry_deadline.is_some()
        {
            return;
        }
        self.retry.arm();
        self.retry_deadline = Some(after(now, RETRY_PERIOD));
        self.record(
            TelemetryEventKind::RetryArmed,
            TelemetryPayload::Retry {
                attempt: self.retry.attempts(),
                max: MAX_RETRY_ATTEMPTS,
            },
            now,
        );
    }

    /// Runs the whole request pulse in the calling context.
    ///
    /// Only valid when the cycle is idle and no pulse is in flight; otherwise
    /// nothing is driven and the rejection is returned.
    pub fn trigger_cycle<L, D>(
        &mut self,
        now: TimestampMicros,
        line: &mut L,
        delay: &mut D,
    ) -> Result<(), TriggerRejection>
    where
        L: DataLine + ?Sized,
        D: PulseDelay + ?Sized,
    {
        self.begin_trigger(now)?;
        run_trigger_pulse(line, delay);
        self.end_trigger(after(now, trigger_pulse_duration()));
        Ok(())
    }

    /// Edge notification entry point. Constant time; never blocks.
    pub fn on_edge(&mut self, timestamp: TimestampMicros) -> EdgeOutcome {
        let outcome = self.cycle.on_edge(timestamp);
        match outcome {
            EdgeOutcome::Recorded => {}
            EdgeOutcome::Completed => {
                self.schedule(WorkItem::Decode);
                self.record(
                    TelemetryEventKind::CaptureCompleted,
                    TelemetryPayload::none(),
                    timestamp,
                );
            }
            EdgeOutcome::Rejected(fault) => {
                // A queued trigger would be refused while the cycle sits in
                // the error state, so the reset has to run first.
                let _ = self.work.schedule_before(WorkItem::Cleanup, WorkItem::Trigger);
                let event = match fault {
                    CaptureFault::SpuriousEdge => TelemetryEventKind::SpuriousEdge,
                    CaptureFault::Overrun => TelemetryEventKind::CaptureOverrun,
                };
                let payload = TelemetryPayload::capture(self.cycle.edges_seen(), self.cycle.state());
                self.record(event, payload, timestamp);
            }
        }
        outcome
    }

    /// Decode path: turns the full buffer into a reading, then cleans up.
    ///
    /// A failure leaves the previous reading in place and lets the retry or
    /// periodic timer start the next attempt.
    pub fn process_capture(&mut self, now: TimestampMicros) -> Result<RawReading, DecodeError> {
        let result = decode(self.cycle.buffer(), now);
        match result {
            Ok(reading) => {
                self.last_reading = Some(reading);
                self.retry.clear();
                self.retry_deadline = None;
                self.record(
                    TelemetryEventKind::ReadingDecoded,
                    TelemetryPayload::Reading {
                        temperature_decis: reading.temperature_decis,
                        humidity_decis: reading.humidity_decis,
                    },
                    now,
                );
            }
            Err(DecodeError::ChecksumMismatch { expected, received }) => self.record(
                TelemetryEventKind::ChecksumMismatch,
                TelemetryPayload::Checksum { expected, received },
                now,
            ),
            Err(DecodeError::IncompleteCapture { captured }) => self.record(
                TelemetryEventKind::IncompleteCapture,
                TelemetryPayload::capture(captured, self.cycle.state()),
                now,
            ),
        }
        self.cleanup();
        result
    }

    /// Resets the buffer and the state machine to idle. Idempotent.
    pub fn cleanup(&mut self) {
        self.cycle.reset();
    }

    /// Executes one work item in the calling context.
    pub fn run_work<L, D>(
        &mut self,
        item: WorkItem,
        now: TimestampMicros,
        line: &mut L,
        delay: &mut D,
    ) -> WorkReport
    where
        L: DataLine + ?Sized,
        D: PulseDelay + ?Sized,
    {
        match item {
            WorkItem::Trigger => match self.trigger_cycle(now, line, delay) {
                Ok(()) => WorkReport::Triggered,
                Err(reason) => WorkReport::TriggerRejected(reason),
            },
            WorkItem::Decode => WorkReport::Decoded(self.process_capture(now)),
            WorkItem::Cleanup => {
                self.cleanup();
                WorkReport::CleanedUp
            }
        }
    }

    /// Fires every timer whose deadline is at or before `now`.
    pub fn poll_timers(&mut self, now: TimestampMicros) {
        if let Some(deadline) = self.autoupdate_deadline
            && now >= deadline
        {
            self.autoupdate_deadline = None;
            self.on_autoupdate_tick(now);
        }
        if let Some(deadline) = self.retry_deadline
            && now >= deadline
        {
            self.retry_deadline = None;
            self.on_retry_tick(now);
        }
    }

    fn on_autoupdate_tick(&mut self, now: TimestampMicros) {
        let mut backoff = Duration::ZERO;
        let state = self.cycle.state();
        if state.is_live() && !self.pulse_in_progress {
            self.record(
                TelemetryEventKind::CaptureStalled,
                TelemetryPayload::capture(self.cycle.edges_seen(), state),
                now,
            );
            self.cleanup();
            backoff = STALL_BACKOFF;
        }

        let timing = self.config.timing;
        if timing.autoupdate() {
            self.retry.clear();
            self.retry_deadline = None;
        }

        self.schedule(WorkItem::Trigger);

        if timing.autoupdate() && !self.shutting_down {
            self.autoupdate_deadline = Some(after(now, timing.interval() + backoff));
        }
    }

    fn on_retry_tick(&mut self, now: TimestampMicros) {
        if self.pulse_in_progress {
            // The cycle in flight stands in for this attempt.
            if !self.shutting_down {
                self.retry_deadline = Some(after(now, RETRY_PERIOD));
            }
            return;
        }

        if !self.config.timing.autoupdate() && self.retry.can_retry() {
            let attempt = self.retry.record_attempt();
            self.record(
                TelemetryEventKind::RetryAttempt,
                TelemetryPayload::Retry {
                    attempt,
                    max: MAX_RETRY_ATTEMPTS,
                },
                now,
            );
            self.cleanup();
            self.schedule(WorkItem::Trigger);
        } else {
            if self.retry.is_pending() && self.retry.attempts() >= MAX_RETRY_ATTEMPTS {
                self.record(
                    TelemetryEventKind::RetryExhausted,
                    TelemetryPayload::Retry {
                        attempt: self.retry.attempts(),
                        max: MAX_RETRY_ATTEMPTS,
                    },
                    now,
                );
                // Leave the line ready for a manual request.
                self.cleanup();
            }
            self.retry.clear();
        }

        if self.retry.is_pending() && !self.shutting_down {
            self.retry_deadline = Some(after(now, RETRY_PERIOD));
        }
    }

    /// Accepts a manual request when more than the minimum interval has
    /// passed since the last request pulse.
    pub fn manual_trigger(&mut self, now: TimestampMicros) -> Result<(), TriggerRejection> {
        let outcome = self.check_manual_spacing(now);
        match outcome {
            Ok(()) => self.schedule(WorkItem::Trigger),
            Err(reason) => self.record(
                TelemetryEventKind::TriggerRejected,
                TelemetryPayload::Rejection(reason),
                now,
            ),
        }
        outcome
    }

    fn check_manual_spacing(&self, now: TimestampMicros) -> Result<(), TriggerRejection> {
        if self.shutting_down {
            return Err(TriggerRejection::ShuttingDown);
        }
        let Some(last) = self.last_request_at else {
            return Ok(());
        };
        let earliest = after(last, Duration::from_millis(u64::from(MIN_INTERVAL_MS)));
        if now > earliest {
            return Ok(());
        }
        let remaining_ms = (earliest - now).div_ceil(1_000).max(1);
        Err(TriggerRejection::TooSoon {
            retry_in_ms: u32::try_from(remaining_ms).unwrap_or(u32::MAX),
        })
    }

    /// Enables or disables autoupdate.
    ///
    /// Enabling arms the periodic timer immediately when it is not armed;
    /// disabling cancels the pending periodic deadline.
    pub fn set_autoupdate(&mut self, enabled: bool, now: TimestampMicros) {
        self.config.timing.set_autoupdate(enabled);
        if self.shutting_down {
            return;
        }
        if enabled {
            if self.autoupdate_deadline.is_none() {
                self.autoupdate_deadline = Some(now);
            }
        } else {
            self.autoupdate_deadline = None;
        }
        self.record_config_change(TelemetryEventKind::AutoupdateChanged, now);
    }

    /// Stores a new interval, clamped into range, and returns the applied
    /// value. Takes effect when the periodic timer next re-arms.
    pub fn set_interval_ms(&mut self, requested: u32, now: TimestampMicros) -> u32 {
        let applied = self.config.timing.set_interval_ms(requested);
        self.record_config_change(TelemetryEventKind::IntervalChanged, now);
        applied
    }

    fn record_config_change(&mut self, event: TelemetryEventKind, now: TimestampMicros) {
        let payload = TelemetryPayload::Config {
            interval_ms: self.config.timing.interval_ms(),
            autoupdate: self.config.timing.autoupdate(),
        };
        self.record(event, payload, now);
    }

    /// Cancels both timers and closes the work queue.
    ///
    /// Work already queued stays available through
    /// [`next_work`](Self::next_work) so the executor can drain it before
    /// releasing the line. Triggers drained this way are rejected.
    pub fn shutdown(&mut self, now: TimestampMicros) {
        if self.shutting_down {
            return;
        }
        self.autoupdate_deadline = None;
        self.retry_deadline = None;
        self.shutting_down = true;
        self.work.close();
        self.record(
            TelemetryEventKind::ShutdownRequested,
            TelemetryPayload::none(),
            now,
        );
    }
}

/// `now` plus `duration`, saturating at the end of the timeline.
fn after(now: TimestampMicros, duration: Duration) -> TimestampMicros {
    now.saturating_add(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}
