//! Edge notification path.
//!
//! Runs once per electrical edge. It never blocks, never allocates, and does a
//! constant amount of work so it is safe to call from an interrupt context.

use super::{CaptureFault, CycleContext, CycleState};
use crate::TimestampMicros;

/// Result of feeding one edge into the current cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeOutcome {
    /// Interval stored; more edges are expected.
    Recorded,
    /// Interval stored and the buffer is now full. The caller schedules the
    /// decode path.
    Completed,
    /// Edge discarded and the cycle forced into the error state. The caller
    /// schedules cleanup.
    Rejected(CaptureFault),
}

/// Records the edge observed at `timestamp` against `ctx`.
pub fn handle_edge(ctx: &mut CycleContext, timestamp: TimestampMicros) -> EdgeOutcome {
    if !ctx.machine.state().is_live() {
        return match ctx.machine.on_edge() {
            CycleState::Error(fault) => EdgeOutcome::Rejected(fault),
            _ => EdgeOutcome::Rejected(CaptureFault::SpuriousEdge),
        };
    }

    let interval = interval_since(ctx.prev_edge, timestamp);
    if ctx.buffer.push(interval).is_err() {
        ctx.machine.fail(CaptureFault::Overrun);
        return EdgeOutcome::Rejected(CaptureFault::Overrun);
    }

    ctx.machine.on_edge();
    ctx.prev_edge = Some(timestamp);

    if ctx.buffer.is_full() {
        // The machine was moved to Capturing just above, so this cannot fail.
        let _ = ctx.machine.on_capacity_reached();
        return EdgeOutcome::Completed;
    }

    EdgeOutcome::Recorded
}

/// Whole microseconds between two edges, saturated into `i32`.
fn interval_since(previous: Option<TimestampMicros>, now: TimestampMicros) -> i32 {
    let elapsed = previous.map_or(0, |prev| now.saturating_sub(prev));
    i32::try_from(elapsed).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::EdgeTimingBuffer;

    fn triggered_at(now: TimestampMicros) -> CycleContext {
        let mut ctx = CycleContext::new();
        ctx.begin(now).unwrap();
        ctx
    }

    #[test]
    fn intervals_are_measured_from_trigger_start() {
        let mut ctx = triggered_at(1_000);

        assert_eq!(handle_edge(&mut ctx, 1_250), EdgeOutcome::Recorded);
        assert_eq!(handle_edge(&mut ctx, 1_330), EdgeOutcome::Recorded);

        assert_eq!(ctx.intervals(), &[250, 80]);
        assert_eq!(ctx.state(), CycleState::Capturing);
    }

    #[test]
    fn full_buffer_completes_exactly_once() {
        let mut ctx = triggered_at(0);
        let mut completions = 0;
        for edge in 1..=EdgeTimingBuffer::CAPACITY as u64 {
            if handle_edge(&mut ctx, edge * 10) == EdgeOutcome::Completed {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(ctx.state(), CycleState::Finished);

        // A late edge after completion is spurious.
        assert_eq!(
            handle_edge(&mut ctx, 10_000),
            EdgeOutcome::Rejected(CaptureFault::SpuriousEdge)
        );
        assert_eq!(ctx.intervals().len(), EdgeTimingBuffer::CAPACITY);
    }

    #[test]
    fn short_sequences_never_finish() {
        let mut ctx = triggered_at(0);
        for edge in 1..EdgeTimingBuffer::CAPACITY as u64 {
            assert_eq!(handle_edge(&mut ctx, edge * 10), EdgeOutcome::Recorded);
        }
        assert_eq!(ctx.state(), CycleState::Capturing);
    }

    #[test]
    fn edge_while_idle_is_rejected_and_discarded() {
        let mut ctx = CycleContext::new();
        assert_eq!(
            handle_edge(&mut ctx, 5),
            EdgeOutcome::Rejected(CaptureFault::SpuriousEdge)
        );
        assert!(ctx.intervals().is_empty());
        assert_eq!(ctx.state(), CycleState::Error(CaptureFault::SpuriousEdge));
    }

    #[test]
    fn huge_gaps_saturate() {
        let mut ctx = triggered_at(0);
        handle_edge(&mut ctx, u64::MAX);
        assert_eq!(ctx.intervals(), &[i32::MAX]);
    }
}
