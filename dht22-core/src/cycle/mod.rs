//! Per-cycle capture state: the protocol state machine, the interval buffer
//! and the previous-edge timestamp, owned together so a single lock covers
//! them.

pub mod buffer;
pub mod capture;
pub mod state;

pub use buffer::{BufferFull, EdgeTimingBuffer};
pub use capture::{EdgeOutcome, handle_edge};
pub use state::{CaptureFault, CycleState, ProtocolStateMachine, TransitionError};

use crate::TimestampMicros;

/// Aggregate mutated by the edge path and the deferred-work path.
#[derive(Clone, Debug, Default)]
pub struct CycleContext {
    machine: ProtocolStateMachine,
    buffer: EdgeTimingBuffer,
    prev_edge: Option<TimestampMicros>,
}

impl CycleContext {
    pub const fn new() -> Self {
        Self {
            machine: ProtocolStateMachine::new(),
            buffer: EdgeTimingBuffer::new(),
            prev_edge: None,
        }
    }

    pub const fn state(&self) -> CycleState {
        self.machine.state()
    }

    pub const fn is_idle(&self) -> bool {
        self.machine.is_idle()
    }

    pub fn buffer(&self) -> &EdgeTimingBuffer {
        &self.buffer
    }

    pub fn intervals(&self) -> &[i32] {
        self.buffer.as_slice()
    }

    /// Edges recorded so far in the current cycle.
    pub fn edges_seen(&self) -> usize {
        self.buffer.len()
    }

    /// Starts a new cycle at `now`.
    ///
    /// Clears the buffer and restarts interval measurement from `now`. Leaves
    /// everything untouched when a cycle is already live.
    pub fn begin(&mut self, now: TimestampMicros) -> Result<(), TransitionError> {
        self.machine.begin_trigger()?;
        self.buffer.clear();
        self.prev_edge = Some(now);
        Ok(())
    }

    /// Feeds one edge into the cycle.
    pub fn on_edge(&mut self, timestamp: TimestampMicros) -> EdgeOutcome {
        handle_edge(self, timestamp)
    }

    /// Returns the cycle to idle and forgets every recorded interval.
    ///
    /// Calling it repeatedly is the same as calling it once.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.buffer.clear();
        self.prev_edge = None;
    }
}
