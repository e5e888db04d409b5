//! Finite-state model of a single read cycle.

use core::fmt;

/// Reason a cycle was forced into the error state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CaptureFault {
    /// Edge observed while no cycle was expecting one.
    SpuriousEdge,
    /// More edges arrived than the buffer can hold.
    Overrun,
}

impl fmt::Display for CaptureFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureFault::SpuriousEdge => f.write_str("spurious edge"),
            CaptureFault::Overrun => f.write_str("capture overrun"),
        }
    }
}

/// Phases of one trigger → capture → decode cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Triggered,
    Capturing,
    Finished,
    Error(CaptureFault),
}

impl CycleState {
    /// Returns `true` while the cycle still expects edges.
    pub const fn is_live(self) -> bool {
        matches!(self, CycleState::Triggered | CycleState::Capturing)
    }

    /// Returns `true` when the cycle is waiting for a decode or cleanup.
    pub const fn is_terminal(self) -> bool {
        matches!(self, CycleState::Finished | CycleState::Error(_))
    }

    /// Short label used by logs and the emulator.
    pub const fn label(self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::Triggered => "triggered",
            CycleState::Capturing => "capturing",
            CycleState::Finished => "finished",
            CycleState::Error(_) => "error",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleState::Error(fault) => write!(f, "error ({fault})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Failure reported when an event is not legal in the current state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionError {
    pub from: CycleState,
    pub to: CycleState,
}

impl TransitionError {
    /// Creates a new transition error describing the attempted states.
    pub const fn new(from: CycleState, to: CycleState) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal transition {} -> {}", self.from, self.to)
    }
}

/// State machine shared by the edge path and the orchestrator.
///
/// Every transition is caused by exactly one explicit event; nothing advances
/// on its own.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ProtocolStateMachine {
    state: CycleState,
}

impl ProtocolStateMachine {
    pub const fn new() -> Self {
        Self {
            state: CycleState::Idle,
        }
    }

    pub const fn state(&self) -> CycleState {
        self.state
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self.state, CycleState::Idle)
    }

    /// Idle → Triggered. Leaves the state untouched from anywhere else.
    pub fn begin_trigger(&mut self) -> Result<(), TransitionError> {
        if !self.is_idle() {
            return Err(TransitionError::new(self.state, CycleState::Triggered));
        }
        self.state = CycleState::Triggered;
        Ok(())
    }

    /// Records an observed edge and returns the resulting state.
    ///
    /// Triggered and Capturing move to (or stay in) Capturing; an edge in any
    /// other state is spurious and forces the error state.
    pub fn on_edge(&mut self) -> CycleState {
        self.state = match self.state {
            CycleState::Triggered | CycleState::Capturing => CycleState::Capturing,
            CycleState::Idle | CycleState::Finished | CycleState::Error(_) => {
                CycleState::Error(CaptureFault::SpuriousEdge)
            }
        };
        self.state
    }

    /// Capturing → Finished.
    pub fn on_capacity_reached(&mut self) -> Result<(), TransitionError> {
        if self.state != CycleState::Capturing {
            return Err(TransitionError::new(self.state, CycleState::Finished));
        }
        self.state = CycleState::Finished;
        Ok(())
    }

    /// Forces the error state with the supplied fault.
    pub fn fail(&mut self, fault: CaptureFault) {
        self.state = CycleState::Error(fault);
    }

    /// Unconditionally returns to idle.
    pub fn reset(&mut self) {
        self.state = CycleState::Idle;
    }
}
