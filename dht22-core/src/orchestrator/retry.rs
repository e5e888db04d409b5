//! Bounded retry bookkeeping used while autoupdate is disabled.

use crate::protocol::MAX_RETRY_ATTEMPTS;

/// Retry-in-progress flag plus the attempts spent on the current failure.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RetryState {
    pending: bool,
    attempts: u8,
}

impl RetryState {
    pub const fn new() -> Self {
        Self {
            pending: false,
            attempts: 0,
        }
    }

    /// Returns `true` while a reading is still owed to the user.
    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    pub const fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Returns `true` when another attempt fits in the budget.
    pub const fn can_retry(&self) -> bool {
        self.pending && self.attempts < MAX_RETRY_ATTEMPTS
    }

    /// Marks that the most recent trigger still needs a successful decode.
    pub fn arm(&mut self) {
        self.pending = true;
    }

    /// Spends one attempt and returns the new attempt number.
    pub fn record_attempt(&mut self) -> u8 {
        self.attempts = self.attempts.saturating_add(1).min(MAX_RETRY_ATTEMPTS);
        self.attempts
    }

    /// Forgets the pending failure and the attempt count.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
