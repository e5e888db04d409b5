//! Fixed-capacity store of inter-edge intervals.

use core::ops::Index;

use crate::protocol::EXPECTED_EDGE_COUNT;

/// Error returned when an append would exceed the capacity.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BufferFull;

/// Inter-edge intervals for the current cycle, in microseconds.
///
/// Only intervals recorded since the last [`clear`](Self::clear) are visible;
/// the length never exceeds [`EXPECTED_EDGE_COUNT`]. Clearing zeroes every
/// slot the previous cycle wrote.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeTimingBuffer {
    slots: [i32; EXPECTED_EDGE_COUNT],
    len: usize,
}

impl EdgeTimingBuffer {
    pub const CAPACITY: usize = EXPECTED_EDGE_COUNT;

    pub const fn new() -> Self {
        Self {
            slots: [0; EXPECTED_EDGE_COUNT],
            len: 0,
        }
    }

    /// Appends an interval, rejecting it once the buffer is full.
    pub fn push(&mut self, interval_us: i32) -> Result<(), BufferFull> {
        let slot = self.slots.get_mut(self.len).ok_or(BufferFull)?;
        *slot = interval_us;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == Self::CAPACITY
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.slots[..self.len]
    }

    /// Zeroes the recorded intervals and empties the buffer.
    pub fn clear(&mut self) {
        self.slots[..self.len].fill(0);
        self.len = 0;
    }
}

impl Default for EdgeTimingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for EdgeTimingBuffer {
    type Output = i32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.as_slice()[index]
    }
}

impl FromIterator<i32> for EdgeTimingBuffer {
    /// Collects up to [`EXPECTED_EDGE_COUNT`] intervals; extra items are dropped.
    fn from_iter<T: IntoIterator<Item = i32>>(iter: T) -> Self {
        let mut buffer = Self::new();
        for interval in iter {
            if buffer.push(interval).is_err() {
                break;
            }
        }
        buffer
    }
}
