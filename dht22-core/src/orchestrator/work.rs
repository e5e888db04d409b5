//! Deferred-work queue.
//!
//! Work items run in the order they were scheduled. Scheduling an item that is
//! already pending does nothing, so the queue never holds more than one copy of
//! each kind.

use core::fmt;

use heapless::Deque;

/// Kinds of deferred work the orchestrator requests.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WorkItem {
    /// Run the request pulse for a new cycle.
    Trigger,
    /// Decode the full buffer and publish the reading.
    Decode,
    /// Reset the buffer and state machine.
    Cleanup,
}

impl WorkItem {
    pub const fn label(self) -> &'static str {
        match self {
            WorkItem::Trigger => "trigger",
            WorkItem::Decode => "decode",
            WorkItem::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One slot per [`WorkItem`] kind.
pub const WORK_QUEUE_CAPACITY: usize = 3;

/// Reasons a work item could not be queued.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WorkQueueError {
    /// The queue was closed for shutdown.
    Closed,
    /// No slot left. Cannot happen while items are coalesced.
    Full,
}

impl fmt::Display for WorkQueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkQueueError::Closed => f.write_str("work queue closed"),
            WorkQueueError::Full => f.write_str("work queue full"),
        }
    }
}

/// Coalescing FIFO of pending work.
#[derive(Clone, Debug, Default)]
pub struct WorkQueue {
    items: Deque<WorkItem, WORK_QUEUE_CAPACITY>,
    closed: bool,
}

impl WorkQueue {
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
            closed: false,
        }
    }

    /// Queues `item` unless it is already pending.
    ///
    /// Returns `Ok(true)` when the item was added and `Ok(false)` when it was
    /// merged into an identical pending item.
    pub fn schedule(&mut self, item: WorkItem) -> Result<bool, WorkQueueError> {
        if self.closed {
            return Err(WorkQueueError::Closed);
        }
        if self.contains(item) {
            return Ok(false);
        }
        self.items
            .push_back(item)
            .map(|()| true)
            .map_err(|_| WorkQueueError::Full)
    }

    /// Queues `item` so it runs before a pending `successor`, leaving every
    /// other item in place. An `item` already queued behind `successor` is
    /// moved forward.
    pub fn schedule_before(
        &mut self,
        item: WorkItem,
        successor: WorkItem,
    ) -> Result<bool, WorkQueueError> {
        if self.closed {
            return Err(WorkQueueError::Closed);
        }
        if !self.contains(successor) {
            return self.schedule(item);
        }

        let added = !self.contains(item);
        let mut reordered: Deque<WorkItem, WORK_QUEUE_CAPACITY> = Deque::new();
        for pending in self.items.iter().copied().filter(|pending| *pending != item) {
            if pending == successor {
                reordered
                    .push_back(item)
                    .map_err(|_| WorkQueueError::Full)?;
            }
            reordered
                .push_back(pending)
                .map_err(|_| WorkQueueError::Full)?;
        }
        self.items = reordered;
        Ok(added)
    }

    /// Removes the oldest pending item.
    pub fn pop(&mut self) -> Option<WorkItem> {
        self.items.pop_front()
    }

    pub fn contains(&self, item: WorkItem) -> bool {
        self.items.iter().any(|pending| *pending == item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> + '_ {
        self.items.iter()
    }

    /// Rejects further scheduling. Items already queued stay available to
    /// [`pop`](Self::pop) so they can be drained.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}
