//! Bounded queue of idle connections

use std::collections::VecDeque;

use tokio::time::Instant;

/// An idle connection owned by the pool
pub(crate) struct IdleConnection<C> {
    pub(crate) connection: C,
    pub(crate) idle_since: Instant,
}

impl<C> IdleConnection<C> {
    pub(crate) fn new(connection: C) -> Self {
        Self {
            connection,
            idle_since: Instant::now(),
        }
    }
}

/// Bounded FIFO of idle connections
///
/// Pushes and pops never wait: a push into a full set hands the connection
/// back, a pop from an empty set returns `None`. The set itself is not
/// synchronised; the pool keeps it behind its bookkeeping mutex so that
/// membership changes and counter updates happen together.
pub(crate) struct FreeSet<C> {
    entries: VecDeque<IdleConnection<C>>,
    capacity: usize,
}

impl<C> FreeSet<C> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Push to the back, or give the entry back if the set is full
    pub(crate) fn try_push(
        &mut self,
        entry: IdleConnection<C>,
    ) -> Result<(), IdleConnection<C>> {
        if self.is_full() {
            return Err(entry);
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Pop the connection that has been idle the longest
    pub(crate) fn try_pop(&mut self) -> Option<IdleConnection<C>> {
        self.entries.pop_front()
    }

    /// Pop up to `n` entries from the front
    pub(crate) fn take(&mut self, n: usize) -> Vec<IdleConnection<C>> {
        let n = n.min(self.entries.len());
        self.entries.drain(..n).collect()
    }
}
