use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// An unbounded FIFO queue whose consumers wait a bounded amount of time for
/// an item to show up.
///
/// Every operation takes the same lock. [`pop`](Self::pop) releases it while
/// blocked on the condition variable, so producers are never held up by
/// waiting consumers.
pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    signal: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
        }
    }

    /// Creates an empty queue with space preallocated for `capacity` items.
    ///
    /// The queue still grows past `capacity` on demand.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            signal: Condvar::new(),
        }
    }

    /// Appends an item and wakes every waiting consumer.
    pub fn push(&self, item: T) {
        let mut items = self.lock();
        items.push_back(item);
        // Waiters that lose the race re-check and go back to sleep.
        self.signal.notify_all();
    }

    /// Removes the oldest item, waiting up to `timeout` for one to be pushed.
    ///
    /// Returns `None` once the timeout has elapsed with the queue still empty.
    /// A zero timeout never blocks.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let items = self.lock();
        let deadline = Instant::now().checked_add(timeout);
        self.wait_pop(items, deadline)
    }

    /// Same as [`pop`](Self::pop) with the timeout given in fractional seconds.
    ///
    /// Zero, negative and NaN timeouts are treated as already expired. A
    /// timeout too large to be represented waits until an item arrives.
    pub fn pop_secs(&self, secs: f64) -> Option<T> {
        let timeout = if secs > 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        self.pop(timeout)
    }

    /// Removes the oldest item, waiting until `deadline` for one to be pushed.
    pub fn pop_until(&self, deadline: Instant) -> Option<T> {
        let items = self.lock();
        self.wait_pop(items, Some(deadline))
    }

    /// Removes the oldest item if there is one, without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Returns the number of resident items.
    ///
    /// The count is stale as soon as it is returned and should only be used
    /// for diagnostics.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A `None` deadline means the requested timeout overflowed `Instant`.
    fn wait_pop(
        &self,
        mut items: MutexGuard<'_, VecDeque<T>>,
        deadline: Option<Instant>,
    ) -> Option<T> {
        let mut waited = false;
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }

            items = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        if waited {
                            tracing::trace!("timed out waiting for an item");
                        }
                        return None;
                    }
                    tracing::trace!("waiting for an item, remaining={remaining:?}");
                    // The timeout flag is ignored, the deadline is re-checked instead.
                    let (items, _) = self
                        .signal
                        .wait_timeout(items, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    items
                },
                None => {
                    tracing::trace!("waiting for an item without deadline");
                    self.signal
                        .wait(items)
                        .unwrap_or_else(PoisonError::into_inner)
                },
            };
            waited = true;
            tracing::trace!("woke up, size={}", items.len());
        }
    }

    // Each critical section is a single `VecDeque` call, so a panic elsewhere
    // can never leave the items half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingQueue")
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}
