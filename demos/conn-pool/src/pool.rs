use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use handoff::BlockingQueue;

#[derive(Debug)]
pub struct Conn {
    pub id: usize,
    pub uses: usize,
}

/// A fixed-size pool of fake connections, opened lazily.
pub struct Pool {
    idle: BlockingQueue<Conn>,
    opened: AtomicUsize,
    max_conns: usize,
}

impl Pool {
    pub fn new(max_conns: NonZeroUsize) -> Self {
        Self {
            idle: BlockingQueue::with_capacity(max_conns.get()),
            opened: AtomicUsize::new(0),
            max_conns: max_conns.get(),
        }
    }

    /// Hands out an idle connection, opens a new one if the pool still has
    /// room, or waits up to `timeout` for one to be checked in.
    pub fn checkout(&self, timeout: Duration) -> Option<Conn> {
        if let Some(conn) = self.idle.try_pop() {
            return Some(conn);
        }
        // A checkin racing past the idle check may leave one connection idle
        // while a new one is opened. `max_conns` still bounds the total.
        if let Some(conn) = self.open() {
            tracing::info!("opened connection, id={}", conn.id);
            return Some(conn);
        }
        self.idle.pop(timeout)
    }

    pub fn checkin(&self, mut conn: Conn) {
        conn.uses += 1;
        self.idle.push(conn);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }

    pub fn idle(&self) -> usize {
        self.idle.size()
    }

    pub fn drain(&self) -> Vec<Conn> {
        std::iter::from_fn(|| self.idle.try_pop()).collect()
    }

    fn open(&self) -> Option<Conn> {
        self.opened
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_conns).then_some(n + 1)
            })
            .ok()
            .map(|id| Conn { id, uses: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn pool(max_conns: usize) -> Pool {
        Pool::new(NonZeroUsize::new(max_conns).unwrap())
    }

    #[test]
    fn opens_up_to_limit() {
        let pool = pool(2);
        let a = pool.checkout(Duration::ZERO).unwrap();
        let b = pool.checkout(Duration::ZERO).unwrap();
        assert_ne!(a.id, b.id);
        assert!(pool.checkout(Duration::ZERO).is_none());
        assert_eq!(pool.opened(), 2);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn reuses_checked_in_connection() {
        let pool = pool(1);
        let conn = pool.checkout(Duration::ZERO).unwrap();
        pool.checkin(conn);
        let conn = pool.checkout(Duration::ZERO).unwrap();
        assert_eq!((conn.id, conn.uses), (0, 1));
        assert_eq!(pool.opened(), 1);
    }

    #[test]
    fn exhausted_checkout_waits_for_timeout() {
        let pool = pool(1);
        let _conn = pool.checkout(Duration::ZERO).unwrap();
        let timeout = Duration::from_millis(50);
        let now = Instant::now();
        assert!(pool.checkout(timeout).is_none());
        assert!(now.elapsed() >= timeout);
    }

    #[test]
    fn waiter_receives_checked_in_connection() {
        let pool = pool(1);
        let conn = pool.checkout(Duration::ZERO).unwrap();
        std::thread::scope(|cx| {
            cx.spawn(|| {
                std::thread::sleep(Duration::from_millis(30));
                pool.checkin(conn);
            });
            let conn = pool.checkout(Duration::from_secs(30)).unwrap();
            assert_eq!(conn.id, 0);
        });
        assert_eq!(pool.opened(), 1);
    }
}
