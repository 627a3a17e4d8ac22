//! A 32-bit atomic reader/writer spinlock.
//!
//! One writer-held bit plus a 31-bit reader count packed into a single
//! atomic word. There is no blocking primitive here: both `rlock` and
//! `wlock` spin, yielding the thread between attempts.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU32, Ordering};

#[cfg(not(loom))]
use std::thread;

#[cfg(loom)]
use loom::thread;

/// The high bit of the state word: set while a writer holds (or is
/// waiting to hold) the lock.
const WRITER_BIT: u32 = 1 << 31;

/// A single-word reader/writer lock, uncontended-fast, fair-ish under
/// contention (a pending writer blocks new readers) but not linearizable
/// with respect to arrival order.
///
/// # Safety contract
///
/// A thread that holds a read lock must not call `wlock` on the same
/// lock instance before releasing it: there is no upgrade path, and
/// doing so deadlocks against itself (the `wlock` drain-phase spins
/// waiting for a reader count of zero that will never be vacated).
/// `unlock` must be called exactly once per successful `rlock`/`wlock`,
/// and the caller is responsible for knowing which kind of lock it is
/// releasing — this type does not track it.
#[derive(Debug)]
pub(crate) struct RWLock {
    state: AtomicU32,
}

impl RWLock {
    pub(crate) fn new() -> Self {
        RWLock {
            state: AtomicU32::new(0),
        }
    }

    /// Acquire a shared (read) lock. Spins while a writer holds or wants
    /// the lock.
    pub(crate) fn rlock(&self) {
        loop {
            let old = self.state.load(Ordering::Relaxed);
            if old & WRITER_BIT == 0
                && self
                    .state
                    .compare_exchange_weak(old, old + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return;
            }
            thread::yield_now();
        }
    }

    /// Acquire an exclusive (write) lock: first claim writer intent
    /// (blocking new readers), then drain existing readers.
    pub(crate) fn wlock(&self) {
        loop {
            let old = self.state.load(Ordering::Relaxed);
            if old & WRITER_BIT == 0
                && self
                    .state
                    .compare_exchange_weak(
                        old,
                        old | WRITER_BIT,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                break;
            }
            thread::yield_now();
        }

        while self.state.load(Ordering::Acquire) != WRITER_BIT {
            thread::yield_now();
        }
    }

    /// Release whichever kind of lock the caller is holding.
    pub(crate) fn unlock(&self) {
        if self.state.load(Ordering::Relaxed) == WRITER_BIT {
            self.state.store(0, Ordering::Release);
        } else {
            self.state.fetch_sub(1, Ordering::Release);
        }
    }
}
