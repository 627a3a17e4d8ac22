//! Model-checked interleavings of the hand-over-hand locking core,
//! kept separate from the regular thread-based tests. Runs only under
//! `RUSTFLAGS="--cfg loom" cargo test --test loom --release`; the
//! crate itself swaps in `loom`'s atomics/thread shims whenever
//! `cfg(loom)` is set (see `src/rwlock.rs`).

#![cfg(loom)]

use std::sync::Arc;

use loom::sync::atomic::{AtomicU32, Ordering};
use loom::thread;

/// A loom-local reimplementation of the exact CAS sequence in
/// `src/rwlock.rs`. `RWLock` itself is private to the crate, so this
/// mirrors its two operations over `loom`'s atomics directly rather
/// than trying to reach `pub(crate)` items from an external test
/// binary — loom needs to see every atomic op on its own shims to
/// explore interleavings, so this duplication is deliberate, not
/// laziness.
const WRITER_BIT: u32 = 1 << 31;

fn rlock(state: &AtomicU32) {
    loop {
        let old = state.load(Ordering::Relaxed);
        if old & WRITER_BIT == 0
            && state
                .compare_exchange_weak(old, old + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        {
            return;
        }
        thread::yield_now();
    }
}

fn wlock(state: &AtomicU32) {
    loop {
        let old = state.load(Ordering::Relaxed);
        if old & WRITER_BIT == 0
            && state
                .compare_exchange_weak(old, old | WRITER_BIT, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        {
            break;
        }
        thread::yield_now();
    }
    while state.load(Ordering::Acquire) != WRITER_BIT {
        thread::yield_now();
    }
}

fn unlock(state: &AtomicU32) {
    if state.load(Ordering::Relaxed) == WRITER_BIT {
        state.store(0, Ordering::Release);
    } else {
        state.fetch_sub(1, Ordering::Release);
    }
}

#[test]
fn two_readers_never_see_a_writer_between_them() {
    loom::model(|| {
        let state = Arc::new(AtomicU32::new(0));
        let guarded = Arc::new(loom::sync::atomic::AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let state = Arc::clone(&state);
                let guarded = Arc::clone(&guarded);
                thread::spawn(move || {
                    rlock(&state);
                    guarded.fetch_add(1, Ordering::Relaxed);
                    guarded.fetch_sub(1, Ordering::Relaxed);
                    unlock(&state);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(guarded.load(Ordering::Relaxed), 0);
    });
}

#[test]
fn writer_excludes_a_concurrent_reader() {
    loom::model(|| {
        let state = Arc::new(AtomicU32::new(0));
        let inside_writer = Arc::new(loom::sync::atomic::AtomicUsize::new(0));

        let w = {
            let state = Arc::clone(&state);
            let inside_writer = Arc::clone(&inside_writer);
            thread::spawn(move || {
                wlock(&state);
                inside_writer.store(1, Ordering::SeqCst);
                inside_writer.store(0, Ordering::SeqCst);
                unlock(&state);
            })
        };
        let r = {
            let state = Arc::clone(&state);
            let inside_writer = Arc::clone(&inside_writer);
            thread::spawn(move || {
                rlock(&state);
                assert_eq!(inside_writer.load(Ordering::SeqCst), 0);
                unlock(&state);
            })
        };
        w.join().unwrap();
        r.join().unwrap();
    });
}
