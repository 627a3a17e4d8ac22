//! Multi-threaded stress scenarios: concurrent `push_back`, a racing
//! insert/erase pair, and a mixed-workload soak that exercises every
//! structural operation at once while validating the doubly-linked
//! chain's shape afterward.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use concurrent_dlist::List;

/// Walks the chain both ways and checks that every `node.next.prev ==
/// node` / `node.prev.next == node`, and that the traversal count
/// matches `size()` at quiescence.
fn assert_chain_is_consistent<T: Clone + PartialEq + std::fmt::Debug>(list: &List<T>) {
    let mut forward = Vec::new();
    let mut it = list.begin();
    let end = list.end();
    while it != end {
        forward.push(it.get());
        it.move_next();
    }
    assert_eq!(forward.len(), list.size());

    let mut backward = Vec::new();
    let mut it = list.end();
    let begin = list.begin();
    while it != begin {
        it.move_prev();
        backward.push(it.get());
    }
    backward.reverse();
    assert_eq!(forward, backward);
}

#[test]
fn concurrent_push_back_preserves_every_element() {
    let _ = env_logger::try_init();
    let list = Arc::new(List::<u64>::new());
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 1000;

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    list.push_back(t * PER_THREAD + i);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(list.size() as u64, THREADS * PER_THREAD);

    let mut seen = Vec::new();
    let mut it = list.begin();
    let end = list.end();
    while it != end {
        seen.push(it.get());
        it.move_next();
    }
    seen.sort_unstable();
    let expected: Vec<u64> = (0..THREADS * PER_THREAD).collect();
    assert_eq!(seen, expected);
}

#[test]
fn racing_insert_and_erase_never_corrupts_the_chain() {
    for _ in 0..20 {
        let list = Arc::new(List::<i32>::new());
        list.push_back(1);
        list.push_back(2);

        let inserter = {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                let anchor = list.find(1);
                list.insert(&anchor, 100);
            })
        };
        let eraser = {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                let target = list.find(2);
                if target != list.end() {
                    list.erase(target);
                }
            })
        };
        inserter.join().unwrap();
        eraser.join().unwrap();

        // Whichever interleaving won, the chain itself must still be a
        // consistent doubly-linked list with no dangling links.
        assert_chain_is_consistent(&list);
        assert!(list.size() == 2 || list.size() == 1);
    }
}

#[test]
#[ignore = "multi-second stress soak; run explicitly with --ignored"]
fn mixed_workload_soak_leaves_a_consistent_chain() {
    let _ = env_logger::try_init();
    let list = Arc::new(List::<i64>::new());
    let stop = Arc::new(AtomicBool::new(false));
    let next_value = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|worker| {
            let list = Arc::clone(&list);
            let stop = Arc::clone(&stop);
            let next_value = Arc::clone(&next_value);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let op = (worker as usize + next_value.fetch_add(1, Ordering::Relaxed)) % 4;
                    match op {
                        0 => list.push_back(worker),
                        1 => list.push_front(worker),
                        2 => {
                            let cur = list.find(worker);
                            if cur != list.end() {
                                list.erase(cur);
                            }
                        }
                        _ => {
                            let cur = list.begin();
                            if cur != list.end() {
                                list.insert(&cur, worker);
                            }
                        }
                    }
                }
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    stop.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().unwrap();
    }

    assert_chain_is_consistent(&list);
}
