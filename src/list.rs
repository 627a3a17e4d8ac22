//! `List<T>`: the sentinel-bounded concurrent doubly-linked list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::freelist::{sweep_once, FreeList, SweeperConfig, SweeperHandle};
use crate::iter::Cursor;
use crate::node::{Node, NodeState};
use crate::rwlock::RWLock;
use crate::util::CachePadded;

/// State shared between a `List`, its sweeper thread, and every
/// outstanding `Cursor`. Wrapped in an `Arc` so cursors (and the
/// sweeper) can keep it alive independent of the `List` handle's own
/// lifetime, the way a node's two neighbor pointers keep it alive
/// independent of any particular caller.
pub(crate) struct Shared<T> {
    pub(crate) root: *mut Node<T>,
    pub(crate) last: *mut Node<T>,
    pub(crate) size: CachePadded<AtomicUsize>,
    pub(crate) freelock: RWLock,
    pub(crate) freelist: FreeList<T>,
}

unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

/// A concurrent doubly-linked list with hand-over-hand locking and
/// deferred reclamation.
///
/// Structural mutators (`push_front`, `push_back`, `insert`, `erase`,
/// `pop_front`, `pop_back`) take at most two or three adjacent node
/// locks at a time, always in `left → self/new → right` order, and
/// retry on optimistic-validation failure rather than blocking
/// indefinitely on a single global lock. `find` and `size` are
/// deliberately not linearizable — both read atomically valid field
/// values without claiming a snapshot of the whole list.
pub struct List<T> {
    shared: Arc<Shared<T>>,
    sweeper: SweeperHandle,
}

impl<T: Send + 'static> List<T> {
    /// An empty list with the default ~500ms sweeper cadence.
    pub fn new() -> Self {
        Self::empty(SweeperConfig::default())
    }

    /// Builds a list pre-populated (via `push_back`, in order) from
    /// `initial_values`, with an explicit sweeper cadence.
    pub fn with_config(initial_values: impl IntoIterator<Item = T>, config: SweeperConfig) -> Self
    where
        T: 'static,
    {
        let list = Self::empty(config);
        for value in initial_values {
            list.push_back(value);
        }
        list
    }

    fn empty(config: SweeperConfig) -> Self {
        let last = Box::into_raw(Box::new(Node::new_sentinel(NodeState::End)));
        let root = Box::into_raw(Box::new(Node::new_sentinel(NodeState::Begin)));
        unsafe {
            // Sentinels are pinned for the list's lifetime; the direct
            // root<->last link between them does not count toward
            // either's ref_count — only the split-apart links created
            // by later inserts do.
            (*last).ref_count.store(1, Ordering::Relaxed);
            (*root).ref_count.store(1, Ordering::Relaxed);
            (*last).set_prev(root);
            (*root).set_next(last);
        }

        let shared = Arc::new(Shared {
            root,
            last,
            size: CachePadded::new(AtomicUsize::new(0)),
            freelock: RWLock::new(),
            freelist: FreeList::new(),
        });

        let sweeper = SweeperHandle::spawn(Arc::clone(&shared), config);
        List { shared, sweeper }
    }
}

impl<T: Send + 'static> Default for List<T> {
    fn default() -> Self {
        List::new()
    }
}

impl<T> List<T> {
    /// The advisory element count: correct at quiescence, but not
    /// linearizable with concurrent structural operations.
    pub fn size(&self) -> usize {
        self.shared.size.load(Ordering::Relaxed)
    }

    /// A cursor to the first element, or to `end()` if the list is
    /// empty.
    pub fn begin(&self) -> Cursor<T> {
        unsafe {
            (*self.shared.root).lock.rlock();
            let node = (*self.shared.root).next();
            let it = Cursor::new(node, Arc::clone(&self.shared));
            (*self.shared.root).lock.unlock();
            it
        }
    }

    /// A cursor one past the last element (the `End` sentinel).
    pub fn end(&self) -> Cursor<T> {
        unsafe {
            (*self.shared.last).lock.rlock();
            let it = Cursor::new(self.shared.last, Arc::clone(&self.shared));
            (*self.shared.last).lock.unlock();
            it
        }
    }

    /// Inserts `value` at the front. Lock-coupled on `root` and
    /// `root.next`.
    pub fn push_front(&self, value: T) {
        unsafe {
            (*self.shared.root).lock.wlock();
            let right = (*self.shared.root).next();
            (*right).lock.wlock();

            let node = Box::into_raw(Box::new(Node::new_valid(value)));
            (*node).set_prev(self.shared.root);
            (*node).set_next(right);
            // Two neighbor pointers (root and right) now hold a
            // reference each.
            (*node).ref_count.store(2, Ordering::Relaxed);

            (*right).set_prev(node);
            (*self.shared.root).set_next(node);
            self.shared.size.fetch_add(1, Ordering::Relaxed);

            (*self.shared.root).lock.unlock();
            (*right).lock.unlock();
        }
        log::trace!("push_front");
    }

    /// Appends `value` at the back. Retries the lock-coupled splice
    /// until an optimistic validation against `last.prev`/`last`
    /// succeeds.
    pub fn push_back(&self, value: T) {
        let mut value = Some(value);
        unsafe {
            loop {
                (*self.shared.last).lock.wlock();
                let left = (*self.shared.last).prev();
                (*left).ref_count.fetch_add(1, Ordering::AcqRel);
                (*self.shared.last).lock.unlock();

                (*left).lock.wlock();
                (*self.shared.last).lock.wlock();

                let valid = (*left).next() == self.shared.last && (*self.shared.last).prev() == left;
                if valid {
                    let node = Box::into_raw(Box::new(Node::new_valid(value.take().unwrap())));
                    (*node).set_prev(left);
                    (*node).set_next(self.shared.last);
                    (*node).ref_count.store(2, Ordering::Relaxed);

                    (*left).set_next(node);
                    (*self.shared.last).set_prev(node);
                    self.shared.size.fetch_add(1, Ordering::Relaxed);
                }

                (*left).lock.unlock();
                (*self.shared.last).lock.unlock();
                node::destroy(left, &self.shared);

                if valid {
                    log::trace!("push_back");
                    return;
                }
            }
        }
    }

    /// Inserts `value` just after `it`'s target. Delegates to
    /// `push_back`/`push_front` at the sentinels; silently does
    /// nothing if `it`'s target has already been erased (the anchor
    /// no longer exists, so the insertion is trivially satisfied).
    pub fn insert(&self, it: &Cursor<T>, value: T) {
        unsafe {
            match (*it.ptr).state() {
                NodeState::End => self.push_back(value),
                NodeState::Begin => self.push_front(value),
                _ => {
                    let left = it.ptr;
                    (*left).lock.wlock();
                    if (*left).state() == NodeState::Removed {
                        (*left).lock.unlock();
                        return;
                    }

                    let right = (*left).next();
                    (*right).lock.wlock();

                    let node = Box::into_raw(Box::new(Node::new_valid(value)));
                    (*node).set_prev(left);
                    (*node).set_next(right);
                    (*node).ref_count.store(2, Ordering::Relaxed);

                    (*left).set_next(node);
                    (*right).set_prev(node);
                    self.shared.size.fetch_add(1, Ordering::Relaxed);

                    (*left).lock.unlock();
                    (*right).lock.unlock();
                }
            }
        }
    }

    /// Removes `it`'s target from the list, retrying the lock-coupled
    /// validation until it succeeds. A no-op on sentinels,
    /// an empty list, or a target that is not (or no longer) `Valid`.
    /// Consumes `it`: the caller's own reference is released when it
    /// is dropped at the end of this call.
    pub fn erase(&self, it: Cursor<T>) {
        unsafe {
            let n = it.ptr;
            if (*n).is_sentinel()
                || self.shared.size.load(Ordering::Relaxed) == 0
                || (*n).state() != NodeState::Valid
            {
                return;
            }

            loop {
                (*n).lock.rlock();
                if (*n).state() == NodeState::Removed {
                    (*n).lock.unlock();
                    return;
                }

                let left = (*n).prev();
                let right = (*n).next();
                (*left).ref_count.fetch_add(1, Ordering::AcqRel);
                (*right).ref_count.fetch_add(1, Ordering::AcqRel);
                (*n).lock.unlock();

                (*left).lock.wlock();
                (*n).lock.rlock();
                (*right).lock.wlock();

                let valid = (*left).next() == n && (*right).prev() == n;
                if valid {
                    (*n).set_state(NodeState::Removed);
                    // The two neighbor pointers into `n` are going away.
                    (*n).ref_count.fetch_sub(2, Ordering::AcqRel);

                    (*left).set_next(right);
                    (*right).set_prev(left);
                    // `left`/`right` are now each other's neighbors in
                    // n's place.
                    (*left).ref_count.fetch_add(1, Ordering::AcqRel);
                    (*right).ref_count.fetch_add(1, Ordering::AcqRel);

                    self.shared.size.fetch_sub(1, Ordering::Relaxed);
                }

                (*left).lock.unlock();
                (*n).lock.unlock();
                (*right).lock.unlock();

                node::destroy(left, &self.shared);
                node::destroy(right, &self.shared);

                if valid {
                    log::trace!("erase");
                    return;
                }
            }
        }
    }

    /// Finds the first element equal to `value`, read-locking each
    /// node for the duration of the comparison rather than racing a
    /// lock-free read. Returns `end()` if no match is found. Not a
    /// snapshot: a concurrent insert/erase can make this miss a match
    /// or walk past a node frozen mid-removal.
    pub fn find(&self, value: T) -> Cursor<T>
    where
        T: PartialEq,
    {
        // Walked via `Cursor` stepping (not raw pointer chasing) so a
        // reference stays pinned on whichever node we're examining at
        // every point in the walk, including the gap between releasing
        // one node's lock and acquiring the next's — the same hazard
        // `move_next` itself guards against.
        let mut cur = self.begin();
        let end = self.end();
        while cur != end {
            let matches = unsafe {
                (*cur.ptr).lock.rlock();
                let m = (*cur.ptr).data_matches(&value);
                (*cur.ptr).lock.unlock();
                m
            };
            if matches {
                return cur;
            }
            cur.move_next();
        }
        cur
    }

    /// Removes the first element, if any.
    pub fn pop_front(&self) {
        unsafe {
            if self.shared.size.load(Ordering::Relaxed) == 0 {
                return;
            }
            (*self.shared.root).lock.wlock();
            let target = (*self.shared.root).next();
            let it = Cursor::new(target, Arc::clone(&self.shared));
            (*self.shared.root).lock.unlock();
            self.erase(it);
        }
    }

    /// Removes the last element, if any.
    pub fn pop_back(&self) {
        unsafe {
            if self.shared.size.load(Ordering::Relaxed) == 0 {
                return;
            }
            (*self.shared.last).lock.wlock();
            let target = (*self.shared.last).prev();
            let it = Cursor::new(target, Arc::clone(&self.shared));
            (*self.shared.last).lock.unlock();
            self.erase(it);
        }
    }

    /// Forces one sweep of the free list right now, outside of the
    /// sweeper's own cadence. Exposed for tests that want to observe
    /// reclamation without sleeping for a full cycle.
    #[cfg(any(test, feature = "test-support"))]
    pub fn force_sweep(&self) {
        sweep_once(&self.shared);
    }

    /// The number of nodes currently queued for reclamation (either
    /// awaiting their first sweep or marked and awaiting their second).
    /// Exposed for tests that want to assert on reclamation progress
    /// without reaching into crate internals.
    #[cfg(any(test, feature = "test-support"))]
    pub fn pending_reclaim(&self) -> bool {
        !self.shared.freelist.is_empty()
    }
}

impl<T> Drop for List<T> {
    fn drop(&mut self) {
        self.sweeper.shutdown();

        // Safety: shutting down the sweeper drains the free list, so
        // everything left reachable from `root` is either still
        // `Valid` or a sentinel — never a dangling `Removed` node.
        // Any `Cursor` a caller still holds past this point is a
        // contract violation this crate does not defend against (the
        // same discipline the ported source assumes).
        unsafe {
            let mut cur = self.shared.root;
            while cur != self.shared.last {
                let next = (*cur).next();
                drop(Box::from_raw(cur));
                cur = next;
            }
            drop(Box::from_raw(self.shared.last));
        }
    }
}

impl<T: Send + 'static> Extend<T> for List<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T: Send + 'static> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        List::with_config(iter, SweeperConfig::default())
    }
}

// Re-exported so `node::destroy` reads naturally at call sites above.
use crate::node;
