//! List cells: `Node<T>` and its four-state tag.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use crate::list::Shared;
use crate::rwlock::RWLock;

#[cfg(debug_assertions)]
use std::sync::atomic::AtomicUsize as IdCounter;

#[cfg(debug_assertions)]
static NEXT_NODE_ID: IdCounter = IdCounter::new(0);

/// The four states a node can be in. `Begin`/`End` mark the permanent
/// sentinels; `Valid` is a live data-bearing node; `Removed` means the
/// node has been unlinked but may still be reachable through a stale
/// cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum NodeState {
    Removed = 0,
    Begin = 1,
    Valid = 2,
    End = 3,
}

impl NodeState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => NodeState::Removed,
            1 => NodeState::Begin,
            2 => NodeState::Valid,
            3 => NodeState::End,
            _ => unreachable!("corrupt node state tag {tag}"),
        }
    }
}

/// A single list cell.
///
/// `prev`/`next` are raw pointers rather than atomics: every mutation of
/// either is made while holding write locks on both the node and the
/// neighbor being relinked, and every read happens under either a read
/// lock on `self` or the list's global `freelock`. The locking
/// discipline is the synchronization; the cells themselves are plain
/// `UnsafeCell`s.
pub(crate) struct Node<T> {
    data: UnsafeCell<MaybeUninit<T>>,
    prev: UnsafeCell<*mut Node<T>>,
    next: UnsafeCell<*mut Node<T>>,
    state: AtomicU8,
    pub(crate) ref_count: AtomicUsize,
    pub(crate) already: AtomicBool,
    pub(crate) lock: RWLock,
    #[cfg(debug_assertions)]
    pub(crate) id: usize,
}

// Nodes cross thread boundaries constantly (that's the whole point);
// `T` itself only needs to be `Send` since every access to `data` is
// mediated by `lock`.
unsafe impl<T: Send> Send for Node<T> {}
unsafe impl<T: Send> Sync for Node<T> {}

impl<T> Node<T> {
    #[cfg(debug_assertions)]
    fn next_id() -> usize {
        NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn new_valid(data: T) -> Self {
        let node = Node {
            data: UnsafeCell::new(MaybeUninit::new(data)),
            prev: UnsafeCell::new(ptr::null_mut()),
            next: UnsafeCell::new(ptr::null_mut()),
            state: AtomicU8::new(NodeState::Valid as u8),
            ref_count: AtomicUsize::new(0),
            already: AtomicBool::new(false),
            lock: RWLock::new(),
            #[cfg(debug_assertions)]
            id: Self::next_id(),
        };
        log::trace!("node {} created (valid)", node.debug_id());
        node
    }

    pub(crate) fn new_sentinel(state: NodeState) -> Self {
        let node = Node {
            data: UnsafeCell::new(MaybeUninit::uninit()),
            prev: UnsafeCell::new(ptr::null_mut()),
            next: UnsafeCell::new(ptr::null_mut()),
            state: AtomicU8::new(state as u8),
            ref_count: AtomicUsize::new(0),
            already: AtomicBool::new(false),
            lock: RWLock::new(),
            #[cfg(debug_assertions)]
            id: Self::next_id(),
        };
        log::trace!("node {} created (sentinel {:?})", node.debug_id(), state);
        node
    }

    #[cfg(debug_assertions)]
    pub(crate) fn debug_id(&self) -> usize {
        self.id
    }

    #[cfg(not(debug_assertions))]
    pub(crate) fn debug_id(&self) -> usize {
        0
    }

    pub(crate) fn state(&self) -> NodeState {
        NodeState::from_tag(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, s: NodeState) {
        self.state.store(s as u8, Ordering::Release);
    }

    pub(crate) fn is_sentinel(&self) -> bool {
        matches!(self.state(), NodeState::Begin | NodeState::End)
    }

    /// # Safety
    /// The caller must hold a read lock (or the list's `freelock`) on
    /// this node.
    pub(crate) unsafe fn prev(&self) -> *mut Node<T> {
        *self.prev.get()
    }

    /// # Safety
    /// Same contract as [`Node::prev`].
    pub(crate) unsafe fn next(&self) -> *mut Node<T> {
        *self.next.get()
    }

    /// # Safety
    /// The caller must hold write locks on both this node and the
    /// neighbor it is about to point at.
    pub(crate) unsafe fn set_prev(&self, p: *mut Node<T>) {
        *self.prev.get() = p;
    }

    /// # Safety
    /// Same contract as [`Node::set_prev`].
    pub(crate) unsafe fn set_next(&self, n: *mut Node<T>) {
        *self.next.get() = n;
    }

    /// # Safety
    /// The caller must hold a read (or write) lock on this node and the
    /// node must be `Valid` (never called on a sentinel).
    pub(crate) unsafe fn read_data(&self) -> T
    where
        T: Clone,
    {
        (*self.data.get()).assume_init_ref().clone()
    }

    /// # Safety
    /// The caller must hold a write lock on this node and the node must
    /// be `Valid`.
    pub(crate) unsafe fn write_data(&self, value: T) {
        *(*self.data.get()).assume_init_mut() = value;
    }

    /// Compares `data` against `value` without cloning it out first.
    ///
    /// # Safety
    /// Same contract as [`Node::read_data`].
    pub(crate) unsafe fn data_matches(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        (*self.data.get()).assume_init_ref() == value
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        log::trace!("node {} dropped", self.debug_id());
        if !self.is_sentinel() {
            unsafe {
                ptr::drop_in_place((*self.data.get()).as_mut_ptr());
            }
        }
    }
}

/// Releases one strong reference to `node`: decrements `ref_count`
/// under a `freelock` read lock and, if that was the last reference,
/// queues the node on the free list. Sentinels are pinned for the
/// life of the list and are never queued even if their transient ref
/// count reaches zero.
///
/// # Safety
/// `node` must be a live, previously-allocated `Node<T>` that the
/// caller held one strong reference to.
pub(crate) unsafe fn destroy<T>(node: *mut Node<T>, shared: &Shared<T>) {
    shared.freelock.rlock();
    let n = &*node;
    let old = n.ref_count.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(old >= 1, "ref_count underflow on node {}", n.debug_id());
    if old == 1 && !n.is_sentinel() {
        shared.freelist.push(node);
    }
    shared.freelock.unlock();
}
