//! The lock-free free list and the background sweeper that drains it.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::list::Shared;
use crate::node::{self, Node};
use crate::util::CachePadded;

/// Tunable sweeper behavior. The only knob exposed today is the sweep
/// cadence between reclamation passes while the list is not being
/// dropped.
#[derive(Clone, Copy, Debug)]
pub struct SweeperConfig {
    interval: Duration,
}

impl SweeperConfig {
    /// Builds a config with the crate's documented default cadence.
    pub fn new() -> Self {
        SweeperConfig::default()
    }

    /// Overrides the interval the sweeper sleeps between passes while
    /// the list is not being dropped.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig {
            interval: Duration::from_millis(500),
        }
    }
}

/// A singly-linked wrapper queued for reclamation. Kept distinct from
/// `Node<T>` so the free list's own bookkeeping doesn't need a slot in
/// every live node.
struct FreeNode<T> {
    ptr: *mut Node<T>,
    next: *mut FreeNode<T>,
}

/// A lock-free LIFO stack of nodes pending reclamation.
pub(crate) struct FreeList<T> {
    head: CachePadded<AtomicPtr<FreeNode<T>>>,
}

unsafe impl<T: Send> Send for FreeList<T> {}
unsafe impl<T: Send> Sync for FreeList<T> {}

impl<T> FreeList<T> {
    pub(crate) fn new() -> Self {
        FreeList {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Pushes `node` onto the stack. Safe to call from any thread
    /// without holding any lock; synchronized purely via CAS.
    ///
    /// # Safety
    /// `node` must be a live pointer the caller is relinquishing
    /// ownership of to the free list.
    pub(crate) unsafe fn push(&self, node: *mut Node<T>) {
        let wrapper = Box::into_raw(Box::new(FreeNode {
            ptr: node,
            next: ptr::null_mut(),
        }));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            (*wrapper).next = head;
            match self.head.compare_exchange_weak(
                head,
                wrapper,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }
}

/// Releases the two neighbor-references a removed node's own (frozen)
/// `prev`/`next` held, then frees the node and its free-list wrapper.
///
/// # Safety
/// `wrapper` must own the last reference to the `Node` it wraps, i.e.
/// the node must already have `ref_count == 0`.
unsafe fn destroy_node<T>(wrapper: *mut FreeNode<T>, shared: &Shared<T>) {
    let node = (*wrapper).ptr;
    let live = (*node).ref_count.load(Ordering::Acquire);
    if live != 0 {
        log::error!(
            "freeing node {} with ref_count {live}, invariant 4 violated",
            (*node).debug_id()
        );
    }
    debug_assert_eq!(live, 0, "freed a node still referenced elsewhere");

    let left = (*node).prev();
    let right = (*node).next();
    if !left.is_null() {
        node::destroy(left, shared);
    }
    if !right.is_null() {
        node::destroy(right, shared);
    }
    drop(Box::from_raw(node));
    drop(Box::from_raw(wrapper));
}

/// Pushes an already-allocated wrapper back onto the stack, reusing the
/// allocation rather than going through `FreeList::push`'s `Box::new`.
fn repush<T>(freelist: &FreeList<T>, wrapper: *mut FreeNode<T>) {
    let mut head = freelist.head.load(Ordering::Relaxed);
    loop {
        unsafe {
            (*wrapper).next = head;
        }
        match freelist
            .head
            .compare_exchange_weak(head, wrapper, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return,
            Err(observed) => head = observed,
        }
    }
}

/// One full pass of the two-phase grace scheme.
///
/// This takes exclusive ownership of the *entire* free list in one
/// step (an atomic swap against null, bracketed by the `freelock`
/// write fence) rather than the original's snapshot-mutate-reconcile
/// dance over a live, still-externally-reachable chain. Swapping the
/// whole stack out up front means every `FreeNode` this pass touches
/// is, by construction, unreachable from any other thread for the
/// rest of the pass — no partial-unlink bookkeeping, no risk of a
/// trailing pointer left dangling when the first entry of a chain is
/// the one being spliced out.
///
/// A node is freed only once observed twice with `ref_count == 0`:
/// the first observation marks `already` and the wrapper is pushed
/// back for the next pass to re-examine; the second observation (in a
/// later call to `sweep_once`, i.e. a later sweeper cycle) frees it.
/// Each observation happens strictly after one `freelock` write-fence,
/// which is what guarantees no iterator is mid-dereference of the node
/// when it is finally freed.
pub(crate) fn sweep_once<T>(shared: &Shared<T>) {
    shared.freelock.wlock();
    let batch = shared
        .freelist
        .head
        .swap(ptr::null_mut(), Ordering::AcqRel);
    shared.freelock.unlock();

    if batch.is_null() {
        return;
    }

    let mut freed = 0usize;
    let mut republished = 0usize;
    let mut marked = 0usize;

    let mut cur = batch;
    unsafe {
        while !cur.is_null() {
            let next = (*cur).next;
            let n = &*(*cur).ptr;
            let has_refs = n.ref_count.load(Ordering::Acquire) != 0;
            let seen = n.already.load(Ordering::Acquire);

            if has_refs {
                // Gained a new reference since being queued; this
                // wrapper's job is done; a fresh one will be pushed
                // when the reference count drops to zero again.
                drop(Box::from_raw(cur));
                republished += 1;
            } else if seen {
                destroy_node(cur, shared);
                freed += 1;
            } else {
                n.already.store(true, Ordering::Release);
                repush(&shared.freelist, cur);
                marked += 1;
            }
            cur = next;
        }
    }

    log::debug!(
        "sweep pass: {freed} freed, {marked} marked for next pass, {republished} republished"
    );
}

struct Sweeper {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Owns the background sweeper thread for a `List<T>`. Spawned at
/// construction, signaled and joined on drop.
pub(crate) struct SweeperHandle {
    sweeper: Sweeper,
}

impl SweeperHandle {
    pub(crate) fn spawn<T: Send + 'static>(shared: Arc<Shared<T>>, config: SweeperConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("concurrent-dlist-sweeper".into())
            .spawn(move || sweeper_loop(shared, shutdown_for_thread, config))
            .expect("failed to spawn sweeper thread");
        SweeperHandle {
            sweeper: Sweeper {
                shutdown,
                handle: Some(handle),
            },
        }
    }

    /// Signals shutdown and blocks until the sweeper thread has drained
    /// the free list and exited.
    pub(crate) fn shutdown(&mut self) {
        self.sweeper.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.sweeper.handle.take() {
            let _ = handle.join();
        }
    }
}

fn sweeper_loop<T>(shared: Arc<Shared<T>>, shutdown: Arc<AtomicBool>, config: SweeperConfig) {
    loop {
        let shutting_down = shutdown.load(Ordering::Acquire);
        sweep_once(&shared);

        if shutting_down {
            if shared.freelist.is_empty() {
                log::debug!("sweeper shutting down, free list drained");
                return;
            }
            // Final drain: keep going without sleeping.
            continue;
        }

        sleep_responsive(config.interval(), &shutdown);
    }
}

/// Sleeps up to `interval`, but in short slices so a shutdown request
/// is noticed promptly no matter how long `interval` is configured to
/// be, rather than blocking `SweeperHandle::shutdown`'s join for the
/// remainder of a long-cadence sleep.
fn sleep_responsive(interval: Duration, shutdown: &AtomicBool) {
    const POLL: Duration = Duration::from_millis(50);
    let mut remaining = interval;
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        let step = remaining.min(POLL);
        thread::sleep(step);
        remaining -= step;
    }
}
