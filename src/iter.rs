//! `Cursor<T>`: a refcounted handle to a `Node`, named to avoid
//! colliding with `std::iter::Iterator`, whose single-direction
//! contract doesn't fit a bidirectional, steppable handle.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::list::Shared;
use crate::node::{self, Node, NodeState};

/// A strong reference to a single node in a `List`.
///
/// Every `Cursor` holds exactly one reference count on its target
/// (bumped on construction/clone, released on drop), so a node that
/// has been logically removed from its list stays allocated for as
/// long as some `Cursor` still points at it.
///
/// There is deliberately no `Deref`/`DerefMut` impl here: returning a
/// reference out of a lock guard whose unlock call never runs is a
/// hazard this type avoids entirely. [`Cursor::get`] copies the value
/// out under a read lock and releases the lock before returning, which
/// is the safe shape this crate commits to instead.
pub struct Cursor<T> {
    pub(crate) ptr: *mut Node<T>,
    pub(crate) shared: Arc<Shared<T>>,
}

// Raw pointers opt out of Send/Sync by default; every access to `ptr`
// goes through the node's own lock or atomics, so a `Cursor` is safe to
// hand to another thread whenever `T` itself is.
unsafe impl<T: Send> Send for Cursor<T> {}
unsafe impl<T: Send> Sync for Cursor<T> {}

impl<T> Cursor<T> {
    /// The crate's one and only way to build a `Cursor`: a node pointer
    /// plus the list's shared state. There is no single-argument
    /// constructor to misuse — every internal call site, including
    /// `pop_back`/`pop_front`, goes through this one.
    ///
    /// # Safety
    /// `node` must be a live pointer belonging to the list that `shared`
    /// describes.
    pub(crate) unsafe fn new(node: *mut Node<T>, shared: Arc<Shared<T>>) -> Self {
        (*node).ref_count.fetch_add(1, Ordering::AcqRel);
        Cursor { ptr: node, shared }
    }

    /// Reads the target's value under a read lock, copying it out.
    ///
    /// Calling this on a cursor pointing at a sentinel (`begin()`'s
    /// predecessor state or `end()`) is a logic error; such a node was
    /// never given a value to read.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        unsafe {
            debug_assert!(!(*self.ptr).is_sentinel(), "dereferenced a sentinel cursor");
            (*self.ptr).lock.rlock();
            let value = (*self.ptr).read_data();
            (*self.ptr).lock.unlock();
            value
        }
    }

    /// Overwrites the target's value under a write lock.
    pub fn set(&self, value: T) {
        unsafe {
            debug_assert!(!(*self.ptr).is_sentinel(), "assigned into a sentinel cursor");
            (*self.ptr).lock.wlock();
            (*self.ptr).write_data(value);
            (*self.ptr).lock.unlock();
        }
    }

    /// Steps to the next node. A no-op on `end()`.
    pub fn move_next(&mut self) {
        unsafe {
            if (*self.ptr).state() == NodeState::End {
                return;
            }
            self.shared.freelock.rlock();
            let old = self.ptr;
            let next = (*old).next();
            (*next).ref_count.fetch_add(1, Ordering::AcqRel);
            self.ptr = next;
            self.shared.freelock.unlock();
            node::destroy(old, &self.shared);
        }
    }

    /// Steps to the previous node. A no-op on `begin()`'s target once it
    /// reaches the `Begin` sentinel.
    pub fn move_prev(&mut self) {
        unsafe {
            if (*self.ptr).state() == NodeState::Begin {
                return;
            }
            self.shared.freelock.rlock();
            let old = self.ptr;
            let prev = (*old).prev();
            (*prev).ref_count.fetch_add(1, Ordering::AcqRel);
            self.ptr = prev;
            self.shared.freelock.unlock();
            node::destroy(old, &self.shared);
        }
    }

    /// Rebinds this cursor to point at `other`'s target. Rust has no
    /// assignment-operator overloading, so the address-ordered
    /// dual-lock rebind is exposed as an explicit method instead of
    /// riding on `=`.
    pub fn assign(&mut self, other: &Cursor<T>) {
        if std::ptr::eq(self.ptr, other.ptr) {
            return;
        }

        let (first, second) = order_pair(self.ptr, other.ptr);
        unsafe {
            (*first).lock.wlock();
            (*second).lock.wlock();

            let old = self.ptr;
            self.ptr = other.ptr;
            (*self.ptr).ref_count.fetch_add(1, Ordering::AcqRel);

            (*first).lock.unlock();
            (*second).lock.unlock();

            node::destroy(old, &self.shared);
        }
        self.shared = Arc::clone(&other.shared);
    }
}

/// Orders two node pointers by address to give every dual-lock
/// acquisition in this module a consistent order, preventing the
/// classic two-lock deadlock.
fn order_pair<T>(a: *mut Node<T>, b: *mut Node<T>) -> (*mut Node<T>, *mut Node<T>) {
    if (a as usize) <= (b as usize) {
        (a, b)
    } else {
        (b, a)
    }
}

impl<T> Clone for Cursor<T> {
    fn clone(&self) -> Self {
        unsafe {
            (*self.ptr).ref_count.fetch_add(1, Ordering::AcqRel);
        }
        Cursor {
            ptr: self.ptr,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        unsafe {
            node::destroy(self.ptr, &self.shared);
        }
    }
}

impl<T> PartialEq for Cursor<T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.ptr, other.ptr)
    }
}

impl<T> Eq for Cursor<T> {}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("ptr", &self.ptr).finish()
    }
}
