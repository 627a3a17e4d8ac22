//! Small helpers shared by the rest of the crate.

use std::ops::{Deref, DerefMut};

/// Pads and aligns a value to a cache line, so that hot atomics (the
/// list's advisory size counter, the free list's head pointer) don't
/// false-share a line with unrelated fields.
#[derive(Debug, Default)]
#[repr(align(64))]
pub(crate) struct CachePadded<T>(T);

impl<T> CachePadded<T> {
    pub(crate) fn new(t: T) -> Self {
        CachePadded(t)
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
