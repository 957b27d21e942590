//! Segmented object pool for the write path.
//!
//! Objects live in fixed-size segments that are allocated on demand and
//! never freed while the pool lives, so an index stays valid for the whole
//! lifetime of the pool. A free stack hands indices out; an index is pushed
//! back only when the write that used it completes.

use tracing::warn;

pub const DEFAULT_SEGMENT_LEN: usize = 32;

/// Stable handle to one slot of an [`ObjectPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolIndex(usize);

impl PoolIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct ObjectPool<T> {
    segment_len: usize,
    segments: Vec<Box<[T]>>,
    free: Vec<usize>,
    in_use: Vec<bool>,
}

impl<T: Default> ObjectPool<T> {
    /// Creates a pool with one preallocated segment of `segment_len` slots.
    pub fn new(segment_len: usize) -> Self {
        let mut pool = Self {
            segment_len: segment_len.max(1),
            segments: Vec::new(),
            free: Vec::new(),
            in_use: Vec::new(),
        };
        let first = pool.grow();
        pool.free.push(first);
        pool
    }

    /// Appends a segment and frees all of its slots except the first, whose
    /// index is returned to the caller.
    fn grow(&mut self) -> usize {
        let base = self.capacity();
        let segment: Box<[T]> = (0..self.segment_len).map(|_| T::default()).collect();
        self.segments.push(segment);
        self.in_use.resize(base + self.segment_len, false);
        // Reversed so the lowest index is handed out first.
        self.free.extend((base + 1..base + self.segment_len).rev());
        base
    }

    /// Takes a free slot, growing the pool by one segment when none is left.
    pub fn acquire(&mut self) -> PoolIndex {
        let index = match self.free.pop() {
            Some(index) => index,
            None => self.grow(),
        };
        self.in_use[index] = true;
        PoolIndex(index)
    }
}

impl<T> ObjectPool<T> {
    /// Returns a slot to the free stack.
    ///
    /// Returns `false` and leaves the pool untouched if the slot was not
    /// outstanding, so a double release can never hand one slot to two
    /// writers.
    pub fn release(&mut self, index: PoolIndex) -> bool {
        match self.in_use.get_mut(index.0) {
            Some(slot) if *slot => {
                *slot = false;
                self.free.push(index.0);
                true
            }
            _ => {
                warn!(index = index.0, "Ignoring release of a pool slot that is not in use");
                false
            }
        }
    }

    pub fn get(&self, index: PoolIndex) -> &T {
        &self.segments[index.0 / self.segment_len][index.0 % self.segment_len]
    }

    pub fn get_mut(&mut self, index: PoolIndex) -> &mut T {
        &mut self.segments[index.0 / self.segment_len][index.0 % self.segment_len]
    }

    pub fn capacity(&self) -> usize {
        self.segments.len() * self.segment_len
    }

    pub fn in_use(&self) -> usize {
        self.capacity() - self.free.len()
    }

    pub fn segments(&self) -> usize {
        self.segments.len()
    }
}
