//! Contiguous sample FIFO.
//!
//! Engines accept input in arbitrary chunk sizes but process in fixed blocks,
//! and expose their output as plain slices. [`SampleFifo`] bridges both: a
//! single growable buffer with a read position that is compacted lazily, so
//! the readable region is always one contiguous slice.
//!
//! Capacity is reserved at configuration time. As long as callers stay within
//! it, pushes and advances never allocate; compaction is a `memmove`.

/// First-in first-out queue of samples with a contiguous readable region.
#[derive(Debug, Clone, Default)]
pub struct SampleFifo<T> {
    /// Backing storage; `buffer[head..]` is readable.
    buffer: Vec<T>,
    /// Read position.
    head: usize,
}

impl<T: Copy + Default> SampleFifo<T> {
    /// Creates an empty FIFO.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            head: 0,
        }
    }

    /// Creates an empty FIFO able to hold `capacity` samples without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            head: 0,
        }
    }

    /// Number of readable samples.
    #[inline]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.head
    }

    /// Returns `true` if nothing is readable.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Readable samples, oldest first.
    #[inline]
    pub fn peek(&self) -> &[T] {
        &self.buffer[self.head..]
    }

    /// Appends samples at the tail.
    pub fn push(&mut self, samples: &[T]) {
        self.compact_for(samples.len());
        self.buffer.extend_from_slice(samples);
    }

    /// Appends `len` default (silent) samples.
    pub fn push_silence(&mut self, len: usize) {
        self.compact_for(len);
        self.buffer.resize(self.buffer.len() + len, T::default());
    }

    /// Appends `len` samples produced by `f`, in order.
    pub fn push_with(&mut self, len: usize, mut f: impl FnMut(usize) -> T) {
        self.compact_for(len);
        self.buffer.extend((0..len).map(&mut f));
    }

    /// Discards the `len` oldest samples.
    ///
    /// Advancing past the readable region is a contract violation; it is
    /// clamped in release builds.
    pub fn advance(&mut self, len: usize) {
        debug_assert!(
            len <= self.available(),
            "advance({len}) past {} available samples",
            self.available()
        );
        self.head += len.min(self.available());
        if self.head == self.buffer.len() {
            self.buffer.clear();
            self.head = 0;
        }
    }

    /// Removes all samples, keeping capacity.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.head = 0;
    }

    /// Ensures `additional` more samples fit without reallocating.
    pub fn reserve(&mut self, additional: usize) {
        self.compact_for(additional);
        self.buffer.reserve(additional);
    }

    /// Total samples storable before the next reallocation.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Moves the readable region to the front if appending `incoming`
    /// samples would otherwise grow the allocation.
    fn compact_for(&mut self, incoming: usize) {
        if self.head > 0 && self.buffer.len() + incoming > self.buffer.capacity() {
            self.buffer.drain(..self.head);
            self.head = 0;
        }
    }
}
