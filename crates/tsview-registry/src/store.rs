//! Append-only store with stable indices.
//!
//! Entries live in chunks whose sizes double: with a first chunk of 32 the
//! chunks hold 32, 64, 128, ... entries. A chunk is allocated once and never
//! moved, so a reference handed out by [`AppendOnlyStore::get`] stays valid
//! for the lifetime of the store no matter how much it grows afterwards.
//!
//! ```text
//! index:   0 ......... 31 | 32 ......... 95 | 96 ........ 223 | ...
//! chunk:        0         |        1        |        2        | ...
//! ```
//!
//! Appends are serialized by a lock. Reads take no lock: the length is
//! published with release ordering after the entry is written, and a reader
//! only touches indices below the length it observed.

use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Default capacity of the first chunk.
pub const DEFAULT_FIRST_CHUNK_LEN: usize = 32;

/// Largest first chunk a store will allocate. Larger requests are capped.
pub const MAX_FIRST_CHUNK_LEN: usize = 1 << 16;

type Slot<T> = UnsafeCell<MaybeUninit<T>>;

/// A growable store whose entries never move once added.
pub struct AppendOnlyStore<T> {
    /// Chunk base pointers; null until the chunk is needed.
    chunks: Box<[AtomicPtr<Slot<T>>]>,
    /// Number of published entries.
    len: AtomicUsize,
    /// log2 of the first chunk's capacity.
    first_bits: u32,
    /// Serializes appends.
    append: Mutex<()>,
    /// Owns `T`; thread-safety is declared manually below.
    _marker: PhantomData<(T, *mut ())>,
}

// Safety: entries are written once under the append lock and only read
// afterwards. Moving the store moves ownership of every `T`.
unsafe impl<T: Send> Send for AppendOnlyStore<T> {}
// Safety: `push` from a shared reference transfers a `T` into the store and
// `get` hands out `&T`, so both `Send` and `Sync` are required.
unsafe impl<T: Send + Sync> Sync for AppendOnlyStore<T> {}

impl<T> AppendOnlyStore<T> {
    /// Create an empty store with the default first chunk.
    #[must_use]
    pub fn new() -> Self {
        Self::with_first_chunk_len(DEFAULT_FIRST_CHUNK_LEN)
    }

    /// Create an empty store whose first chunk holds at least `len` entries.
    ///
    /// The capacity is rounded up to a power of two and capped at
    /// [`MAX_FIRST_CHUNK_LEN`].
    #[must_use]
    pub fn with_first_chunk_len(len: usize) -> Self {
        let first_bits = len
            .clamp(1, MAX_FIRST_CHUNK_LEN)
            .next_power_of_two()
            .trailing_zeros();
        let chunk_count = (usize::BITS - first_bits) as usize;
        let chunks = (0..chunk_count)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();

        Self {
            chunks,
            len: AtomicUsize::new(0),
            first_bits,
            append: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Check if the store is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the first chunk.
    #[inline]
    #[must_use]
    pub fn first_chunk_len(&self) -> usize {
        1 << self.first_bits
    }

    /// Append a value and return its index.
    ///
    /// # Panics
    ///
    /// Panics if the index space is exhausted.
    pub fn push(&self, value: T) -> usize {
        self.push_with(|_| value)
    }

    /// Append the value built by `make`, which receives the index the entry
    /// will occupy.
    ///
    /// `make` runs under the append lock; it must not append to this store.
    ///
    /// # Panics
    ///
    /// Panics if the index space is exhausted.
    pub fn push_with(&self, make: impl FnOnce(usize) -> T) -> usize {
        let _guard = self.append.lock();

        let index = self.len.load(Ordering::Relaxed);
        assert!(
            index.checked_add(self.first_chunk_len()).is_some(),
            "append-only store is full"
        );

        let (chunk, offset) = self.locate(index);
        let mut base = self.chunks[chunk].load(Ordering::Acquire);
        if base.is_null() {
            let len = self.chunk_len(chunk);
            base = alloc_chunk::<T>(len);
            self.chunks[chunk].store(base, Ordering::Release);
            tracing::trace!(chunk, len, "allocated store chunk");
        }

        // Safety: `offset` is inside the chunk and the slot is unpublished,
        // so nothing else can observe it while we hold the append lock.
        unsafe {
            (*base.add(offset)).get().write(MaybeUninit::new(make(index)));
        }
        self.len.store(index + 1, Ordering::Release);
        index
    }

    /// Get the entry at `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len.load(Ordering::Acquire) {
            return None;
        }
        let (chunk, offset) = self.locate(index);
        let base = self.chunks[chunk].load(Ordering::Acquire);
        // Safety: `index < len`, and `len` is only advanced after the slot
        // has been written, so the chunk exists and the slot is initialized.
        // Published slots are never written again.
        Some(unsafe { (*(*base.add(offset)).get()).assume_init_ref() })
    }

    /// Iterate over the entries present when the iterator was created.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    /// Chunk number and position within it for an index.
    #[inline]
    fn locate(&self, index: usize) -> (usize, usize) {
        let pos = index + self.first_chunk_len();
        let chunk = usize::BITS - 1 - pos.leading_zeros() - self.first_bits;
        let offset = pos - (1 << (chunk + self.first_bits));
        (chunk as usize, offset)
    }

    #[inline]
    fn chunk_len(&self, chunk: usize) -> usize {
        1 << (chunk as u32 + self.first_bits)
    }

    #[inline]
    fn chunk_start(&self, chunk: usize) -> usize {
        self.chunk_len(chunk) - self.first_chunk_len()
    }
}

impl<T> Default for AppendOnlyStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for AppendOnlyStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendOnlyStore")
            .field("len", &self.len())
            .field("first_chunk_len", &self.first_chunk_len())
            .finish()
    }
}

impl<T> Drop for AppendOnlyStore<T> {
    fn drop(&mut self) {
        let len = *self.len.get_mut();
        for chunk in 0..self.chunks.len() {
            let base = *self.chunks[chunk].get_mut();
            if base.is_null() {
                continue;
            }
            let chunk_len = self.chunk_len(chunk);
            let live = len.saturating_sub(self.chunk_start(chunk)).min(chunk_len);
            // Safety: the first `live` slots of this chunk are initialized and
            // the chunk was allocated by `alloc_chunk` with `chunk_len` slots.
            unsafe {
                for offset in 0..live {
                    ptr::drop_in_place((*base.add(offset)).get().cast::<T>());
                }
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(base, chunk_len)));
            }
        }
    }
}

fn alloc_chunk<T>(len: usize) -> *mut Slot<T> {
    let slots: Box<[Slot<T>]> = (0..len)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect();
    Box::into_raw(slots).cast::<Slot<T>>()
}
