//! A wait-free bounded Single-Producer Single-Consumer Queue
//!
//! The Queue is a Ring-Buffer with one storage Slot more than its capacity:
//! the permanently unused Slot is what distinguishes a full Queue from an
//! empty one, so the two Indices alone describe the state completely

use std::{cell::UnsafeCell, fmt::Debug, mem::MaybeUninit, sync::Arc};

use crate::sync::atomic;

/// The shared state of the Queue
struct Inner<T> {
    /// The Buffer of `capacity + 1` Slots
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// The Index of the Slot the Producer writes next
    write_pos: atomic::AtomicUsize,
    /// The Index of the Slot the Consumer reads next
    read_pos: atomic::AtomicUsize,
}

// The Buffer Slots are only ever touched by the single Producer (between
// reserving and publishing) or the single Consumer (after observing the
// publication), never by both at once
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn readable(&self) -> usize {
        let size = self.buffer.len();
        let read = self.read_pos.load(atomic::Ordering::Relaxed);
        let write = self.write_pos.load(atomic::Ordering::Acquire);

        (size + write - read) % size
    }

    fn writable(&self) -> usize {
        let size = self.buffer.len();
        let read = self.read_pos.load(atomic::Ordering::Acquire);
        let write = self.write_pos.load(atomic::Ordering::Relaxed);

        (size + read - write - 1) % size
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let size = self.buffer.len();
        let mut read = self.read_pos.load(atomic::Ordering::Relaxed);
        let write = self.write_pos.load(atomic::Ordering::Relaxed);

        while read != write {
            // # Safety:
            // Everything between the two Indices was written and not yet
            // consumed
            unsafe { (*self.buffer[read].get()).assume_init_drop() };
            read = (read + 1) % size;
        }
    }
}

/// The sending half of the Queue
pub struct BoundedSender<T> {
    inner: Arc<Inner<T>>,
}

/// The receiving half of the Queue
pub struct BoundedReceiver<T> {
    inner: Arc<Inner<T>>,
}

/// Creates a new bounded Queue with the given capacity
pub fn bounded_queue<T>(capacity: usize) -> (BoundedReceiver<T>, BoundedSender<T>) {
    let mut raw_buffer = Vec::with_capacity(capacity + 1);
    for _ in 0..capacity + 1 {
        raw_buffer.push(UnsafeCell::new(MaybeUninit::uninit()));
    }

    let inner = Arc::new(Inner {
        buffer: raw_buffer.into_boxed_slice(),
        write_pos: atomic::AtomicUsize::new(0),
        read_pos: atomic::AtomicUsize::new(0),
    });

    (
        BoundedReceiver {
            inner: inner.clone(),
        },
        BoundedSender { inner },
    )
}

impl<T> BoundedSender<T> {
    /// Attempts to enqueue the given value, handing it back if the Queue is
    /// full
    pub fn try_enqueue(&mut self, value: T) -> Result<(), T> {
        let inner = &*self.inner;

        if inner.writable() == 0 {
            return Err(value);
        }

        let size = inner.buffer.len();
        let write = inner.write_pos.load(atomic::Ordering::Relaxed);

        // # Safety:
        // The Slot at `write` is not readable for the Consumer until the
        // Index advances below
        unsafe { (*inner.buffer[write].get()).write(value) };

        inner
            .write_pos
            .store((write + 1) % size, atomic::Ordering::Release);

        Ok(())
    }

    /// Attempts to enqueue all the given values; this fails without enqueuing
    /// anything if the Queue does not have room for all of them at once
    pub fn enqueue_bulk(&mut self, values: &[T]) -> bool
    where
        T: Clone,
    {
        let inner = &*self.inner;

        if inner.writable() < values.len() {
            return false;
        }

        let size = inner.buffer.len();
        let mut write = inner.write_pos.load(atomic::Ordering::Relaxed);

        for value in values {
            unsafe { (*inner.buffer[write].get()).write(value.clone()) };
            write = (write + 1) % size;
        }

        inner.write_pos.store(write, atomic::Ordering::Release);

        true
    }

    /// Checks if the Queue is currently full
    pub fn is_full(&self) -> bool {
        self.inner.writable() == 0
    }

    /// The maximum number of values the Queue can hold at a time
    pub fn capacity(&self) -> usize {
        self.inner.buffer.len() - 1
    }
}

impl<T> Debug for BoundedSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundedSender ()")
    }
}

impl<T> BoundedReceiver<T> {
    /// Attempts to dequeue the next value, returns `None` if the Queue is
    /// currently empty
    pub fn try_dequeue(&mut self) -> Option<T> {
        let inner = &*self.inner;

        if inner.readable() == 0 {
            return None;
        }

        let size = inner.buffer.len();
        let read = inner.read_pos.load(atomic::Ordering::Relaxed);

        // # Safety:
        // The readable count guarantees the Slot was written, and the
        // Producer will not reuse it until the Index advances below
        let value = unsafe { (*inner.buffer[read].get()).assume_init_read() };

        inner
            .read_pos
            .store((read + 1) % size, atomic::Ordering::Release);

        Some(value)
    }

    /// Attempts to dequeue exactly `count` values; this fails without
    /// dequeuing anything if the Queue holds fewer than `count` values
    pub fn dequeue_bulk(&mut self, count: usize) -> Option<Vec<T>> {
        let inner = &*self.inner;

        if inner.readable() < count {
            return None;
        }

        let size = inner.buffer.len();
        let mut read = inner.read_pos.load(atomic::Ordering::Relaxed);

        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(unsafe { (*inner.buffer[read].get()).assume_init_read() });
            read = (read + 1) % size;
        }

        inner.read_pos.store(read, atomic::Ordering::Release);

        Some(values)
    }

    /// Checks if the Queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.inner.readable() == 0
    }

    /// The maximum number of values the Queue can hold at a time
    pub fn capacity(&self) -> usize {
        self.inner.buffer.len() - 1
    }
}

impl<T> Debug for BoundedReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundedReceiver ()")
    }
}
