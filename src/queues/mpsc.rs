//! A wait-free bounded Multi-Producer Single-Consumer Queue
//!
//! Producers reserve their Slot with two atomic Counter operations and then
//! fill it independently of each other; a per-Slot Journal of full/empty
//! Flags is what publishes each finished write to the Consumer. A Producer
//! that stalls between reserving and publishing delays the Consumer at that
//! Slot, but never blocks other Producers.
//!
//! The Queue is a single shared object with `&self` operations on both ends,
//! so it can be used directly as the shared value of a fabric connection

use std::{cell::UnsafeCell, fmt::Debug, mem::MaybeUninit};

use crate::sync::atomic;

/// A wait-free bounded MPSC Queue.
///
/// The requested capacity is rounded up to the next power of two. Any number
/// of Threads may enqueue concurrently; only one Thread at a time may
/// dequeue
pub struct Queue<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// The per-Slot full/empty Flags; a Slots value write becomes visible to
    /// the Consumer only through its Journal entry
    journal: Box<[atomic::AtomicBool]>,
    mask: usize,
    /// The reservation Counter of the Producers, re-masked after every
    /// increment to keep it bounded
    head: atomic::AtomicUsize,
    /// How many Slots are free to reserve; transiently negative while a
    /// failed reservation is being rolled back
    writable: atomic::AtomicIsize,
    /// The Consumer position
    tail: atomic::AtomicUsize,
}

// Slot access is handed over through the Journal Flags: a Producer owns its
// Slot from reservation to publication, the Consumer owns it from observing
// the publication to clearing the Flag
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates a new Queue with at least the given capacity, rounded up to
    /// the next power of two
    pub fn new(capacity: usize) -> Self {
        let size = capacity.max(1).next_power_of_two();

        let mut buffer = Vec::with_capacity(size);
        let mut journal = Vec::with_capacity(size);
        for _ in 0..size {
            buffer.push(UnsafeCell::new(MaybeUninit::uninit()));
            journal.push(atomic::AtomicBool::new(false));
        }

        Self {
            buffer: buffer.into_boxed_slice(),
            journal: journal.into_boxed_slice(),
            mask: size - 1,
            head: atomic::AtomicUsize::new(0),
            writable: atomic::AtomicIsize::new(size as isize),
            tail: atomic::AtomicUsize::new(0),
        }
    }

    /// The number of Slots in the Queue
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Checks if the Queue is currently full
    pub fn is_full(&self) -> bool {
        self.writable.load(atomic::Ordering::Acquire) < 1
    }

    /// Checks if the Queue is currently empty
    pub fn is_empty(&self) -> bool {
        let tail = self.tail.load(atomic::Ordering::Acquire);
        !self.journal[tail & self.mask].load(atomic::Ordering::Acquire)
    }

    /// Reserves `count` consecutive Slots, returning the Index of the first
    /// one
    fn reserve(&self, count: usize) -> Option<usize> {
        let old = self.writable.fetch_sub(count as isize, atomic::Ordering::AcqRel);
        if old < count as isize {
            self.writable.fetch_add(count as isize, atomic::Ordering::AcqRel);
            return None;
        }

        let pos = self.head.fetch_add(count, atomic::Ordering::AcqRel) & self.mask;
        // Re-mask the Counter; this keeps it bounded and, because the size is
        // a power of two, never changes any reserved position
        self.head.fetch_and(self.mask, atomic::Ordering::AcqRel);

        Some(pos)
    }

    /// Attempts to enqueue the given value, handing it back if the Queue is
    /// full
    pub fn try_enqueue(&self, value: T) -> Result<(), T> {
        let pos = match self.reserve(1) {
            Some(pos) => pos,
            None => return Err(value),
        };

        // # Safety:
        // The reservation gives this Producer exclusive ownership of the Slot
        // until the Journal entry below publishes it
        unsafe { (*self.buffer[pos].get()).write(value) };
        self.journal[pos].store(true, atomic::Ordering::Release);

        Ok(())
    }

    /// Attempts to enqueue all the given values; this fails without enqueuing
    /// anything if the Queue cannot reserve room for all of them at once.
    ///
    /// The values become visible to the Consumer one by one, in order
    pub fn enqueue_bulk(&self, values: &[T]) -> bool
    where
        T: Clone,
    {
        if values.is_empty() {
            return true;
        }

        let mut pos = match self.reserve(values.len()) {
            Some(pos) => pos,
            None => return false,
        };

        for value in values {
            unsafe { (*self.buffer[pos].get()).write(value.clone()) };
            self.journal[pos].store(true, atomic::Ordering::Release);
            pos = (pos + 1) & self.mask;
        }

        true
    }

    /// Attempts to dequeue the next value, returns `None` if the Queue is
    /// currently empty.
    ///
    /// Only a single Thread may dequeue at a time
    pub fn try_dequeue(&self) -> Option<T> {
        loop {
            let tail = self.tail.load(atomic::Ordering::Acquire);
            let pos = tail & self.mask;

            if !self.journal[pos].load(atomic::Ordering::Acquire) {
                return None;
            }

            // The compare-exchange is never contended in the contracted
            // single-consumer case; it only exists so that a second Consumer
            // cannot turn into a double-read
            if self
                .tail
                .compare_exchange(
                    tail,
                    (tail + 1) & self.mask,
                    atomic::Ordering::AcqRel,
                    atomic::Ordering::Acquire,
                )
                .is_err()
            {
                continue;
            }

            // # Safety:
            // The Journal entry was observed as full and the Tail advance
            // gives this Consumer exclusive ownership of the Slot
            let value = unsafe { (*self.buffer[pos].get()).assume_init_read() };
            self.journal[pos].store(false, atomic::Ordering::Release);
            self.writable.fetch_add(1, atomic::Ordering::AcqRel);

            return Some(value);
        }
    }

    /// Attempts to dequeue exactly `count` values; this fails without
    /// dequeuing anything if fewer than `count` Slots are currently readable
    pub fn dequeue_bulk(&self, count: usize) -> Option<Vec<T>> {
        if count == 0 {
            return Some(Vec::new());
        }
        if count > self.buffer.len() {
            return None;
        }

        loop {
            let tail = self.tail.load(atomic::Ordering::Acquire);

            for i in 0..count {
                if !self.journal[(tail + i) & self.mask].load(atomic::Ordering::Acquire) {
                    return None;
                }
            }

            if self
                .tail
                .compare_exchange(
                    tail,
                    (tail + count) & self.mask,
                    atomic::Ordering::AcqRel,
                    atomic::Ordering::Acquire,
                )
                .is_err()
            {
                continue;
            }

            let mut values = Vec::with_capacity(count);
            let mut pos = tail & self.mask;
            for _ in 0..count {
                values.push(unsafe { (*self.buffer[pos].get()).assume_init_read() });
                self.journal[pos].store(false, atomic::Ordering::Release);
                pos = (pos + 1) & self.mask;
            }
            self.writable.fetch_add(count as isize, atomic::Ordering::AcqRel);

            return Some(values);
        }
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        let mut pos = self.tail.load(atomic::Ordering::Relaxed) & self.mask;

        for _ in 0..self.buffer.len() {
            if !self.journal[pos].load(atomic::Ordering::Relaxed) {
                break;
            }
            unsafe { (*self.buffer[pos].get()).assume_init_drop() };
            pos = (pos + 1) & self.mask;
        }
    }
}

impl<T> Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MPSC-Queue ( capacity = {} )", self.buffer.len())
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_rounded_up() {
        let queue = Queue::<u32>::new(10);
        assert_eq!(16, queue.capacity());

        let queue = Queue::<u32>::new(16);
        assert_eq!(16, queue.capacity());
    }

    #[test]
    fn enqueue_dequeue() {
        let queue = Queue::new(4);

        assert_eq!(Ok(()), queue.try_enqueue(13));
        assert_eq!(false, queue.is_empty());
        assert_eq!(Some(13), queue.try_dequeue());
        assert_eq!(true, queue.is_empty());
    }

    #[test]
    fn fill_and_drain() {
        let queue = Queue::new(4);

        for i in 0..4 {
            assert_eq!(Ok(()), queue.try_enqueue(i));
        }
        assert_eq!(true, queue.is_full());
        assert_eq!(Err(99), queue.try_enqueue(99));

        for i in 0..4 {
            assert_eq!(Some(i), queue.try_dequeue());
        }
        assert_eq!(None, queue.try_dequeue());
        assert_eq!(false, queue.is_full());
    }

    #[test]
    fn bulk_roundtrip() {
        let queue = Queue::new(8);

        assert_eq!(true, queue.enqueue_bulk(&[1, 2, 3]));
        assert_eq!(None, queue.dequeue_bulk(4));
        assert_eq!(Some(vec![1, 2, 3]), queue.dequeue_bulk(3));
    }

    #[test]
    fn bulk_enqueue_all_or_nothing() {
        let queue = Queue::new(4);

        assert_eq!(true, queue.enqueue_bulk(&[1, 2, 3]));
        assert_eq!(false, queue.enqueue_bulk(&[4, 5]));
        assert_eq!(Ok(()), queue.try_enqueue(4));

        assert_eq!(Some(vec![1, 2, 3, 4]), queue.dequeue_bulk(4));
    }

    #[test]
    fn unconsumed_values_are_dropped() {
        let value = std::sync::Arc::new(0_u8);

        let queue = Queue::new(4);
        assert_eq!(Ok(()), queue.try_enqueue(value.clone()));

        drop(queue);

        assert_eq!(1, std::sync::Arc::strong_count(&value));
    }
}

#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use loom::thread;

    #[test]
    fn two_producers() {
        loom::model(|| {
            let queue = std::sync::Arc::new(Queue::new(2));

            let q1 = queue.clone();
            let q2 = queue.clone();

            let p1 = thread::spawn(move || {
                let _ = q1.try_enqueue(1);
            });
            let p2 = thread::spawn(move || {
                let _ = q2.try_enqueue(2);
            });

            p1.join().unwrap();
            p2.join().unwrap();

            let mut seen = Vec::new();
            while let Some(value) = queue.try_dequeue() {
                seen.push(value);
            }

            seen.sort_unstable();
            assert_eq!(vec![1, 2], seen);
        });
    }
}
