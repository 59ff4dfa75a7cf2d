//! A lock-free bounded Multi-Producer Multi-Consumer Queue
//!
//! Producers and Consumers race on a pair of full-word iteration Counters; a
//! successful compare-exchange on the Counter reserves the Slot, and the
//! per-Slot state finalizes visibility afterwards. The Counters are never
//! wrapped, only their masked value indexes the Buffer, which is what makes
//! the "state unchanged and Counter unchanged" full/empty tests reliable

use std::{cell::UnsafeCell, fmt::Debug, mem::MaybeUninit};

use crate::sync::atomic;

const EMPTY: u8 = 0;
const FULL: u8 = 1;

/// A single Slot of the Buffer
struct Element<T> {
    state: atomic::AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A lock-free bounded MPMC Queue.
///
/// The requested capacity is rounded up to the next power of two. Any number
/// of Threads may enqueue and dequeue concurrently; an operation may retry
/// internally under contention, but some Thread always makes progress
pub struct Queue<T> {
    buffer: Box<[Element<T>]>,
    mask: u64,
    write_pos: atomic::AtomicU64,
    read_pos: atomic::AtomicU64,
}

// A Slot is owned by exactly one Producer between its Counter reservation and
// setting the state to FULL, and by exactly one Consumer between its Counter
// reservation and setting the state to EMPTY
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates a new Queue with at least the given capacity, rounded up to
    /// the next power of two
    pub fn new(capacity: usize) -> Self {
        let size = capacity.max(1).next_power_of_two();

        let mut buffer = Vec::with_capacity(size);
        for _ in 0..size {
            buffer.push(Element {
                state: atomic::AtomicU8::new(EMPTY),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            });
        }

        Self {
            buffer: buffer.into_boxed_slice(),
            mask: (size - 1) as u64,
            write_pos: atomic::AtomicU64::new(0),
            read_pos: atomic::AtomicU64::new(0),
        }
    }

    /// The number of Slots in the Queue
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Attempts to enqueue the given value, handing it back if the Queue is
    /// full
    pub fn try_enqueue(&self, value: T) -> Result<(), T> {
        let pos;

        loop {
            let iter = self.write_pos.load(atomic::Ordering::Acquire);
            let index = (iter & self.mask) as usize;

            let state = self.buffer[index].state.load(atomic::Ordering::Acquire);
            if state == FULL {
                // Only a stable Counter proves the Queue is actually full;
                // otherwise another Producer won the Slot and we retry
                if iter == self.write_pos.load(atomic::Ordering::Acquire) {
                    return Err(value);
                }
                continue;
            }

            if self
                .write_pos
                .compare_exchange_weak(
                    iter,
                    iter + 1,
                    atomic::Ordering::AcqRel,
                    atomic::Ordering::Acquire,
                )
                .is_ok()
            {
                pos = index;
                break;
            }
        }

        // # Safety:
        // Winning the Counter compare-exchange on an EMPTY Slot gives this
        // Producer exclusive ownership until the state write publishes it
        unsafe { (*self.buffer[pos].value.get()).write(value) };
        self.buffer[pos].state.store(FULL, atomic::Ordering::Release);

        Ok(())
    }

    /// Attempts to dequeue the next value, returns `None` if the Queue is
    /// currently empty
    pub fn try_dequeue(&self) -> Option<T> {
        let pos;

        loop {
            let iter = self.read_pos.load(atomic::Ordering::Acquire);
            let index = (iter & self.mask) as usize;

            let state = self.buffer[index].state.load(atomic::Ordering::Acquire);
            if state == EMPTY {
                if iter == self.read_pos.load(atomic::Ordering::Acquire) {
                    return None;
                }
                continue;
            }

            if self
                .read_pos
                .compare_exchange_weak(
                    iter,
                    iter + 1,
                    atomic::Ordering::AcqRel,
                    atomic::Ordering::Acquire,
                )
                .is_ok()
            {
                pos = index;
                break;
            }
        }

        // # Safety:
        // Winning the Counter compare-exchange on a FULL Slot gives this
        // Consumer exclusive ownership until the state write releases it
        let value = unsafe { (*self.buffer[pos].value.get()).assume_init_read() };
        self.buffer[pos].state.store(EMPTY, atomic::Ordering::Release);

        Some(value)
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        for element in self.buffer.iter() {
            if element.state.load(atomic::Ordering::Relaxed) == FULL {
                unsafe { (*element.value.get()).assume_init_drop() };
            }
        }
    }
}

impl<T> Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MPMC-Queue ( capacity = {} )", self.buffer.len())
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue() {
        let queue = Queue::new(4);

        assert_eq!(Ok(()), queue.try_enqueue(13));
        assert_eq!(Some(13), queue.try_dequeue());
        assert_eq!(None, queue.try_dequeue());
    }

    #[test]
    fn fill_and_drain() {
        let queue = Queue::new(4);

        for i in 0..4 {
            assert_eq!(Ok(()), queue.try_enqueue(i));
        }
        assert_eq!(Err(99), queue.try_enqueue(99));

        assert_eq!(Some(0), queue.try_dequeue());
        assert_eq!(Ok(()), queue.try_enqueue(4));

        for i in 1..5 {
            assert_eq!(Some(i), queue.try_dequeue());
        }
        assert_eq!(None, queue.try_dequeue());
    }

    #[test]
    fn fifo_order() {
        let queue = Queue::new(8);

        for i in 0..6 {
            assert_eq!(Ok(()), queue.try_enqueue(i));
        }
        for i in 0..6 {
            assert_eq!(Some(i), queue.try_dequeue());
        }
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
    fn producer_consumer_race() {
        loom::model(|| {
            let queue = std::sync::Arc::new(Queue::new(2));

            let q1 = queue.clone();
            let producer = thread::spawn(move || {
                q1.try_enqueue(7).unwrap();
            });

            let value = queue.try_dequeue();
            producer.join().unwrap();

            match value {
                Some(seen) => assert_eq!(7, seen),
                None => assert_eq!(Some(7), queue.try_dequeue()),
            }
        });
    }
}
