//! A versioned two-copy Cell for trivially copyable values
//!
//! # Reference:
//! * [Can Seqlocks Get Along With Programming Language Memory Models?](https://www.hpl.hp.com/techreports/2012/HPL-2012-68.pdf)

use std::{cell::UnsafeCell, fmt::Debug, sync::atomic};

/// One of the two Copies of the value, with its pair of version Stamps
struct CopySlot<T> {
    value: UnsafeCell<T>,
    /// Written before the value on every store
    stamp_pre: atomic::AtomicU64,
    /// Written after the value on every store, a Reader that observes both
    /// Stamps as equal has read a complete value
    stamp_post: atomic::AtomicU64,
}

impl<T> CopySlot<T> {
    fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            stamp_pre: atomic::AtomicU64::new(0),
            stamp_post: atomic::AtomicU64::new(0),
        }
    }
}

/// A Cell holding a single value of a [`Copy`] type, stored by one Writer at
/// a time and loaded by any number of Readers concurrently.
///
/// Stores are wait-free. Loads are lock-free: a load only retries if a store
/// overlapped it, which the Reader detects through the version Stamps.
///
/// The `Copy` bound is what makes the two-copy scheme sound: a bitwise copy
/// of the value is the value. Types that do not satisfy it are rejected at
/// compile time.
///
/// Loads stay correct as long as fewer than `2^64` stores complete between a
/// single loads two Stamp reads, which no current hardware can reach
pub struct SpmcAtom<T> {
    copies: [CopySlot<T>; 2],
    /// Index of the Copy currently published to Readers, the Writer always
    /// writes the other one
    reading: atomic::AtomicUsize,
    /// Version of the last store, only touched by the Writer
    version: atomic::AtomicU64,
    /// Guards against two Threads storing at the same time, which the
    /// single-writer contract forbids
    storing: atomic::AtomicBool,
}

// The UnsafeCell suppresses the automatic impls. Concurrent access to the
// value is controlled by the Stamps and the `storing` flag.
unsafe impl<T: Copy + Send> Send for SpmcAtom<T> {}
unsafe impl<T: Copy + Send> Sync for SpmcAtom<T> {}

impl<T> SpmcAtom<T>
where
    T: Copy,
{
    /// Creates the Cell with the given initial value
    pub fn with_value(value: T) -> Self {
        Self {
            copies: [CopySlot::new(value), CopySlot::new(value)],
            reading: atomic::AtomicUsize::new(1),
            version: atomic::AtomicU64::new(0),
            storing: atomic::AtomicBool::new(false),
        }
    }

    /// Stores the given value in the Cell.
    ///
    /// # Panics
    /// Panics if another store is running on a different Thread at the same
    /// time, as the Cell is a single-writer container
    pub fn store(&self, value: T) {
        if self.storing.swap(true, atomic::Ordering::Acquire) {
            panic!("concurrent store on a single-writer cell");
        }

        let version = self
            .version
            .load(atomic::Ordering::Relaxed)
            .wrapping_add(1);
        self.version.store(version, atomic::Ordering::Relaxed);

        let index = self.reading.load(atomic::Ordering::Relaxed) ^ 1;
        let copy = &self.copies[index];

        copy.stamp_pre.store(version, atomic::Ordering::SeqCst);
        // Keep the value write from being hoisted above the pre-Stamp
        atomic::fence(atomic::Ordering::Release);
        // # Safety:
        // Readers never create a reference into the value, they only copy it
        // out with a volatile read, and the `storing` flag excludes any other
        // writer of this Copy
        unsafe { std::ptr::write_volatile(copy.value.get(), value) };
        copy.stamp_post.store(version, atomic::Ordering::SeqCst);

        // Publish this Copy to Readers, the previously published one becomes
        // the next write target
        self.reading.store(index, atomic::Ordering::SeqCst);

        self.storing.store(false, atomic::Ordering::Release);
    }

    /// Loads the last value stored in the Cell
    pub fn load(&self) -> T {
        loop {
            let index = self.reading.load(atomic::Ordering::SeqCst);
            let copy = &self.copies[index];

            let post = copy.stamp_post.load(atomic::Ordering::SeqCst);
            // # Safety:
            // The read may race a concurrent store into the same Copy, which
            // is why it is volatile and only a plain bitwise copy. The Stamp
            // comparison below rejects every torn result
            let value = unsafe { std::ptr::read_volatile(copy.value.get()) };
            atomic::fence(atomic::Ordering::Acquire);
            let pre = copy.stamp_pre.load(atomic::Ordering::SeqCst);

            if pre == post {
                return value;
            }
        }
    }
}

impl<T> SpmcAtom<T>
where
    T: Copy + Default,
{
    /// Creates the Cell with a default-constructed value
    pub fn new() -> Self {
        Self::with_value(T::default())
    }
}

impl<T> Default for SpmcAtom<T>
where
    T: Copy + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for SpmcAtom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SpmcAtom ()")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_load() {
        let atom = SpmcAtom::new();

        assert_eq!(0, atom.load());

        atom.store(13);
        assert_eq!(13, atom.load());

        atom.store(14);
        assert_eq!(14, atom.load());
    }

    #[test]
    fn initial_value() {
        let atom = SpmcAtom::with_value((1, 2, 3));

        assert_eq!((1, 2, 3), atom.load());
    }

    #[test]
    fn load_is_repeatable() {
        let atom = SpmcAtom::with_value(42_u64);

        assert_eq!(42, atom.load());
        assert_eq!(42, atom.load());
    }
}
