//! An unordered Set with lock-free iteration, used as the connection registry
//! of the fabric
//!
//! Mutations (insert, remove, clear) are serialized by a Mutex, while
//! traversals are lock-free and may run concurrently with any mutation. A
//! traversal that observes a removed Node restarts from the Head; to avoid
//! re-visiting elements after such a restart, the Nodes are kept sorted by
//! their heap address and the Iterator skips everything at or below the
//! highest address it has already visited. This can skip elements inserted
//! during the traversal, but it never yields an element twice.
//!
//! # Reference:
//! * [Hazard Pointers: Safe Memory Reclamation for Lock-Free Objects](https://www.eecg.utoronto.ca/~amza/ece1747h/papers/hazard_pointers.pdf)

use std::{
    fmt::Debug,
    sync::{atomic, Mutex},
};

use crate::hazard_ptr::{self, Slot};

struct Node<T> {
    next: atomic::AtomicPtr<Node<T>>,
    /// Set once the Node has been unlinked, which tells Iterators that the
    /// Nodes own `next` Link can no longer be trusted
    removed: atomic::AtomicBool,
    value: T,
}

/// An unordered Set of values.
///
/// `insert`, `remove` and `clear` block on an internal Mutex, `contains` and
/// iteration are lock-free. Values are compared by equality; inserting an
/// already contained value has no effect
pub struct Set<T: 'static> {
    head: atomic::AtomicPtr<Node<T>>,
    lock: Mutex<()>,
}

// The raw Node pointers are owned by the Set (or, after removal, by the
// retired lists); access to the values follows the usual container rules
unsafe impl<T: Send> Send for Set<T> {}
unsafe impl<T: Send + Sync> Sync for Set<T> {}

impl<T: 'static> Set<T> {
    /// Creates a new empty Set
    pub fn new() -> Self {
        Self {
            head: atomic::AtomicPtr::new(std::ptr::null_mut()),
            lock: Mutex::new(()),
        }
    }

    /// Checks if the Set currently contains no elements
    pub fn is_empty(&self) -> bool {
        self.head.load(atomic::Ordering::Acquire).is_null()
    }

    /// Removes all elements from the Set.
    ///
    /// Concurrent Iterators keep running safely: every unlinked Node is
    /// marked as removed and destroyed through the Hazard-Pointer retirement
    pub fn clear(&self) {
        let _guard = self.lock.lock().unwrap();

        let mut cursor = self.head.swap(std::ptr::null_mut(), atomic::Ordering::AcqRel);

        while !cursor.is_null() {
            let node = unsafe { &*cursor };
            let next = node.next.load(atomic::Ordering::Relaxed);

            node.removed.store(true, atomic::Ordering::Release);
            unsafe {
                hazard_ptr::retire(cursor, |ptr| {
                    drop(unsafe { Box::from_raw(ptr) });
                });
            }

            cursor = next;
        }
    }

    /// Creates an Iterator over the Set.
    ///
    /// The Iterator yields every element that was in the Set for the whole
    /// duration of the iteration exactly once. Elements inserted or removed
    /// while the iteration runs may or may not be observed.
    ///
    /// # Panics
    /// Panics if no two Hazard-Pointer-Slots can be acquired for the
    /// traversal, which means the global Pool is configured too small
    pub fn iter(&self) -> Iter<'_, T> {
        let h0 = Slot::acquire().expect("hazard pointer pool exhausted");
        let h1 = Slot::acquire().expect("hazard pointer pool exhausted");

        Iter {
            set: self,
            current: std::ptr::null_mut(),
            last_visited: std::ptr::null_mut(),
            h0,
            h1,
        }
    }

    /// Calls the given Closure for every element of the Set, using a
    /// lock-free traversal
    pub fn for_each<F>(&self, mut func: F)
    where
        F: FnMut(&T),
    {
        let mut iter = self.iter();
        while let Some(value) = iter.next() {
            func(value);
        }
    }
}

impl<T> Set<T>
where
    T: PartialEq + 'static,
{
    /// Inserts the given value if it is not already in the Set
    pub fn insert(&self, value: T) {
        let _guard = self.lock.lock().unwrap();

        // If the value is already in the Set, abort
        let mut cursor = self.head.load(atomic::Ordering::Relaxed);
        while !cursor.is_null() {
            let node = unsafe { &*cursor };
            if node.value == value {
                return;
            }
            cursor = node.next.load(atomic::Ordering::Relaxed);
        }

        let node = Box::into_raw(Box::new(Node {
            next: atomic::AtomicPtr::new(std::ptr::null_mut()),
            removed: atomic::AtomicBool::new(false),
            value,
        }));

        // Keep the List sorted by ascending Node address, so that Iterators
        // can skip already visited Nodes after a restart
        let mut prev_link = &self.head;
        loop {
            let next = prev_link.load(atomic::Ordering::Relaxed);

            if next.is_null() || next > node {
                unsafe { &*node }.next.store(next, atomic::Ordering::Relaxed);
                prev_link.store(node, atomic::Ordering::Release);
                return;
            }

            prev_link = &unsafe { &*next }.next;
        }
    }

    /// Removes the given value if it is in the Set, returns whether it was
    /// found
    pub fn remove(&self, value: &T) -> bool {
        let _guard = self.lock.lock().unwrap();

        let mut prev_link = &self.head;
        loop {
            let cursor = prev_link.load(atomic::Ordering::Relaxed);
            if cursor.is_null() {
                return false;
            }

            let node = unsafe { &*cursor };
            if node.value == *value {
                prev_link.store(node.next.load(atomic::Ordering::Relaxed), atomic::Ordering::Release);
                node.removed.store(true, atomic::Ordering::Release);
                unsafe {
                    hazard_ptr::retire(cursor, |ptr| {
                        drop(unsafe { Box::from_raw(ptr) });
                    });
                }
                return true;
            }

            prev_link = &node.next;
        }
    }

    /// Checks whether the given value is in the Set, using a lock-free
    /// traversal
    pub fn contains(&self, value: &T) -> bool {
        let mut iter = self.iter();
        while let Some(current) = iter.next() {
            if current == value {
                return true;
            }
        }

        false
    }
}

impl<T: 'static> Default for Set<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Set<T> {
    fn drop(&mut self) {
        // Exclusive access: no Iterator can borrow the Set anymore and
        // unlinked Nodes went through retirement already, so the remaining
        // chain is freed directly
        let mut cursor = self.head.load(atomic::Ordering::Relaxed);
        while !cursor.is_null() {
            let boxed = unsafe { Box::from_raw(cursor) };
            cursor = boxed.next.load(atomic::Ordering::Relaxed);
            drop(boxed);
        }
    }
}

impl<T> Debug for Set<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Set ()")
    }
}

/// A lock-free Iterator over a [`Set`].
///
/// The Iterator holds two Hazard-Pointer-Slots: one protecting the Node it
/// stands on and one protecting the Node it is stepping to. References handed
/// out by [`next`](Iter::next) are only valid until the following step, which
/// the borrow on the Iterator enforces
pub struct Iter<'s, T> {
    set: &'s Set<T>,
    /// The Node the Iterator currently stands on, Null while at the Head
    current: *mut Node<T>,
    /// The highest Node address already yielded, everything at or below it is
    /// skipped after a restart
    last_visited: *mut Node<T>,
    h0: Slot,
    h1: Slot,
}

impl<'s, T> Iter<'s, T> {
    /// Advances to the next element and returns a reference to it, or `None`
    /// once the end of the Set is reached
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&T> {
        loop {
            let next = if self.current.is_null() {
                self.set.head.load(atomic::Ordering::Acquire)
            } else {
                unsafe { &*self.current }.next.load(atomic::Ordering::Acquire)
            };

            self.h1.protect(next);

            // If the Node we stand on was removed, its Link may lead to Nodes
            // that are no longer reachable from the Head, restart
            if !self.current.is_null()
                && unsafe { &*self.current }.removed.load(atomic::Ordering::Acquire)
            {
                self.current = std::ptr::null_mut();
                self.h0.clear();
                continue;
            }

            // Re-check that the Link still leads to `next` now that the
            // protection is published
            let reread = if self.current.is_null() {
                self.set.head.load(atomic::Ordering::Acquire)
            } else {
                unsafe { &*self.current }.next.load(atomic::Ordering::Acquire)
            };
            if reread != next {
                continue;
            }

            // Step onto `next`
            std::mem::swap(&mut self.h0, &mut self.h1);
            self.current = next;

            if next.is_null() {
                return None;
            }

            if next > self.last_visited {
                self.last_visited = next;
                return Some(&unsafe { &*next }.value);
            }

            // Already visited before a restart, keep walking
        }
    }
}
