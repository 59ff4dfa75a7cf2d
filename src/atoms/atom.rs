//! A versioned-node Cell for values of arbitrary type, built on reference
//! counted Nodes, a lock-free Free-List and Hazard-Pointer protection

use std::{
    cell::UnsafeCell,
    fmt::Debug,
    sync::{atomic, Arc},
};

use portable_atomic::AtomicU128;

use crate::hazard_ptr::Slot;

/// A single heap Node carrying one value.
///
/// A Node is in exactly one of three places: published as `current` of the
/// Atom, owned privately by a Writer or Reader handle, or parked on the
/// Free-List
struct Node<T> {
    value: UnsafeCell<T>,
    /// Number of current References: the published `current` Pointer counts
    /// as one, every Reader holding the Node counts as one
    refs: atomic::AtomicUsize,
    /// The next Node on the Free-List, only meaningful while parked there
    next: atomic::AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn boxed(value: T, refs: usize) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(value),
            refs: atomic::AtomicUsize::new(refs),
            next: atomic::AtomicPtr::new(std::ptr::null_mut()),
        }))
    }
}

/// Packs a Free-List Head out of a version Counter and the first Node.
///
/// The version Counter is bumped on every successful push and pop, which is
/// what keeps a stalled compare-exchange from succeeding against a Head that
/// was popped and re-pushed in the meantime
fn pack<T>(version: u64, ptr: *mut Node<T>) -> u128 {
    ((version as u128) << 64) | (ptr as usize as u64 as u128)
}

fn unpack<T>(raw: u128) -> (u64, *mut Node<T>) {
    ((raw >> 64) as u64, (raw as u64) as usize as *mut Node<T>)
}

/// A Cell holding a single value of any type `T`, shared between
/// [`AtomWriter`] and [`AtomReader`] handles.
///
/// Every `store` of a Writer publishes a new value, every `load` of a Reader
/// observes the most recent published value. Readers never block Writers and
/// never observe a freed Node: the current Node is pinned with a
/// Hazard-Pointer while its Reference-Count is raised.
///
/// The Atom itself is shared through an [`Arc`], the handles each keep their
/// own clone
pub struct Atom<T> {
    current: atomic::AtomicPtr<Node<T>>,
    /// Head of the Free-List with the ABA version Counter packed alongside
    free: AtomicU128,
}

// Nodes are plain heap allocations whose value field is only accessed by the
// single handle that currently owns the Node (refcount rules), so the usual
// container bounds apply
unsafe impl<T: Send> Send for Atom<T> {}
unsafe impl<T: Send + Sync> Sync for Atom<T> {}

impl<T> Atom<T> {
    /// Creates the Cell with the given initial value
    pub fn with_value(value: T) -> Self {
        Self {
            current: atomic::AtomicPtr::new(Node::boxed(value, 1)),
            free: AtomicU128::new(0),
        }
    }

    /// Drops one Reference of the Node, parking it on the Free-List when the
    /// count reaches 0
    fn unref(&self, node: *mut Node<T>) {
        let previous = unsafe { &*node }.refs.fetch_sub(1, atomic::Ordering::AcqRel);

        if previous == 1 {
            self.push_free(node);
        }
    }

    fn push_free(&self, node: *mut Node<T>) {
        loop {
            let head = self.free.load(atomic::Ordering::Acquire);
            let (version, first) = unpack::<T>(head);

            unsafe { &*node }.next.store(first, atomic::Ordering::Release);

            let next_head = pack(version.wrapping_add(1), node);
            if self
                .free
                .compare_exchange_weak(
                    head,
                    next_head,
                    atomic::Ordering::AcqRel,
                    atomic::Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    fn take_free(&self) -> Option<*mut Node<T>> {
        let slot = match Slot::acquire() {
            Ok(slot) => slot,
            Err(_) => return None,
        };

        loop {
            let head = self.free.load(atomic::Ordering::Acquire);
            let (version, first) = unpack::<T>(head);

            if first.is_null() {
                return None;
            }

            // Protect `first` before touching its next Link: a handle being
            // dropped may pop and retire Free-List Nodes at any time
            slot.protect(first);
            if self.free.load(atomic::Ordering::Acquire) != head {
                continue;
            }

            let next = unsafe { &*first }.next.load(atomic::Ordering::Acquire);

            let next_head = pack(version.wrapping_add(1), next);
            if self
                .free
                .compare_exchange(
                    head,
                    next_head,
                    atomic::Ordering::AcqRel,
                    atomic::Ordering::Acquire,
                )
                .is_ok()
            {
                return Some(first);
            }
        }
    }

    /// Publishes `node` (which must be unreferenced) as the new current Node
    /// and hands back a replacement Node for the Writer
    fn make_current(&self, node: *mut Node<T>) -> *mut Node<T>
    where
        T: Default,
    {
        unsafe { &*node }.refs.store(1, atomic::Ordering::Release);

        let old = self.current.swap(node, atomic::Ordering::AcqRel);
        self.unref(old);

        match self.take_free() {
            Some(free) => free,
            // A concurrent unref may not have finished parking its Node yet,
            // in that case grow by one Node instead of spinning on the List
            None => Node::boxed(T::default(), 0),
        }
    }

    /// Returns the current Node with its Reference-Count raised, giving up
    /// the Reference on `node`.
    ///
    /// # Panics
    /// Panics if no Hazard-Pointer-Slot can be acquired
    fn current_for(&self, node: *mut Node<T>) -> *mut Node<T> {
        let mut target = self.current.load(atomic::Ordering::Acquire);
        if target == node {
            return node;
        }

        // Hold the Slot before giving up the old Node, so the old Node is
        // still referenced in case no Slot is free and this panics
        let slot = Slot::acquire().expect("hazard pointer pool exhausted");

        self.unref(node);

        loop {
            slot.protect(target);

            let current = self.current.load(atomic::Ordering::Acquire);
            if current != target {
                target = current;
                continue;
            }

            // A count of 0 means the Node was just replaced and is on its way
            // to the Free-List, it must not be revived
            let refs = unsafe { &*target }.refs.load(atomic::Ordering::Acquire);
            if refs == 0 {
                target = self.current.load(atomic::Ordering::Acquire);
                continue;
            }

            if unsafe { &*target }
                .refs
                .compare_exchange_weak(
                    refs,
                    refs + 1,
                    atomic::Ordering::AcqRel,
                    atomic::Ordering::Relaxed,
                )
                .is_ok()
            {
                return target;
            }
        }
    }
}

impl<T> Atom<T>
where
    T: Default,
{
    /// Creates the Cell with a default-constructed value
    pub fn new() -> Self {
        Self::with_value(T::default())
    }
}

impl<T> Default for Atom<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Atom<T> {
    fn drop(&mut self) {
        // All handles hold an Arc to the Atom, so at this point no Node is
        // referenced anymore and the remaining allocations can be freed
        // directly
        let current = self.current.load(atomic::Ordering::Relaxed);
        drop(unsafe { Box::from_raw(current) });

        let (_, mut cursor) = unpack::<T>(self.free.load(atomic::Ordering::Relaxed));
        while !cursor.is_null() {
            let boxed = unsafe { Box::from_raw(cursor) };
            cursor = boxed.next.load(atomic::Ordering::Relaxed);
            drop(boxed);
        }
    }
}

impl<T> Debug for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Atom ()")
    }
}

/// The writing half of an [`Atom`].
///
/// A Writer owns a private, unpublished Node. The value to publish is written
/// into that Node and [`publish`](AtomWriter::publish) swaps it with the
/// Atoms current Node in a single atomic exchange
pub struct AtomWriter<T> {
    atom: Arc<Atom<T>>,
    node: *mut Node<T>,
}

unsafe impl<T: Send + Sync> Send for AtomWriter<T> {}

impl<T> AtomWriter<T> {
    /// Creates a new Writer whose unpublished Node starts out with the given
    /// value
    pub fn with_value(atom: &Arc<Atom<T>>, value: T) -> Self {
        Self {
            atom: atom.clone(),
            node: Node::boxed(value, 0),
        }
    }

    /// The value that the next [`publish`](AtomWriter::publish) makes visible
    pub fn value(&self) -> &T {
        // # Safety:
        // The Writers Node is unpublished (Reference-Count 0) and owned by
        // this handle alone, no other Thread accesses its value
        unsafe { &*(*self.node).value.get() }
    }

    /// Mutable access to the value that the next
    /// [`publish`](AtomWriter::publish) makes visible
    pub fn value_mut(&mut self) -> &mut T {
        // # Safety:
        // See `value`
        unsafe { &mut *(*self.node).value.get() }
    }

    /// Makes the Writers value the current value of the Atom
    pub fn publish(&mut self)
    where
        T: Default,
    {
        self.node = self.atom.make_current(self.node);
    }

    /// Stores the given value, equivalent to writing through
    /// [`value_mut`](AtomWriter::value_mut) followed by a
    /// [`publish`](AtomWriter::publish)
    pub fn store(&mut self, value: T)
    where
        T: Default,
    {
        *self.value_mut() = value;
        self.publish();
    }
}

impl<T> AtomWriter<T>
where
    T: Default,
{
    /// Creates a new Writer with a default-constructed unpublished value
    pub fn new(atom: &Arc<Atom<T>>) -> Self {
        Self::with_value(atom, T::default())
    }
}

impl<T> Drop for AtomWriter<T> {
    fn drop(&mut self) {
        // The private Node might have come from the Free-List and a stalled
        // `take_free` of another Thread may still inspect it, so it goes
        // through retirement instead of being freed directly
        let node = self.node;
        unsafe {
            crate::hazard_ptr::retire(node, |ptr| {
                drop(unsafe { Box::from_raw(ptr) });
            });
        }
    }
}

impl<T> Debug for AtomWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AtomWriter ()")
    }
}

/// The reading half of an [`Atom`].
///
/// A Reader always holds one referenced Node, initially its own and after
/// every [`load`](AtomReader::load) the Node that was current at that point.
/// The held Node is what keeps the loaned value alive between loads
pub struct AtomReader<T> {
    atom: Arc<Atom<T>>,
    node: *mut Node<T>,
}

unsafe impl<T: Send + Sync> Send for AtomReader<T> {}

impl<T> AtomReader<T> {
    /// Creates a new Reader which returns the given value until its first
    /// [`load`](AtomReader::load)
    pub fn with_value(atom: &Arc<Atom<T>>, value: T) -> Self {
        Self {
            atom: atom.clone(),
            node: Node::boxed(value, 1),
        }
    }

    /// Loads the most recent value stored in the Atom.
    ///
    /// The returned reference stays valid until the next call to `load`.
    ///
    /// # Panics
    /// Panics if no Hazard-Pointer-Slot can be acquired, which means the
    /// global Pool is configured too small
    pub fn load(&mut self) -> &T {
        self.node = self.atom.current_for(self.node);
        self.value()
    }

    /// The value of the last [`load`](AtomReader::load), without observing
    /// newer stores
    pub fn value(&self) -> &T {
        // # Safety:
        // The handle holds a Reference on its Node, so the Node is neither
        // on the Free-List nor writable by any Writer
        unsafe { &*(*self.node).value.get() }
    }
}

impl<T> AtomReader<T>
where
    T: Default,
{
    /// Creates a new Reader which returns a default-constructed value until
    /// its first [`load`](AtomReader::load)
    pub fn new(atom: &Arc<Atom<T>>) -> Self {
        Self::with_value(atom, T::default())
    }
}

impl<T> Drop for AtomReader<T> {
    fn drop(&mut self) {
        self.atom.unref(self.node);

        // The Reader added one Node to the system on construction, so take
        // one out of the Free-List again to bound its growth
        if let Some(node) = self.atom.take_free() {
            unsafe {
                crate::hazard_ptr::retire(node, |ptr| {
                    drop(unsafe { Box::from_raw(ptr) });
                });
            }
        }
    }
}

impl<T> Debug for AtomReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AtomReader ()")
    }
}
