//! A simple implementation of Hazard-Pointers with a fixed, process-global
//! pool of Pointer-Slots
//!
//! A Thread that wants to dereference a Node that another Thread may be
//! removing, first publishes the Nodes address in one of the Slots. A Thread
//! that removed a Node from its Datastructure passes it to [`retire`], which
//! defers its destruction until no Slot publishes its address anymore.
//!
//! # Reference:
//! * [Hazard Pointers: Safe Memory Reclamation for Lock-Free Objects](https://www.eecg.utoronto.ca/~amza/ece1747h/papers/hazard_pointers.pdf)

use std::sync::atomic;

mod slot;
use slot::HazardSlot;

mod retired;
use retired::RetireNode;

mod guard;
pub use guard::Guard;

/// The Number of Hazard-Pointer-Slots shared by the entire Process.
///
/// This is a power of two, so that probing for a free Slot can simply mask
/// the Probe-Index
pub const SLOT_COUNT: usize = 256;

/// The Number of retired Entries a Thread accumulates before it attempts to
/// reclaim them.
///
/// This is deliberately a separate Constant from [`SLOT_COUNT`], even though
/// both currently have the same Value
pub(crate) const RETIRE_THRESHOLD: usize = 256;

/// The global Pool of Hazard-Pointer-Slots
static SLOTS: [HazardSlot; SLOT_COUNT] = [HazardSlot::INIT; SLOT_COUNT];

/// The Index at which the next Probe for a free Slot starts, updated by every
/// successful acquire to spread Threads over the Pool
static ALLOC_HINT: atomic::AtomicUsize = atomic::AtomicUsize::new(0);

/// The Error returned when all Hazard-Pointer-Slots are currently in use.
///
/// This is not a transient condition that should be retried in a loop, but a
/// sign that the Pool is too small for the number of concurrently reading
/// Threads
#[derive(Debug, PartialEq, Eq)]
pub struct Exhausted;

/// An exclusively owned Hazard-Pointer-Slot.
///
/// While the Slot is held, the Pointer published through it will not be
/// destroyed by any [`retire`]/reclaim cycle. Dropping the Slot clears the
/// published Pointer and returns the Slot to the global Pool
pub struct Slot {
    slot: &'static HazardSlot,
}

impl Slot {
    /// Claims a free Slot from the global Pool.
    ///
    /// The Pool is probed starting just after a shared Hint-Index and every
    /// Slot is visited at most once, so after one full revolution without a
    /// free Slot this fails with [`Exhausted`]
    pub fn acquire() -> Result<Self, Exhausted> {
        let mask = SLOT_COUNT - 1;
        let start = ALLOC_HINT.load(atomic::Ordering::Relaxed) & mask;
        let mut index = start;

        loop {
            index = (index + 1) & mask;

            if SLOTS[index].try_claim() {
                ALLOC_HINT.store(index, atomic::Ordering::Relaxed);
                return Ok(Self {
                    slot: &SLOTS[index],
                });
            }

            if index == start {
                return Err(Exhausted);
            }
        }
    }

    /// Publishes the given Pointer in this Slot, protecting it from
    /// reclamation until it is overwritten or cleared
    pub fn protect<T>(&self, ptr: *mut T) {
        self.slot
            .ptr
            .store(ptr as *mut (), atomic::Ordering::SeqCst);
    }

    /// Clears the published Pointer without giving up the Slot itself
    pub fn clear(&self) {
        self.slot
            .ptr
            .store(std::ptr::null_mut(), atomic::Ordering::SeqCst);
    }

    /// Loads the most recent Pointer from the given AtomicPtr and publishes it
    /// in this Slot.
    ///
    /// The Source is re-read after publishing until both reads agree, to make
    /// sure the Pointer was not replaced before the protection became visible
    /// to reclaiming Threads
    pub fn protect_from<T>(
        &self,
        source: &atomic::AtomicPtr<T>,
        load_order: atomic::Ordering,
    ) -> *mut T {
        let mut target = source.load(load_order);

        loop {
            self.protect(target);

            let current = source.load(load_order);
            if current == target {
                return target;
            }

            target = current;
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.clear();
        self.slot.release();
    }
}

/// Reads the Data from the given AtomicPtr and protects it using a
/// Hazard-Pointer.
///
/// Returns a Guard through which the loaded Data can be accessed and which
/// protects the Data from being reclaimed as long as the Guard itself lives.
/// The AtomicPtr must point to a valid instance of `T` whenever it is not
/// null, because the Guard hands out references to the pointed-to Data
pub fn protect<T>(
    source: &atomic::AtomicPtr<T>,
    load_order: atomic::Ordering,
) -> Result<Guard<T>, Exhausted> {
    let slot = Slot::acquire()?;
    let inner = slot.protect_from(source, load_order);

    Ok(Guard::new(inner, slot))
}

/// Marks the given Pointer as retired: once no Hazard-Pointer-Slot publishes
/// its address anymore, the given `destroy` Function will be called with it to
/// properly clean up the Data.
///
/// There is no guarantee about when the Pointer will be reclaimed, only that
/// it will not be reclaimed while some Slot still protects it.
///
/// # Safety
/// The Pointer must no longer be reachable through any shared Datastructure,
/// so that no new protections for it can be established, and it must be valid
/// to destroy it with the given Function once all current protections are gone
pub unsafe fn retire<T: 'static, F>(ptr: *mut T, destroy: F)
where
    F: FnOnce(*mut T) + 'static,
{
    retired::retire_node(RetireNode::new(ptr as *mut (), move || destroy(ptr)));
}

/// Forces a reclamation attempt for the retired Entries of the current
/// Thread.
///
/// This does not guarantee that anything is actually reclaimed, as every
/// Entry might still be protected. Reclamation also runs automatically once
/// enough Entries have piled up, so calling this is only useful to move the
/// reclamation cost out of a critical path
pub fn reclaim() {
    retired::scan();
}

/// Collects the currently published Pointers of all Slots into a Set
pub(crate) fn protected_set() -> std::collections::HashSet<*mut ()> {
    let mut protections = std::collections::HashSet::new();

    for slot in SLOTS.iter() {
        let ptr = slot.ptr.load(atomic::Ordering::SeqCst);
        if !ptr.is_null() {
            protections.insert(ptr);
        }
    }

    protections
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct DropCheck {
        d_count: Arc<atomic::AtomicU64>,
    }
    impl DropCheck {
        pub fn new() -> Self {
            Self {
                d_count: Arc::new(atomic::AtomicU64::new(0)),
            }
        }
        pub fn drop_count(&self) -> u64 {
            self.d_count.load(atomic::Ordering::SeqCst)
        }
    }
    impl Drop for DropCheck {
        fn drop(&mut self) {
            self.d_count.fetch_add(1, atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn protect_retire_reclaim() {
        let drop_chk = DropCheck::new();

        let raw_ptr = Box::into_raw(Box::new(drop_chk.clone()));
        let shared_ptr = atomic::AtomicPtr::new(raw_ptr);

        let guard = protect(&shared_ptr, atomic::Ordering::SeqCst).unwrap();

        assert_eq!(0, guard.drop_count());

        let other_ptr = Box::into_raw(Box::new(drop_chk.clone()));
        shared_ptr.store(other_ptr, atomic::Ordering::SeqCst);

        unsafe {
            retire(raw_ptr, |ptr| {
                drop(unsafe { Box::from_raw(ptr) });
            });
        }

        reclaim();

        // The Guard still protects the retired Allocation
        assert_eq!(0, guard.drop_count());

        drop(guard);
        reclaim();

        assert_eq!(1, drop_chk.drop_count());

        unsafe {
            retire(other_ptr, |ptr| {
                drop(unsafe { Box::from_raw(ptr) });
            });
        }
        reclaim();

        assert_eq!(2, drop_chk.drop_count());
    }

    #[test]
    fn slot_roundtrip() {
        let slot = Slot::acquire().unwrap();

        let mut value = 13_u32;
        slot.protect(&mut value as *mut u32);

        assert!(protected_set().contains(&(&mut value as *mut u32 as *mut ())));

        slot.clear();

        assert!(!protected_set().contains(&(&mut value as *mut u32 as *mut ())));
    }

    #[test]
    fn reprotect_guard() {
        let first = Box::into_raw(Box::new(13_u32));
        let second = Box::into_raw(Box::new(14_u32));

        let atom_ptr = atomic::AtomicPtr::new(first);

        let mut guard = protect(&atom_ptr, atomic::Ordering::SeqCst).unwrap();
        assert_eq!(13, *guard);

        atom_ptr.store(second, atomic::Ordering::SeqCst);
        guard.protect(&atom_ptr, atomic::Ordering::SeqCst);
        assert_eq!(14, *guard);

        drop(guard);
        drop(unsafe { Box::from_raw(first) });
        drop(unsafe { Box::from_raw(second) });
    }
}
