use std::ops::Deref;
use std::sync::atomic;

use super::Slot;

/// A Guard protects a single Memory address and provides shared access to it,
/// as long as the Guard is not dropped
pub struct Guard<T> {
    /// The actual Data-Pointer protected by the Hazard-Pointer
    inner: *mut T,
    /// The Slot that publishes the protection
    slot: Slot,
}

impl<T> Guard<T> {
    pub(super) fn new(inner: *mut T, slot: Slot) -> Self {
        Self { inner, slot }
    }

    /// Gets the underlying Pointer to the Data protected by the Guard
    pub fn raw(&self) -> *const T {
        self.inner as *const T
    }

    /// Loads the most recent Pointer from the given AtomicPtr and updates the
    /// Guard to now protect this new Pointer instead.
    ///
    /// # Usage
    /// This is useful when you already own a Guard but no longer need the
    /// previously protected Data, as it reuses the already acquired Slot and
    /// therefore cannot fail with
    /// [`Exhausted`](super::Exhausted)
    pub fn protect(&mut self, source: &atomic::AtomicPtr<T>, load_order: atomic::Ordering) {
        self.inner = self.slot.protect_from(source, load_order);
    }
}

impl<T> Deref for Guard<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // # Safety:
        //
        // The Pointer stored in the Guard was loaded from the AtomicPtr of a
        // live Datastructure and has been published in the Slot ever since,
        // so the pointed-to Data cannot have been reclaimed while the Guard
        // exists
        unsafe { &*self.inner }
    }
}
