use std::sync::atomic;

/// A single Slot in the global Hazard-Pointer pool
pub(super) struct HazardSlot {
    /// The Pointer currently protected through this Slot, Null if the Slot
    /// does not protect anything right now
    pub(super) ptr: atomic::AtomicPtr<()>,
    /// Whether the Slot is currently owned by some Thread
    used: atomic::AtomicBool,
}

impl HazardSlot {
    /// An empty unclaimed Slot, used to initialize the static Pool
    pub(super) const INIT: Self = Self {
        ptr: atomic::AtomicPtr::new(std::ptr::null_mut()),
        used: atomic::AtomicBool::new(false),
    };

    /// Attempts to take exclusive ownership of the Slot
    pub(super) fn try_claim(&self) -> bool {
        !self.used.swap(true, atomic::Ordering::Acquire)
    }

    /// Returns the Slot to the Pool, the protected Pointer must already be
    /// cleared at this point
    pub(super) fn release(&self) {
        self.used.store(false, atomic::Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_release() {
        let slot = HazardSlot::INIT;

        assert_eq!(true, slot.try_claim());
        assert_eq!(false, slot.try_claim());

        slot.release();
        assert_eq!(true, slot.try_claim());
    }
}
