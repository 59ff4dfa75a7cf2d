use std::cell::{Cell, RefCell};

use super::{protected_set, RETIRE_THRESHOLD};

/// A single retired Pointer together with the type-erased Function used to
/// destroy it once it is safe to do so
pub(super) struct RetireNode {
    ptr: *mut (),
    destroy: Box<dyn FnOnce()>,
}

impl RetireNode {
    /// Creates a new RetireNode for the given Pointer, `destroy` must free
    /// everything the Pointer owns
    pub(super) fn new<F>(ptr: *mut (), destroy: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            ptr,
            destroy: Box::new(destroy),
        }
    }

    fn const_ptr(&self) -> *mut () {
        self.ptr
    }

    fn destroy(self) {
        (self.destroy)();
    }
}

/// The per-Thread List of Nodes waiting to be reclaimed
struct RetiredList {
    nodes: RefCell<Vec<RetireNode>>,
    /// Set while a Scan is running on this Thread, so that a Destructor which
    /// itself retires something cannot start a nested Scan
    scanning: Cell<bool>,
}

impl Drop for RetiredList {
    fn drop(&mut self) {
        // The Thread is exiting, so this is the last chance to reclaim its
        // retired Entries. Entries that are still protected by another Thread
        // are leaked, which is the only option that never frees Memory some
        // Reader still holds.
        // TODO: hand still-protected Entries to a process-global List that
        // other Threads drain during their own Scans
        let pending = std::mem::take(self.nodes.get_mut());
        if pending.is_empty() {
            return;
        }

        let protections = protected_set();

        for node in pending {
            if !protections.contains(&node.const_ptr()) {
                node.destroy();
            }
        }
    }
}

thread_local! {
    static RETIRED: RetiredList = RetiredList {
        nodes: RefCell::new(Vec::new()),
        scanning: Cell::new(false),
    };
}

/// Appends the Node to the current Threads Retired-List and triggers a Scan
/// once the List has grown past the Threshold
pub(super) fn retire_node(node: RetireNode) {
    let mut pending = Some(node);

    let appended = RETIRED.try_with(|list| {
        let mut nodes = list.nodes.borrow_mut();
        if let Some(node) = pending.take() {
            nodes.push(node);
        }
        nodes.len() >= RETIRE_THRESHOLD
    });

    match appended {
        Ok(true) => scan(),
        Ok(false) => {}
        Err(_) => {
            // The thread-local List is already gone, this retirement comes
            // out of a Destructor running at Thread-Exit. Destroy directly if
            // no one protects the Pointer, leak otherwise.
            if let Some(node) = pending.take() {
                if !protected_set().contains(&node.const_ptr()) {
                    node.destroy();
                }
            }
        }
    }
}

/// Scans the Hazard-Pointer-Slots and destroys every retired Entry of the
/// current Thread that is not protected by any of them.
///
/// A Scan is never entered twice on the same Thread: if a Destructor running
/// inside a Scan triggers another one, that nested call returns immediately
pub(super) fn scan() {
    let _ = RETIRED.try_with(|list| {
        if list.scanning.replace(true) {
            return;
        }

        // Move the List out before running any Destructor, as a Destructor
        // may itself retire new Entries and therefore needs the RefCell to be
        // unborrowed
        let pending = std::mem::take(&mut *list.nodes.borrow_mut());

        let protections = protected_set();

        let mut kept = Vec::new();
        for node in pending {
            if protections.contains(&node.const_ptr()) {
                kept.push(node);
            } else {
                node.destroy();
            }
        }

        list.nodes.borrow_mut().append(&mut kept);
        list.scanning.set(false);
    });
}
