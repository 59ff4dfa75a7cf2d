#![cfg(feature = "hazard_ptr")]

use std::sync::{atomic, Arc};

use weft::hazard_ptr;

#[derive(Clone)]
struct DropCounter {
    drops: Arc<atomic::AtomicU64>,
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.fetch_add(1, atomic::Ordering::SeqCst);
    }
}

#[test]
fn protected_pointer_survives_retirement() {
    let drops = Arc::new(atomic::AtomicU64::new(0));

    let ptr = Box::into_raw(Box::new(DropCounter {
        drops: drops.clone(),
    }));
    let shared = atomic::AtomicPtr::new(ptr);

    let guard = hazard_ptr::protect(&shared, atomic::Ordering::SeqCst).unwrap();

    unsafe {
        hazard_ptr::retire(ptr, |ptr| {
            drop(unsafe { Box::from_raw(ptr) });
        });
    }

    hazard_ptr::reclaim();
    assert_eq!(0, drops.load(atomic::Ordering::SeqCst));

    drop(guard);
    hazard_ptr::reclaim();
    assert_eq!(1, drops.load(atomic::Ordering::SeqCst));
}

#[test]
fn retired_pointers_all_reclaimed_after_readers_leave() {
    const SWAPS: u64 = 1_000;

    let drops = Arc::new(atomic::AtomicU64::new(0));

    let first = Box::into_raw(Box::new(DropCounter {
        drops: drops.clone(),
    }));
    let shared = Arc::new(atomic::AtomicPtr::new(first));
    let done = Arc::new(atomic::AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                while !done.load(atomic::Ordering::SeqCst) {
                    let guard = hazard_ptr::protect(&shared, atomic::Ordering::SeqCst).unwrap();
                    // Touching the value through the Guard must always be
                    // safe, no matter how the Writer races us
                    let _ = guard.drops.load(atomic::Ordering::SeqCst);
                }
            })
        })
        .collect();

    for _ in 0..SWAPS {
        let next = Box::into_raw(Box::new(DropCounter {
            drops: drops.clone(),
        }));
        let old = shared.swap(next, atomic::Ordering::SeqCst);
        unsafe {
            hazard_ptr::retire(old, |ptr| {
                drop(unsafe { Box::from_raw(ptr) });
            });
        }
    }

    done.store(true, atomic::Ordering::SeqCst);
    for reader in readers {
        reader.join().unwrap();
    }

    // Retire the last published value and drain this Threads list; all
    // protections are gone, so every single allocation must be freed now
    let last = shared.swap(std::ptr::null_mut(), atomic::Ordering::SeqCst);
    unsafe {
        hazard_ptr::retire(last, |ptr| {
            drop(unsafe { Box::from_raw(ptr) });
        });
    }
    hazard_ptr::reclaim();

    assert_eq!(SWAPS + 1, drops.load(atomic::Ordering::SeqCst));
}
