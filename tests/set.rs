#![cfg(feature = "set")]

use std::collections::HashSet;
use std::sync::{atomic, Arc};

use weft::set::Set;

#[test]
fn iteration_with_removal_of_current_element() {
    let set = Set::new();

    for i in 0..100 {
        set.insert(i);
    }

    let mut visited = HashSet::new();
    let mut iter = set.iter();

    while let Some(value) = iter.next() {
        let value = *value;
        assert_eq!(true, visited.insert(value));

        // Halfway through, remove the element the iteration stands on; it
        // already counts as visited and the traversal keeps going
        if visited.len() == 50 {
            assert_eq!(true, set.remove(&value));
        }
    }

    assert_eq!(100, visited.len());
}

#[test]
fn insert_remove_insert_roundtrip() {
    let set = Set::new();

    set.insert(13);
    assert_eq!(true, set.remove(&13));
    assert_eq!(false, set.contains(&13));

    set.insert(13);
    set.insert(13);

    let mut count = 0;
    set.for_each(|_| count += 1);
    assert_eq!(1, count);
}

#[test]
fn empty_set_iteration() {
    let set = Set::<u32>::new();

    let mut iter = set.iter();
    assert_eq!(None, iter.next());
}

#[test]
fn randomized_insert_order_visits_all() {
    use rand::seq::SliceRandom;

    let mut values: Vec<u32> = (0..300).collect();
    values.shuffle(&mut rand::thread_rng());

    let set = Set::new();
    for value in &values {
        set.insert(*value);
    }

    let mut seen = HashSet::new();
    set.for_each(|value| {
        assert_eq!(true, seen.insert(*value));
    });
    assert_eq!(300, seen.len());
}

#[test]
fn concurrent_removal_never_duplicates() {
    let set = Arc::new(Set::new());
    for i in 0..200_u32 {
        set.insert(i);
    }

    let done = Arc::new(atomic::AtomicBool::new(false));

    let remover = {
        let set = set.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            for i in (0..200).step_by(2) {
                set.remove(&i);
                std::thread::yield_now();
            }
            done.store(true, atomic::Ordering::SeqCst);
        })
    };

    while !done.load(atomic::Ordering::SeqCst) {
        let mut seen = HashSet::new();
        set.for_each(|value| {
            // A traversal racing removals may miss elements, but it must
            // never yield one twice and never yield a foreign value
            assert_eq!(true, seen.insert(*value));
            assert!(*value < 200);
        });
    }

    remover.join().unwrap();

    let mut remaining = Vec::new();
    set.for_each(|value| remaining.push(*value));
    remaining.sort_unstable();

    let expected: Vec<u32> = (0..200).filter(|value| value % 2 == 1).collect();
    assert_eq!(expected, remaining);
}

#[test]
fn concurrent_inserts_and_reads() {
    let set = Arc::new(Set::new());
    let done = Arc::new(atomic::AtomicBool::new(false));

    let inserter = {
        let set = set.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            for i in 0..500_u32 {
                set.insert(i);
            }
            done.store(true, atomic::Ordering::SeqCst);
        })
    };

    while !done.load(atomic::Ordering::SeqCst) {
        set.for_each(|value| {
            assert!(*value < 500);
        });
    }

    inserter.join().unwrap();

    let mut count = 0;
    set.for_each(|_| count += 1);
    assert_eq!(500, count);
}
