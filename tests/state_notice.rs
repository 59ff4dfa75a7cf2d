#![cfg(all(feature = "state", feature = "notice"))]

use std::sync::{atomic, Arc};
use std::time::Duration;

use weft::events::wait;
use weft::notice::{Notice, NoticeReader};
use weft::state::{State, StateObserver};

#[test]
fn observer_wakes_on_changed_event() {
    let mut state = State::new();
    let mut observer = StateObserver::new();
    observer.connect(&state);

    let changed = observer.changed();

    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        state.store(13_u64);
        state
    });

    assert_eq!(Ok(()), wait(&changed));
    let state = writer.join().unwrap();

    assert_eq!(13, *observer.load());
    drop(state);
}

#[test]
fn observer_across_threads_sees_monotone_values() {
    const STORES: u64 = 20_000;

    let mut state = State::new();
    let done = Arc::new(atomic::AtomicBool::new(false));

    let mut observer = StateObserver::new();
    observer.connect(&state);

    let watcher = {
        let done = done.clone();
        std::thread::spawn(move || {
            let mut last = 0_u64;
            while !done.load(atomic::Ordering::SeqCst) {
                let value = *observer.load();
                assert!(value >= last);
                assert!(value <= STORES);
                last = value;
            }
            observer
        })
    };

    for i in 1..=STORES {
        state.store(i);
    }
    done.store(true, atomic::Ordering::SeqCst);

    let mut observer = watcher.join().unwrap();
    assert_eq!(STORES, *observer.load());
}

#[test]
fn state_dropped_before_observer() {
    let mut observer = StateObserver::with_default(0_u32);

    {
        let mut state = State::new();
        observer.connect(&state);
        state.store(5);
        assert_eq!(5, *observer.load());
    }

    // The Observer still holds the shared storage through its Reader, the
    // last loaded value stays accessible
    assert_eq!(5, *observer.value());

    observer.disconnect();
    assert_eq!(0, *observer.load());
}

#[test]
fn notice_reaches_reader_on_other_thread() {
    let notice = Notice::new();
    let mut reader = NoticeReader::new();
    reader.connect(&notice);

    let changed = reader.changed();

    let poster = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        notice.post(21_u64);
        notice
    });

    assert_eq!(Ok(()), wait(&changed));
    let notice = poster.join().unwrap();

    assert_eq!(21, reader.read());
    drop(notice);
}

#[test]
fn notice_readers_never_see_torn_values() {
    const POSTS: u64 = 50_000;

    let notice = Notice::new();
    let done = Arc::new(atomic::AtomicBool::new(false));

    let mut reader = NoticeReader::new();
    reader.connect(&notice);

    let watcher = {
        let done = done.clone();
        std::thread::spawn(move || {
            while !done.load(atomic::Ordering::SeqCst) {
                let (a, b) = reader.read();
                assert_eq!(a, b);
            }
        })
    };

    for i in 1..=POSTS {
        notice.post((i, i));
    }
    done.store(true, atomic::Ordering::SeqCst);

    watcher.join().unwrap();
}
