//! Broadcast of a current value to connected Observers
//!
//! A [`State`] stores values into an [`Atom`](crate::atoms::Atom) and
//! notifies every connected [`StateObserver`] through its Signal. Observers
//! load the most recent value on their own schedule and fall back to a
//! default value while they are not connected

use std::{fmt::Debug, sync::Arc};

use crate::{
    atoms::{Atom, AtomReader, AtomWriter},
    events::{Event, SignalChannel},
    set::Set,
};

/// The per-Observer record registered with a State
struct ObserverData {
    signal: SignalChannel,
}

/// A shared Observer handle, equal by allocation identity
struct ObserverPtr(Arc<ObserverData>);

impl Clone for ObserverPtr {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl PartialEq for ObserverPtr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The data shared between a State and its Observers
struct StateData<T> {
    atom: Arc<Atom<T>>,
    observers: Set<ObserverPtr>,
}

/// Stores a value read by connected [`StateObserver`]s.
///
/// The last stored value is what a connected Observer loads; storing also
/// activates every Observers `changed` Event. The State should only be used
/// from one Thread at a time, while any number of Observers run concurrently
/// on other Threads
pub struct State<T> {
    shared: Arc<StateData<T>>,
    writer: AtomWriter<T>,
}

impl<T> State<T>
where
    T: Default,
{
    /// Creates the State holding a default-constructed value
    pub fn new() -> Self {
        Self::with_value(T::default())
    }

    /// Creates the State holding the given value
    pub fn with_value(value: T) -> Self {
        let shared = Arc::new(StateData {
            atom: Arc::new(Atom::with_value(value)),
            observers: Set::new(),
        });
        let writer = AtomWriter::new(&shared.atom);

        Self { shared, writer }
    }

    /// The value that the next [`publish`](State::publish) makes visible.
    ///
    /// The returned reference is only valid until the next `publish`
    pub fn value_mut(&mut self) -> &mut T {
        self.writer.value_mut()
    }

    /// Makes the value written through [`value_mut`](State::value_mut)
    /// visible to all Observers and notifies them
    pub fn publish(&mut self) {
        self.writer.publish();

        self.shared
            .observers
            .for_each(|observer| observer.0.signal.notify());
    }

    /// Stores the given value and notifies all Observers
    pub fn store(&mut self, value: T) {
        *self.value_mut() = value;
        self.publish();
    }
}

impl<T> Default for State<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for State<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "State ()")
    }
}

/// The connected half of an Observer: the State it reads from and the Reader
/// doing the loading
struct Connection<T> {
    reader: AtomReader<T>,
    state: Arc<StateData<T>>,
}

/// Reads the last value stored by a connected [`State`].
///
/// While disconnected, [`load`](StateObserver::load) and
/// [`value`](StateObserver::value) return the Observers default value.
/// Whenever the connected State stores, the Event returned by
/// [`changed`](StateObserver::changed) becomes active
pub struct StateObserver<T> {
    default_value: T,
    shared: ObserverPtr,
    connection: Option<Connection<T>>,
}

impl<T> StateObserver<T> {
    /// Creates an unconnected Observer with the given default value
    pub fn with_default(default_value: T) -> Self {
        Self {
            default_value,
            shared: ObserverPtr(Arc::new(ObserverData {
                signal: SignalChannel::new(),
            })),
            connection: None,
        }
    }

    /// The value of the last [`load`](StateObserver::load), or the default
    /// value while disconnected
    pub fn value(&self) -> &T {
        match &self.connection {
            Some(connection) => connection.reader.value(),
            None => &self.default_value,
        }
    }

    /// An Event activated whenever a new value is stored by a connected
    /// State
    pub fn changed(&self) -> Event {
        self.shared.0.signal.event()
    }

    /// If connected to a State, disconnects from it
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.state.observers.remove(&self.shared);
        }
    }
}

impl<T> StateObserver<T>
where
    T: Clone,
{
    /// Connects to the given State, replacing any previous connection.
    ///
    /// The Observer returns its default value until its first
    /// [`load`](StateObserver::load) after connecting
    pub fn connect(&mut self, state: &State<T>) {
        self.disconnect();

        let reader = AtomReader::with_value(&state.shared.atom, self.default_value.clone());
        state.shared.observers.insert(self.shared.clone());

        self.connection = Some(Connection {
            reader,
            state: state.shared.clone(),
        });
    }

    /// Loads the most recent value stored by the connected State, or returns
    /// the default value while disconnected.
    ///
    /// The returned reference is only valid until the next `load`
    pub fn load(&mut self) -> &T {
        match &mut self.connection {
            Some(connection) => connection.reader.load(),
            None => &self.default_value,
        }
    }
}

impl<T> StateObserver<T>
where
    T: Default,
{
    /// Creates an unconnected Observer with a default-constructed default
    /// value
    pub fn new() -> Self {
        Self::with_default(T::default())
    }
}

impl<T> Default for StateObserver<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for StateObserver<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T> Debug for StateObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateObserver ()")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_observer_returns_default() {
        let mut observer = StateObserver::with_default(42);

        assert_eq!(42, *observer.load());
        assert_eq!(42, *observer.value());
    }

    #[test]
    fn observer_follows_state() {
        let mut state = State::new();
        let mut observer = StateObserver::new();

        observer.connect(&state);

        state.store(13);
        assert_eq!(13, *observer.load());

        state.store(14);
        state.store(15);
        assert_eq!(15, *observer.load());
    }

    #[test]
    fn disconnect_restores_default() {
        let mut state = State::with_value(5);
        let mut observer = StateObserver::with_default(-1);

        observer.connect(&state);
        assert_eq!(5, *observer.load());

        observer.disconnect();
        assert_eq!(-1, *observer.load());
    }

    #[test]
    fn two_observers() {
        let mut state = State::new();
        let mut first = StateObserver::new();
        let mut second = StateObserver::new();

        first.connect(&state);
        second.connect(&state);

        state.store(9);

        assert_eq!(9, *first.load());
        assert_eq!(9, *second.load());
    }

    #[test]
    fn value_mut_publish() {
        let mut state = State::<u32>::new();
        let mut observer = StateObserver::new();
        observer.connect(&state);

        *state.value_mut() = 21;
        state.publish();

        assert_eq!(21, *observer.load());
    }
}
