//! Broadcast of small copyable values to connected Readers
//!
//! A [`Notice`] posts values through an [`SpmcAtom`](crate::atoms::SpmcAtom)
//! and notifies every connected [`NoticeReader`] through its Signal. The
//! Readers hold the Notice data only weakly: once the Notice is dropped they
//! revert to their default value instead of keeping the storage alive

use std::{
    fmt::Debug,
    sync::{Arc, Weak},
};

use crate::{
    atoms::SpmcAtom,
    events::{Event, SignalChannel},
    set::Set,
};

/// The per-Reader record registered with a Notice
struct ReaderData {
    signal: SignalChannel,
}

/// A shared Reader handle, equal by allocation identity
struct ReaderPtr(Arc<ReaderData>);

impl Clone for ReaderPtr {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl PartialEq for ReaderPtr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The data shared between a Notice and its Readers
struct NoticeData<T> {
    value: SpmcAtom<T>,
    readers: Set<ReaderPtr>,
}

/// Posts values read by connected [`NoticeReader`]s.
///
/// The Notice should only be used from one Thread at a time, while any number
/// of Readers run concurrently on other Threads
pub struct Notice<T> {
    data: Arc<NoticeData<T>>,
}

impl<T> Notice<T>
where
    T: Copy + Default,
{
    /// Creates the Notice holding a default-constructed value
    pub fn new() -> Self {
        Self {
            data: Arc::new(NoticeData {
                value: SpmcAtom::new(),
                readers: Set::new(),
            }),
        }
    }
}

impl<T> Notice<T>
where
    T: Copy,
{
    /// Stores the given value and notifies every connected Reader
    pub fn post(&self, value: T) {
        self.data.value.store(value);

        self.data
            .readers
            .for_each(|reader| reader.0.signal.notify());
    }
}

impl<T> Default for Notice<T>
where
    T: Copy + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Notice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Notice ()")
    }
}

/// Reads the last value posted by a connected [`Notice`].
///
/// While disconnected, or once the connected Notice has been dropped,
/// [`read`](NoticeReader::read) returns the Readers default value
pub struct NoticeReader<T> {
    default_value: T,
    shared: ReaderPtr,
    writer: Weak<NoticeData<T>>,
}

impl<T> NoticeReader<T>
where
    T: Copy,
{
    /// Creates an unconnected Reader with the given default value
    pub fn with_default(default_value: T) -> Self {
        Self {
            default_value,
            shared: ReaderPtr(Arc::new(ReaderData {
                signal: SignalChannel::new(),
            })),
            writer: Weak::new(),
        }
    }

    /// Connects to the given Notice, replacing any previous connection
    pub fn connect(&mut self, notice: &Notice<T>) {
        self.disconnect();

        notice.data.readers.insert(self.shared.clone());
        self.writer = Arc::downgrade(&notice.data);
    }

    /// If connected to a Notice, disconnects from it
    pub fn disconnect(&mut self) {
        if let Some(writer) = self.writer.upgrade() {
            writer.readers.remove(&self.shared);
        }
        self.writer = Weak::new();
    }

    /// The last value posted by the connected Notice, or the default value
    /// while no live Notice is connected
    pub fn read(&self) -> T {
        match self.writer.upgrade() {
            Some(writer) => writer.value.load(),
            None => self.default_value,
        }
    }

    /// An Event activated whenever the connected Notice posts
    pub fn changed(&self) -> Event {
        self.shared.0.signal.event()
    }
}

impl<T> NoticeReader<T>
where
    T: Copy + Default,
{
    /// Creates an unconnected Reader with a default-constructed default value
    pub fn new() -> Self {
        Self::with_default(T::default())
    }
}

impl<T> Default for NoticeReader<T>
where
    T: Copy + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for NoticeReader<T> {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.upgrade() {
            writer.readers.remove(&self.shared);
        }
        self.writer = Weak::new();
    }
}

impl<T> Debug for NoticeReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NoticeReader ()")
    }
}
