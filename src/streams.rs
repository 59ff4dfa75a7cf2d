//! Streams of values flowing through the connection fabric
//!
//! A [`StreamProducer`] pushes every value into the Queue of every connected
//! [`StreamConsumer`] and notifies the Consumers receive Event. Producers and
//! Consumers are fabric endpoints, so any number of Producers can feed any
//! number of Consumers and either side can connect, disconnect or disappear
//! at any time

use std::{fmt::Debug, sync::Arc};

use crate::{
    events::{Event, SignalChannel},
    ports::{self, Client, Server},
    queues::mpsc,
};

/// The Error returned when a [`StreamConsumer`] is constructed with a
/// capacity of zero
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidCapacity;

/// The shared per-connection value of a Stream: the Consumers Queue paired
/// with its receive Signal
pub struct StreamData<T> {
    queue: mpsc::Queue<T>,
    signal: SignalChannel,
}

impl<T> StreamData<T> {
    fn new(capacity: usize) -> Self {
        Self {
            queue: mpsc::Queue::new(capacity),
            signal: SignalChannel::new(),
        }
    }
}

impl<T> Debug for StreamData<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamData ()")
    }
}

/// The sending side of a Stream.
///
/// Pushing is lock-free and fans the value out to every currently connected
/// Consumer. A Consumer whose Queue is full at that moment misses the value
pub struct StreamProducer<T> {
    client: Client<StreamData<T>>,
}

impl<T> StreamProducer<T> {
    /// Creates a new unconnected Producer
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Pushes the value into the Queue of every connected Consumer and
    /// notifies it
    pub fn push(&self, value: T)
    where
        T: Clone,
    {
        self.client.for_each(|data| {
            if data.queue.try_enqueue(value.clone()).is_ok() {
                data.signal.notify();
            }
        });
    }

    /// Pushes all the values into the Queue of every connected Consumer.
    ///
    /// Per Consumer this is all-or-nothing: a Consumer without room for every
    /// value receives none of them
    pub fn push_bulk(&self, values: &[T])
    where
        T: Clone,
    {
        self.client.for_each(|data| {
            if data.queue.enqueue_bulk(values) {
                data.signal.notify();
            }
        });
    }

    /// Checks if the Producer currently has any connections
    pub fn has_connections(&self) -> bool {
        self.client.has_connections()
    }
}

impl<T> Default for StreamProducer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for StreamProducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamProducer ()")
    }
}

/// The receiving side of a Stream, owning the Queue that all connected
/// Producers feed
pub struct StreamConsumer<T> {
    server: Server<StreamData<T>>,
}

impl<T> StreamConsumer<T> {
    /// Creates a new unconnected Consumer whose Queue holds at least
    /// `capacity` values.
    ///
    /// Fails with [`InvalidCapacity`] if `capacity` is zero
    pub fn with_capacity(capacity: usize) -> Result<Self, InvalidCapacity> {
        if capacity < 1 {
            return Err(InvalidCapacity);
        }

        Ok(Self {
            server: Server::with_data(Arc::new(StreamData::new(capacity))),
        })
    }

    /// Attempts to pop the next value, returns `None` if the Queue is
    /// currently empty
    pub fn pop(&self) -> Option<T> {
        self.server.data().queue.try_dequeue()
    }

    /// Attempts to pop exactly `count` values; this fails without popping
    /// anything if fewer than `count` values are queued
    pub fn pop_bulk(&self, count: usize) -> Option<Vec<T>> {
        self.server.data().queue.dequeue_bulk(count)
    }

    /// Checks if the Consumers Queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.server.data().queue.is_empty()
    }

    /// The number of Slots in the Consumers Queue
    pub fn capacity(&self) -> usize {
        self.server.data().queue.capacity()
    }

    /// The momentary Event activated whenever a Producer pushed into this
    /// Consumers Queue
    pub fn receive_event(&self) -> Event {
        self.server.data().signal.event()
    }

    /// Checks if the Consumer currently has any connections
    pub fn has_connections(&self) -> bool {
        self.server.has_connections()
    }
}

impl<T> Debug for StreamConsumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamConsumer ()")
    }
}

/// Connects the Producer to the Consumer; idempotent for an already connected
/// pair
pub fn connect<T>(producer: &StreamProducer<T>, consumer: &StreamConsumer<T>) {
    ports::connect(&producer.client, &consumer.server);
}

/// Disconnects the Producer from the Consumer; does nothing if the two are
/// not connected
pub fn disconnect<T>(producer: &StreamProducer<T>, consumer: &StreamConsumer<T>) {
    ports::disconnect(&producer.client, &consumer.server);
}

/// Checks whether the Producer and Consumer are currently connected
pub fn are_connected<T>(producer: &StreamProducer<T>, consumer: &StreamConsumer<T>) -> bool {
    ports::are_connected(&producer.client, &consumer.server)
}
