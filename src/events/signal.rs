//! eventfd-backed Signals: a one-to-one notifier plus the fabric-composed
//! many-to-many variant

use std::{fmt::Debug, os::unix::io::RawFd};

use super::{last_errno, wait, Event, EventError, WaitMode};

fn create_eventfd() -> RawFd {
    let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK) };
    if fd == -1 {
        panic!("creating an eventfd failed with errno {}", last_errno());
    }

    fd
}

fn eventfd_notify(fd: RawFd) {
    let count: u64 = 1;

    loop {
        let result = unsafe {
            libc::write(
                fd,
                &count as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };

        if result != -1 || last_errno() != libc::EINTR {
            return;
        }
    }
}

fn eventfd_clear(fd: RawFd) {
    let mut count: u64 = 0;

    loop {
        let result = unsafe {
            libc::read(
                fd,
                &mut count as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };

        if result != -1 || last_errno() != libc::EINTR {
            return;
        }
    }
}

/// An eventfd wrapped as a shareable value, so that Signals can travel
/// through the connection fabric.
///
/// Notifying is idempotent until the next clear: any number of
/// [`notify`](SignalChannel::notify) calls activate the Channels Event
/// exactly once
pub struct SignalChannel {
    fd: RawFd,
}

impl SignalChannel {
    /// Creates a new inactive Channel.
    ///
    /// # Panics
    /// Panics if the Host refuses to create another eventfd
    pub fn new() -> Self {
        Self {
            fd: create_eventfd(),
        }
    }

    /// Makes the Channels Event active
    pub fn notify(&self) {
        eventfd_notify(self.fd);
    }

    /// Deactivates the Channels Event
    pub fn clear(&self) {
        eventfd_clear(self.fd);
    }

    /// The momentary Event activated by [`notify`](SignalChannel::notify)
    pub fn event(&self) -> Event {
        let fd = self.fd;
        Event::momentary(fd, WaitMode::Readable, move || eventfd_clear(fd))
    }
}

impl Default for SignalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SignalChannel {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

impl Debug for SignalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignalChannel ( fd = {} )", self.fd)
    }
}

/// A one-to-one notifier.
///
/// [`notify`](Signal::notify) makes the Signals momentary Event active
/// exactly once until it is cleared by an observer; notifying an already
/// active Signal has no additional effect
pub struct Signal {
    channel: SignalChannel,
}

impl Signal {
    /// Creates a new inactive Signal.
    ///
    /// # Panics
    /// Panics if the Host refuses to create another eventfd
    pub fn new() -> Self {
        Self {
            channel: SignalChannel::new(),
        }
    }

    /// Makes the Signals Event active
    pub fn notify(&self) {
        self.channel.notify();
    }

    /// Blocks until the Signal is notified, then clears it
    pub fn wait(&self) -> Result<(), EventError> {
        wait(&self.event())
    }

    /// The momentary Event activated by [`notify`](Signal::notify)
    pub fn event(&self) -> Event {
        self.channel.event()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signal ()")
    }
}

#[cfg(feature = "ports")]
mod fabric {
    use super::{Event, EventError, SignalChannel};
    use crate::ports::{self, Client, Server};

    use std::fmt::Debug;

    /// The sending side of a many-to-many Signal, a fabric Client over
    /// [`SignalChannel`] values.
    ///
    /// Any number of Senders can be connected to any number of
    /// [`SignalReceiver`]s; a notify activates the Event of every currently
    /// connected Receiver
    pub struct SignalSender {
        client: Client<SignalChannel>,
    }

    impl SignalSender {
        /// Creates a new unconnected Sender
        pub fn new() -> Self {
            Self {
                client: Client::new(),
            }
        }

        /// Notifies every currently connected Receiver
        pub fn notify(&self) {
            self.client.for_each(|channel| channel.notify());
        }

        /// Checks if the Sender currently has any connections
        pub fn has_connections(&self) -> bool {
            self.client.has_connections()
        }
    }

    impl Default for SignalSender {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Debug for SignalSender {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "SignalSender ()")
        }
    }

    /// The receiving side of a many-to-many Signal, a fabric Server owning a
    /// [`SignalChannel`]
    pub struct SignalReceiver {
        server: Server<SignalChannel>,
    }

    impl SignalReceiver {
        /// Creates a new unconnected Receiver.
        ///
        /// # Panics
        /// Panics if the Host refuses to create another eventfd
        pub fn new() -> Self {
            Self {
                server: Server::new(),
            }
        }

        /// Blocks until some connected Sender notifies, then clears the
        /// Channel
        pub fn wait(&self) -> Result<(), EventError> {
            super::wait(&self.event())
        }

        /// The momentary Event activated by any connected Senders notify
        pub fn event(&self) -> Event {
            self.server.data().event()
        }

        /// Checks if the Receiver currently has any connections
        pub fn has_connections(&self) -> bool {
            self.server.has_connections()
        }
    }

    impl Default for SignalReceiver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Debug for SignalReceiver {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "SignalReceiver ()")
        }
    }

    /// Connects the Sender to the Receiver; idempotent for an already
    /// connected pair
    pub fn connect_signal(sender: &SignalSender, receiver: &SignalReceiver) {
        ports::connect(&sender.client, &receiver.server);
    }

    /// Disconnects the Sender from the Receiver; does nothing if the two are
    /// not connected
    pub fn disconnect_signal(sender: &SignalSender, receiver: &SignalReceiver) {
        ports::disconnect(&sender.client, &receiver.server);
    }

    /// Checks whether the Sender and Receiver are currently connected
    pub fn signals_connected(sender: &SignalSender, receiver: &SignalReceiver) -> bool {
        ports::are_connected(&sender.client, &receiver.server)
    }
}

#[cfg(feature = "ports")]
pub use fabric::{
    connect_signal, disconnect_signal, signals_connected, SignalReceiver, SignalSender,
};
