//! The Event/Signal substrate used by the higher-level primitives to signal
//! state changes
//!
//! An [`Event`] describes a File-Descriptor the Host can wait on, the wait
//! mode and an optional clear action. Events come in two kinds: *momentary*
//! Events carry a clear action and are reset by whichever handler observes
//! them, *conditional* Events stay active for as long as their underlying
//! condition persists.
//!
//! Waiting is either done directly with [`wait`]/[`wait_any`] or through an
//! [`EventReactor`] that dispatches callbacks for multiple subscribed Events.
//!
//! This module is backed by the Linux `eventfd`/`poll`/`epoll` facilities

use std::{
    fmt::Debug,
    os::unix::io::RawFd,
    sync::{atomic, Arc},
};

mod signal;
pub use signal::{Signal, SignalChannel};

#[cfg(feature = "ports")]
#[cfg_attr(docsrs, doc(cfg(feature = "ports")))]
pub use signal::{
    connect_signal, disconnect_signal, signals_connected, SignalReceiver, SignalSender,
};

/// How an [`Event`]s Handle wants to be waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// The Event is active while the Handle is readable
    Readable,
    /// The Event is active while the Handle is writable
    Writable,
}

/// The Error kinds of the Event substrate
#[derive(Debug, PartialEq, Eq)]
pub enum EventError {
    /// The wait Syscall failed for a reason other than an interrupt, carries
    /// the raw OS errno
    WaitFailed(i32),
    /// Creating or subscribing to a Reactor failed, carries the raw OS errno
    SetupFailed(i32),
}

/// Describes a waitable condition backed by a File-Descriptor.
///
/// An Event with a clear action is *momentary*: any handler that observes it
/// runs the clear action, deactivating the Event until its source triggers
/// again. An Event without one is *conditional* and stays active while the
/// underlying Handle remains ready
#[derive(Clone)]
pub struct Event {
    fd: RawFd,
    mode: WaitMode,
    clear: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Event {
    /// Creates a conditional Event for the given Handle
    pub fn conditional(fd: RawFd, mode: WaitMode) -> Self {
        Self {
            fd,
            mode,
            clear: None,
        }
    }

    /// Creates a momentary Event for the given Handle, `clear` deactivates
    /// the underlying condition
    pub fn momentary<F>(fd: RawFd, mode: WaitMode, clear: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            fd,
            mode,
            clear: Some(Arc::new(clear)),
        }
    }

    /// Whether observing this Event clears it
    pub fn is_momentary(&self) -> bool {
        self.clear.is_some()
    }

    fn clear(&self) {
        if let Some(clear) = &self.clear {
            clear();
        }
    }

    fn poll_events(&self) -> libc::c_short {
        match self.mode {
            WaitMode::Readable => libc::POLLIN,
            WaitMode::Writable => libc::POLLOUT,
        }
    }

    fn epoll_events(&self) -> u32 {
        match self.mode {
            WaitMode::Readable => libc::EPOLLIN as u32,
            WaitMode::Writable => libc::EPOLLOUT as u32,
        }
    }
}

impl Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Event ( fd = {}, mode = {:?}, momentary = {} )",
            self.fd,
            self.mode,
            self.is_momentary()
        )
    }
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Blocks until the given Event is active, then clears it if it is momentary
pub fn wait(event: &Event) -> Result<(), EventError> {
    let mut pollfd = libc::pollfd {
        fd: event.fd,
        events: event.poll_events(),
        revents: 0,
    };

    loop {
        let result = unsafe { libc::poll(&mut pollfd, 1, -1) };
        if result >= 0 {
            break;
        }

        let errno = last_errno();
        if errno != libc::EINTR {
            return Err(EventError::WaitFailed(errno));
        }
    }

    event.clear();

    Ok(())
}

/// Blocks until one of the given Events is active, clears that one if it is
/// momentary and returns its index
pub fn wait_any(events: &[Event]) -> Result<usize, EventError> {
    let mut pollfds: Vec<libc::pollfd> = events
        .iter()
        .map(|event| libc::pollfd {
            fd: event.fd,
            events: event.poll_events(),
            revents: 0,
        })
        .collect();

    loop {
        let result =
            unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, -1) };
        if result < 0 {
            let errno = last_errno();
            if errno != libc::EINTR {
                return Err(EventError::WaitFailed(errno));
            }
            continue;
        }

        if let Some(index) = pollfds.iter().position(|pollfd| pollfd.revents != 0) {
            events[index].clear();
            return Ok(index);
        }
    }
}

/// The dispatch modes of [`EventReactor::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Dispatch the currently active Events, never block
    NoWait,
    /// Block until at least one Event is active, dispatch one batch
    Wait,
    /// Keep blocking and dispatching until [`Quit::quit`] is called
    WaitUntilQuit,
}

/// A handle to stop a running [`EventReactor`], usable from inside a callback
/// or from another Thread
#[derive(Clone)]
pub struct Quit {
    running: Arc<atomic::AtomicBool>,
}

impl Quit {
    /// Makes the Reactor leave its dispatch loop after the current callback
    /// returns
    pub fn quit(&self) {
        self.running.store(false, atomic::Ordering::SeqCst);
    }
}

struct Subscription {
    clear: Option<Arc<dyn Fn() + Send + Sync>>,
    callback: Box<dyn FnMut()>,
}

/// Dispatches callbacks for a set of subscribed Events.
///
/// Every active Event is handled at most once per dispatch batch before any
/// Event is handled a second time, so a constantly firing Event cannot starve
/// the others. Panics from a callback propagate out of [`run`](EventReactor::run)
pub struct EventReactor {
    epoll_fd: RawFd,
    subscriptions: Vec<Subscription>,
    running: Arc<atomic::AtomicBool>,
}

impl EventReactor {
    /// Creates a new Reactor without any subscriptions
    pub fn new() -> Result<Self, EventError> {
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd == -1 {
            return Err(EventError::SetupFailed(last_errno()));
        }

        Ok(Self {
            epoll_fd,
            subscriptions: Vec::new(),
            running: Arc::new(atomic::AtomicBool::new(false)),
        })
    }

    /// Registers a callback to run whenever the given Event is active while
    /// the Reactor runs.
    ///
    /// Momentary Events are cleared before their callback is invoked
    pub fn subscribe<F>(&mut self, event: &Event, callback: F) -> Result<(), EventError>
    where
        F: FnMut() + 'static,
    {
        let index = self.subscriptions.len();

        let mut options = libc::epoll_event {
            events: event.epoll_events(),
            u64: index as u64,
        };

        if unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, event.fd, &mut options) }
            == -1
        {
            return Err(EventError::SetupFailed(last_errno()));
        }

        self.subscriptions.push(Subscription {
            clear: event.clear.clone(),
            callback: Box::new(callback),
        });

        Ok(())
    }

    /// A handle that stops the Reactor, for use inside callbacks or on other
    /// Threads
    pub fn quitter(&self) -> Quit {
        Quit {
            running: self.running.clone(),
        }
    }

    /// Makes a running dispatch loop return after the current callback; the
    /// same operation [`Quit`] provides where the Reactor itself is not
    /// reachable
    pub fn quit(&self) {
        self.running.store(false, atomic::Ordering::SeqCst);
    }

    /// Dispatches subscribed Events according to the given mode
    pub fn run(&mut self, mode: RunMode) -> Result<(), EventError> {
        self.running.store(true, atomic::Ordering::SeqCst);

        let mut ready = [libc::epoll_event { events: 0, u64: 0 }; 16];

        loop {
            let timeout = if mode == RunMode::NoWait { 0 } else { -1 };

            let count = loop {
                let result = unsafe {
                    libc::epoll_wait(self.epoll_fd, ready.as_mut_ptr(), ready.len() as i32, timeout)
                };
                if result >= 0 {
                    break result as usize;
                }

                let errno = last_errno();
                if errno != libc::EINTR {
                    return Err(EventError::WaitFailed(errno));
                }
            };

            for entry in ready.iter().take(count) {
                if !self.running.load(atomic::Ordering::SeqCst) {
                    break;
                }

                let index = entry.u64 as usize;
                let subscription = &mut self.subscriptions[index];

                if let Some(clear) = &subscription.clear {
                    clear();
                }
                (subscription.callback)();
            }

            if !(mode == RunMode::WaitUntilQuit && self.running.load(atomic::Ordering::SeqCst)) {
                return Ok(());
            }
        }
    }
}

impl Drop for EventReactor {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll_fd) };
    }
}

impl Debug for EventReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventReactor ( subscriptions = {} )",
            self.subscriptions.len()
        )
    }
}
