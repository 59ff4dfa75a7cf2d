//! The Client/Server connection fabric
//!
//! A [`Client`] and a [`Server`] are endpoints that can be wired together
//! with [`connect`]. A connected Client sees the Servers shared value; two
//! connected Clients share a value created just for that connection. Every
//! endpoint keeps a registry of Links in a lock-free [`Set`](crate::set::Set)
//! and removes its mirror entries from all peers when it is dropped, so
//! teardown is safe from either side at any time.
//!
//! The two Set updates of a single connect or disconnect are not atomic with
//! respect to each other: a Thread observing a third endpoint may see a
//! partially connected pair. Both halves of a Link always point at valid
//! data, so this is benign

use std::{fmt::Debug, ops::Deref, sync::Arc};

use crate::set::Set;

/// A single Link installed in an endpoints registry.
///
/// The Client-side Link of a Client/Server connection carries the Servers
/// shared value; the Servers back-Link carries only the peer reference
struct Link<T: 'static> {
    peer: Arc<PortData<T>>,
    data: Option<Arc<T>>,
}

/// A shared Link handle, equal to another handle exactly if both refer to the
/// same Link allocation
struct LinkPtr<T: 'static>(Arc<Link<T>>);

impl<T: 'static> Clone for LinkPtr<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> PartialEq for LinkPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The registry half of an endpoint, shared with every connected peer through
/// their Links
pub(crate) struct PortData<T: 'static> {
    links: Set<LinkPtr<T>>,
}

impl<T: 'static> PortData<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self { links: Set::new() })
    }

    /// Finds the Link pointing at the given peer, if the endpoints are
    /// currently connected
    fn find_link(&self, peer: &Arc<PortData<T>>) -> Option<LinkPtr<T>> {
        let mut found = None;

        self.links.for_each(|link| {
            if found.is_none() && Arc::ptr_eq(&link.0.peer, peer) {
                found = Some(link.clone());
            }
        });

        found
    }
}

/// Removes the mirror Link pointing back at `port` from every peer in its
/// registry; used by the endpoint Destructors
fn detach<T: 'static>(port: &Arc<PortData<T>>) {
    port.links.for_each(|link| {
        if let Some(mirror) = link.0.peer.find_link(port) {
            link.0.peer.links.remove(&mirror);
        }
    });
}

/// A connection endpoint which uses shared values but does not own any.
///
/// When a Client is connected to a [`Server`], it gains access to the Servers
/// shared value. When a Client is connected to another Client, a value is
/// created (or supplied) just for that connection.
///
/// All currently visible shared values can be walked with
/// [`for_each`](Client::for_each), which is lock-free and safe against any
/// concurrent operation on the connected peers
pub struct Client<T: 'static> {
    pub(crate) port: Arc<PortData<T>>,
}

impl<T: 'static> Client<T> {
    /// Creates a new unconnected Client
    pub fn new() -> Self {
        Self {
            port: PortData::new(),
        }
    }

    /// Checks if the Client currently has any connections
    pub fn has_connections(&self) -> bool {
        !self.port.links.is_empty()
    }

    /// Calls the given Closure once for every shared value visible through
    /// the Clients current connections
    pub fn for_each<F>(&self, mut func: F)
    where
        F: FnMut(&T),
    {
        self.port.links.for_each(|link| {
            if let Some(data) = &link.0.data {
                func(data);
            }
        });
    }
}

impl<T: 'static> Default for Client<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Drop for Client<T> {
    fn drop(&mut self) {
        detach(&self.port);
    }
}

impl<T> Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client ()")
    }
}

/// A connection endpoint which owns a shared value.
///
/// A Server owns a single value and shares this same value with every
/// connected [`Client`]. The value is reached by dereferencing the Server or
/// through [`data`](Server::data)
pub struct Server<T: 'static> {
    pub(crate) port: Arc<PortData<T>>,
    pub(crate) data: Arc<T>,
}

impl<T: 'static> Server<T> {
    /// Creates a Server around an externally allocated shared value
    pub fn with_data(data: Arc<T>) -> Self {
        Self {
            port: PortData::new(),
            data,
        }
    }

    /// The Servers shared value
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Checks if the Server currently has any connections
    pub fn has_connections(&self) -> bool {
        !self.port.links.is_empty()
    }
}

impl<T> Server<T>
where
    T: Default + 'static,
{
    /// Creates a Server owning a default-constructed shared value
    pub fn new() -> Self {
        Self::with_data(Arc::new(T::default()))
    }
}

impl<T> Default for Server<T>
where
    T: Default + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for Server<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T: 'static> Drop for Server<T> {
    fn drop(&mut self) {
        detach(&self.port);
    }
}

impl<T> Debug for Server<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Server ()")
    }
}

/// Connects the Client to the Server, making the Servers shared value visible
/// to the Client.
///
/// Connecting an already connected pair has no additional effect
pub fn connect<T: 'static>(client: &Client<T>, server: &Server<T>) {
    if client.port.find_link(&server.port).is_some() {
        return;
    }

    client.port.links.insert(LinkPtr(Arc::new(Link {
        peer: server.port.clone(),
        data: Some(server.data.clone()),
    })));
    server.port.links.insert(LinkPtr(Arc::new(Link {
        peer: client.port.clone(),
        data: None,
    })));
}

/// Disconnects the Client from the Server; does nothing if the two are not
/// connected
pub fn disconnect<T: 'static>(client: &Client<T>, server: &Server<T>) {
    if let Some(link) = client.port.find_link(&server.port) {
        client.port.links.remove(&link);
    }
    if let Some(link) = server.port.find_link(&client.port) {
        server.port.links.remove(&link);
    }
}

/// Checks whether both halves of a Client/Server connection are present
pub fn are_connected<T: 'static>(client: &Client<T>, server: &Server<T>) -> bool {
    client.port.find_link(&server.port).is_some() && server.port.find_link(&client.port).is_some()
}

/// Connects the two Clients through the given shared value.
///
/// Does nothing if both are the same endpoint or the pair is already
/// connected
pub fn connect_clients_with<T: 'static>(first: &Client<T>, second: &Client<T>, data: Arc<T>) {
    if Arc::ptr_eq(&first.port, &second.port) {
        return;
    }
    if first.port.find_link(&second.port).is_some() {
        return;
    }

    first.port.links.insert(LinkPtr(Arc::new(Link {
        peer: second.port.clone(),
        data: Some(data.clone()),
    })));
    second.port.links.insert(LinkPtr(Arc::new(Link {
        peer: first.port.clone(),
        data: Some(data),
    })));
}

/// Connects the two Clients through a newly created shared value
pub fn connect_clients<T>(first: &Client<T>, second: &Client<T>)
where
    T: Default + 'static,
{
    connect_clients_with(first, second, Arc::new(T::default()));
}

/// Disconnects the two Clients; does nothing if the two are not connected
pub fn disconnect_clients<T: 'static>(first: &Client<T>, second: &Client<T>) {
    if let Some(link) = first.port.find_link(&second.port) {
        first.port.links.remove(&link);
    }
    if let Some(link) = second.port.find_link(&first.port) {
        second.port.links.remove(&link);
    }
}

/// Checks whether both halves of a Client/Client connection are present
pub fn are_clients_connected<T: 'static>(first: &Client<T>, second: &Client<T>) -> bool {
    first.port.find_link(&second.port).is_some() && second.port.find_link(&first.port).is_some()
}
