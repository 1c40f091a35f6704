use std::{
    collections::HashMap,
    net::{SocketAddr, TcpStream},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::error::RegistryError;

/// Write half of a client connection. Shared between the session that owns
/// the client and any broadcaster holding a snapshot.
pub type SharedWriter<W> = Arc<Mutex<W>>;

struct Client<W> {
    username: String,
    writer: SharedWriter<W>,
}

/// One registry entry, copied out of the lock by [`Registry::snapshot`].
pub struct Peer<W> {
    pub addr: SocketAddr,
    pub username: String,
    pub writer: SharedWriter<W>,
}

/// Who is online. Every method holds the lock only for the map operation
/// itself; nothing here performs network I/O.
pub struct Registry<W = TcpStream> {
    clients: Mutex<HashMap<SocketAddr, Client<W>>>,
    capacity: usize,
}

impl<W> Registry<W> {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SocketAddr, Client<W>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `addr` under `username` and returns how many clients are
    /// online afterwards. The uniqueness check and the insert happen under one
    /// lock, so two sessions can never claim the same name.
    pub fn insert(
        &self,
        addr: SocketAddr,
        username: &str,
        writer: SharedWriter<W>,
    ) -> Result<usize, RegistryError> {
        let mut clients = self.lock();
        if clients
            .iter()
            .any(|(other, client)| *other != addr && client.username == username)
        {
            return Err(RegistryError::NameTaken(username.to_string()));
        }
        if !clients.contains_key(&addr) && clients.len() >= self.capacity {
            return Err(RegistryError::Full(self.capacity));
        }
        clients.insert(
            addr,
            Client {
                username: username.to_string(),
                writer,
            },
        );
        Ok(clients.len())
    }

    /// Removes `addr`, returning the name it was registered under.
    pub fn remove(&self, addr: &SocketAddr) -> Option<String> {
        self.lock().remove(addr).map(|client| client.username)
    }

    /// True if a client other than `excluding` uses `username`.
    pub fn exists(&self, username: &str, excluding: &SocketAddr) -> bool {
        self.lock()
            .iter()
            .any(|(addr, client)| addr != excluding && client.username == username)
    }

    pub fn snapshot(&self) -> Vec<Peer<W>> {
        self.lock()
            .iter()
            .map(|(addr, client)| Peer {
                addr: *addr,
                username: client.username.clone(),
                writer: Arc::clone(&client.writer),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .values()
            .map(|client| client.username.clone())
            .collect();
        names.sort();
        names
    }
}
