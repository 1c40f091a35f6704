use std::{
    io::{self, BufReader},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use tracing::{error, info, warn};

use crate::{
    config::ServerConfig,
    error::{ChatError, Result},
    eventlog::EventLog,
    protocol,
    room::Room,
    session,
};

/// Counts sessions from accept to teardown, including those still choosing a
/// username, so the cap holds before anyone reaches the registry.
struct Admission {
    active: Arc<AtomicUsize>,
    max: usize,
}

/// Held by a session thread for as long as its connection is open.
struct Slot {
    active: Arc<AtomicUsize>,
}

impl Admission {
    fn try_admit(&self) -> Option<Slot> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()
            .map(|_| Slot {
                active: Arc::clone(&self.active),
            })
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct Server {
    listener: TcpListener,
    room: Arc<Room>,
    events: EventLog,
    admission: Admission,
}

impl Server {
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr).map_err(|source| ChatError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let events = match &config.log_file {
            Some(path) => EventLog::new(path),
            None => EventLog::disabled(),
        };

        Ok(Self {
            listener,
            room: Arc::new(Room::new(config.max_clients, config.history_limit)),
            events,
            admission: Admission {
                active: Arc::new(AtomicUsize::new(0)),
                max: config.max_clients,
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn room(&self) -> Arc<Room> {
        Arc::clone(&self.room)
    }

    /// Accepts connections forever, one thread per client. Only returns on an
    /// accept error that is not transient.
    pub fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        info!(addr = %addr, max_clients = self.admission.max, "listening");

        for connection in self.listener.incoming() {
            let stream = match connection {
                Ok(stream) => stream,
                Err(err) if is_transient(&err) => {
                    warn!(error = %err, "accept failed, continuing");
                    continue;
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                    return Err(ChatError::Accept(err));
                }
            };

            let Some(slot) = self.admission.try_admit() else {
                turn_away(stream, self.admission.max);
                continue;
            };

            let room = Arc::clone(&self.room);
            let events = self.events.clone();
            thread::spawn(move || {
                let _slot = slot;
                if let Err(err) = handle_client(stream, &room, &events) {
                    warn!(error = %err, "client handler error");
                }
            });
        }

        Ok(())
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

fn turn_away(mut stream: TcpStream, max: usize) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(peer = %peer, max_clients = max, "server full, refusing connection");
    if let Err(err) = protocol::write_line(&mut stream, &protocol::server_full_notice(max)) {
        warn!(peer = %peer, error = %err, "could not send refusal");
    }
    let _ = stream.shutdown(Shutdown::Both);
}

fn handle_client(stream: TcpStream, room: &Room, events: &EventLog) -> Result<()> {
    let addr = stream.peer_addr()?;
    info!(peer = %addr, "connection accepted");

    let writer = Arc::new(Mutex::new(stream.try_clone()?));
    let reader = BufReader::new(stream);
    let result = session::serve(reader, Arc::clone(&writer), addr, room, events);

    let _ = writer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .shutdown(Shutdown::Both);
    result
}
