//! # tcpchat
//!
//! A small multi-user chat broker over plain TCP. Every connection picks a
//! unique username, then each line it sends is relayed to everyone else who is
//! online. Newcomers get the conversation so far replayed to them.
//!
//! ```text
//!  TcpListener ──accept──> thread per client
//!                              │
//!                      session::negotiate ──admit──> Registry + History backlog
//!                              │
//!                      session::receive_loop ──> Room::broadcast ──> History
//!                              │                        │
//!                           Departure                  peers (snapshot)
//! ```
//!
//! The registry and the history are each behind their own mutex, always taken
//! history first, and neither lock is ever held while writing to a socket.

pub mod config;
pub mod error;
pub mod eventlog;
pub mod history;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;

pub use config::{Args, ServerConfig};
pub use error::{ChatError, RegistryError, Result};
pub use eventlog::EventLog;
pub use history::{History, HistoryLine};
pub use registry::Registry;
pub use room::Room;
pub use server::Server;
