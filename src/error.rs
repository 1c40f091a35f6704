//! Error types for the chat broker

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Errors raised by the listener and by individual sessions.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The listener could not bind its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// `accept` failed with an error that is not worth retrying.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The peer went away before sending a complete username line.
    #[error("peer {0} disconnected during username entry")]
    NegotiationInterrupted(SocketAddr),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ChatError {
    /// Process exit status for errors that stop the server.
    pub fn exit_code(&self) -> u8 {
        match self {
            ChatError::Bind { .. } => 2,
            ChatError::Accept(_) => 3,
            _ => 1,
        }
    }
}

/// Why the registry refused an insert.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("server is full ({0} clients)")]
    Full(usize),

    #[error("username {0} is already taken")]
    NameTaken(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
