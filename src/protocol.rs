//! Wire format shared by the server and the terminal client.
//!
//! Everything is UTF-8 text, one message per `\n`-terminated line. The only
//! fixed token is [`ACCEPTED_TOKEN`]: clients stop re-prompting for a username
//! as soon as a server line contains it.

use std::{
    fmt,
    io::{self, BufRead, Write},
};

use chrono::{DateTime, Local};

/// Marks the end of username negotiation. Existing clients match on this exact
/// substring, so it must not change.
pub const ACCEPTED_TOKEN: &str = "SUCCÈS";

pub const MAX_NAME_CHARS: usize = 20;

pub const DEFAULT_MAX_CLIENTS: usize = 10;

pub const DEFAULT_PORT: u16 = 8989;

/// `DD/MM/YYYY HH:MM:SS`, used for history replay and the event log.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

pub fn timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Live form of a chat line, as peers receive it.
pub fn chat_line(name: &str, text: &str) -> String {
    format!("[{}]: {}", name, text)
}

pub fn join_notice(name: &str) -> String {
    format!("INFO : {} joined the chat", name)
}

pub fn leave_notice(name: &str) -> String {
    format!("INFO : {} disconnected", name)
}

pub fn server_full_notice(max_clients: usize) -> String {
    format!(
        "ERROR : the server is full ({} clients), try again later",
        max_clients
    )
}

/// Reasons a proposed username is refused. The client is asked again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRejection {
    Empty,
    TooLong(usize),
    Taken(String),
}

impl fmt::Display for NameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameRejection::Empty => write!(f, "your username must not be empty"),
            NameRejection::TooLong(len) => write!(
                f,
                "your username must not exceed {} characters (got {})",
                MAX_NAME_CHARS, len
            ),
            NameRejection::Taken(name) => {
                write!(f, "the username {} is already taken, pick another one", name)
            }
        }
    }
}

/// Outcome of one username proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(String),
    Rejected(NameRejection),
}

impl Verdict {
    /// The line sent back to the client for this verdict.
    pub fn reply(&self) -> String {
        match self {
            Verdict::Accepted(name) => {
                format!("{} : welcome to the chat, {}!", ACCEPTED_TOKEN, name)
            }
            Verdict::Rejected(reason) => format!("ERROR : {}", reason),
        }
    }
}

/// Checks the length rules for a username. The name must already have its
/// line ending removed.
pub fn validate_name(name: &str) -> Result<&str, NameRejection> {
    let len = name.chars().count();
    if len == 0 {
        return Err(NameRejection::Empty);
    }
    if len > MAX_NAME_CHARS {
        return Err(NameRejection::TooLong(len));
    }
    Ok(name)
}

pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Reads one complete line into `buf` (cleared first) without its line ending.
///
/// Returns `Ok(false)` when the stream ends, including when it ends in the
/// middle of a line: a partial line is never handed to the caller. Bytes that
/// are not valid UTF-8 become U+FFFD rather than failing the read.
pub fn read_line<R: BufRead>(reader: &mut R, buf: &mut String) -> io::Result<bool> {
    buf.clear();
    let mut bytes = Vec::new();
    let n = reader.read_until(b'\n', &mut bytes)?;
    if n == 0 || bytes.last() != Some(&b'\n') {
        return Ok(false);
    }
    bytes.pop();
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    buf.push_str(&String::from_utf8_lossy(&bytes));
    Ok(true)
}

pub fn write_line<W: Write + ?Sized>(writer: &mut W, text: &str) -> io::Result<()> {
    writer.write_all(text.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}
