//! One client's life on the server: username negotiation, the receive loop
//! and the departure that follows.

use std::{
    io::{BufRead, Write},
    net::SocketAddr,
    sync::{Arc, PoisonError},
};

use tracing::{debug, info};

use crate::{
    error::{ChatError, RegistryError, Result},
    eventlog::EventLog,
    history,
    protocol::{self, NameRejection, Verdict},
    registry::SharedWriter,
    room::Room,
};

/// Asks for usernames until one is accepted and registered.
///
/// The client's writer is locked from the registry insert until the
/// acknowledgement and any history backlog are written, so live broadcasts
/// reach the client only after both. A write that fails during entry undoes
/// the registration and ends negotiation as interrupted.
pub fn negotiate<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &SharedWriter<W>,
    addr: SocketAddr,
    room: &Room<W>,
) -> Result<String> {
    let mut line = String::new();
    loop {
        match protocol::read_line(reader, &mut line) {
            Ok(true) => {}
            Ok(false) => return Err(ChatError::NegotiationInterrupted(addr)),
            Err(err) => {
                debug!(peer = %addr, error = %err, "read failed during username entry");
                return Err(ChatError::NegotiationInterrupted(addr));
            }
        }

        let mut out = writer.lock().unwrap_or_else(PoisonError::into_inner);
        let (verdict, backlog) = match protocol::validate_name(&line) {
            Err(reason) => (Verdict::Rejected(reason), Vec::new()),
            Ok(name) => match room.admit(addr, name, Arc::clone(writer)) {
                Ok(backlog) => (Verdict::Accepted(name.to_string()), backlog),
                Err(RegistryError::NameTaken(name)) => {
                    (Verdict::Rejected(NameRejection::Taken(name)), Vec::new())
                }
                Err(RegistryError::Full(max)) => {
                    protocol::write_line(&mut *out, &protocol::server_full_notice(max))?;
                    return Err(RegistryError::Full(max).into());
                }
            },
        };

        let sent = protocol::write_line(&mut *out, &verdict.reply())
            .and_then(|()| history::write_replay(&backlog, &mut *out));
        if let Err(err) = sent {
            if matches!(verdict, Verdict::Accepted(_)) {
                room.registry.remove(&addr);
            }
            debug!(peer = %addr, error = %err, "write failed during username entry");
            return Err(ChatError::NegotiationInterrupted(addr));
        }

        match verdict {
            Verdict::Accepted(name) => {
                debug!(peer = %addr, replayed = backlog.len(), "history replayed");
                return Ok(name);
            }
            Verdict::Rejected(reason) => {
                debug!(peer = %addr, reason = %reason, "username rejected");
            }
        }
    }
}

/// Relays every line the client sends as `[username]: <line>` until the
/// connection ends. Returns the number of lines relayed.
pub fn receive_loop<R: BufRead, W: Write>(
    reader: &mut R,
    room: &Room<W>,
    addr: SocketAddr,
    username: &str,
) -> usize {
    let mut line = String::new();
    let mut relayed = 0;
    loop {
        match protocol::read_line(reader, &mut line) {
            Ok(true) => {
                room.broadcast(&addr, &protocol::chat_line(username, &line));
                relayed += 1;
            }
            Ok(false) => break,
            Err(err) => {
                debug!(peer = %addr, name = %username, error = %err, "read failed");
                break;
            }
        }
    }
    relayed
}

/// Deregisters a client and announces it left. Runs when dropped, so every
/// exit path out of [`serve`] after a successful negotiation goes through it,
/// and the registry removal makes it happen at most once per client.
struct Departure<'a, W: Write> {
    room: &'a Room<W>,
    events: &'a EventLog,
    addr: SocketAddr,
    username: String,
}

impl<W: Write> Drop for Departure<'_, W> {
    fn drop(&mut self) {
        if self.room.registry.remove(&self.addr).is_none() {
            return;
        }
        self.room
            .broadcast(&self.addr, &protocol::leave_notice(&self.username));
        self.events.left(&self.username);
        info!(
            peer = %self.addr,
            name = %self.username,
            online = self.room.registry.len(),
            "client disconnected"
        );
    }
}

/// Runs a whole session over an already accepted connection.
pub fn serve<R: BufRead, W: Write>(
    mut reader: R,
    writer: SharedWriter<W>,
    addr: SocketAddr,
    room: &Room<W>,
    events: &EventLog,
) -> Result<()> {
    let username = match negotiate(&mut reader, &writer, addr, room) {
        Ok(username) => username,
        Err(ChatError::NegotiationInterrupted(_)) => {
            info!(peer = %addr, "connection closed during username entry");
            events.username_interrupted(&addr.to_string());
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let _departure = Departure {
        room,
        events,
        addr,
        username: username.clone(),
    };

    info!(
        peer = %addr,
        name = %username,
        online = room.registry.len(),
        "client joined"
    );
    events.joined(&username);
    room.broadcast(&addr, &protocol::join_notice(&username));

    let relayed = receive_loop(&mut reader, room, addr, &username);
    debug!(peer = %addr, name = %username, relayed, "receive loop ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::tests::{MemoryConn, addr, join};
    use std::{
        io::Cursor,
        sync::{Arc, Mutex},
    };

    fn conn() -> SharedWriter<MemoryConn> {
        Arc::new(Mutex::new(MemoryConn::default()))
    }

    fn lines(conn: &SharedWriter<MemoryConn>) -> Vec<String> {
        conn.lock()
            .unwrap()
            .text()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn first_valid_name_is_accepted() {
        let room = Room::new(10, None);
        let out = conn();
        let mut input = Cursor::new(&b"alice\n"[..]);

        let name = negotiate(&mut input, &out, addr(1), &room).unwrap();

        assert_eq!(name, "alice");
        assert_eq!(room.registry.names(), vec!["alice"]);
        let replies = lines(&out);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains(protocol::ACCEPTED_TOKEN));
    }

    #[test]
    fn bad_names_are_reprompted() {
        let room = Room::new(10, None);
        let _taken = join(&room, 9, "bob");
        let out = conn();
        let long = "x".repeat(21);
        let input = format!("\n{}\nbob\nbobby\r\n", long);
        let mut input = Cursor::new(input.into_bytes());

        let name = negotiate(&mut input, &out, addr(1), &room).unwrap();

        assert_eq!(name, "bobby");
        let replies = lines(&out);
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0], Verdict::Rejected(NameRejection::Empty).reply());
        assert_eq!(replies[1], Verdict::Rejected(NameRejection::TooLong(21)).reply());
        assert_eq!(
            replies[2],
            Verdict::Rejected(NameRejection::Taken("bob".into())).reply()
        );
        assert!(replies[3].contains(protocol::ACCEPTED_TOKEN));
        assert!(!room.registry.exists(&long, &addr(0)));
    }

    #[test]
    fn disconnect_during_negotiation_leaves_no_entry() {
        let room = Room::new(10, None);
        let out = conn();
        let mut input = Cursor::new(&b"\nhalf-a-na"[..]);

        let err = negotiate(&mut input, &out, addr(1), &room).unwrap_err();

        assert!(matches!(err, ChatError::NegotiationInterrupted(a) if a == addr(1)));
        assert!(room.registry.is_empty());
    }

    #[test]
    fn full_registry_refuses_negotiation() {
        let room = Room::new(1, None);
        let _a = join(&room, 9, "A");
        let out = conn();
        let mut input = Cursor::new(&b"B\n"[..]);

        let err = negotiate(&mut input, &out, addr(1), &room).unwrap_err();

        assert!(matches!(err, ChatError::Registry(RegistryError::Full(1))));
        assert_eq!(lines(&out), vec![protocol::server_full_notice(1)]);
    }

    #[test]
    fn receive_loop_prefixes_and_relays() {
        let room = Room::new(10, None);
        let a = join(&room, 1, "A");
        let b = join(&room, 2, "B");
        let mut input = Cursor::new(&b"hi\nhow are you\n"[..]);

        assert_eq!(receive_loop(&mut input, &room, addr(1), "A"), 2);

        assert_eq!(lines(&b), vec!["[A]: hi", "[A]: how are you"]);
        assert!(lines(&a).is_empty());
        assert_eq!(room.history.len(), 2);
    }

    #[test]
    fn serve_runs_join_chat_and_departure() {
        let room = Room::new(10, None);
        let events = EventLog::disabled();
        let b = join(&room, 2, "B");
        room.broadcast(&addr(2), "[B]: anyone?");
        let a = conn();
        let input = Cursor::new(&b"A\nhi\n"[..]);

        serve(input, Arc::clone(&a), addr(1), &room, &events).unwrap();

        assert_eq!(
            lines(&b),
            vec!["INFO : A joined the chat", "[A]: hi", "INFO : A disconnected"]
        );
        let seen_by_a = lines(&a);
        assert!(seen_by_a[0].contains(protocol::ACCEPTED_TOKEN));
        // B was already online, so A is shown what was said before it arrived
        assert_eq!(seen_by_a.len(), 2);
        assert!(seen_by_a[1].ends_with("] [B]: anyone?"));
        assert_eq!(room.registry.names(), vec!["B"]);
        assert_eq!(room.history.len(), 4);
    }

    #[test]
    fn sole_client_gets_no_replay() {
        let room = Room::new(10, None);
        room.broadcast(&addr(9), "[old]: earlier");
        let a = conn();
        let input = Cursor::new(&b"A\n"[..]);

        serve(input, Arc::clone(&a), addr(1), &room, &EventLog::disabled()).unwrap();

        assert_eq!(lines(&a).len(), 1);
        assert!(room.registry.is_empty());
    }

    #[test]
    fn backlog_follows_the_acknowledgement() {
        let room = Room::new(10, None);
        let _b = join(&room, 2, "B");
        room.broadcast(&addr(2), "INFO : B joined the chat");
        room.broadcast(&addr(2), "[B]: hello?");
        let out = conn();
        let mut input = Cursor::new(&b"A\n"[..]);

        negotiate(&mut input, &out, addr(1), &room).unwrap();

        let seen = lines(&out);
        assert_eq!(seen.len(), 3);
        assert!(seen[0].contains(protocol::ACCEPTED_TOKEN));
        assert!(seen[1].ends_with("] INFO : B joined the chat"));
        assert!(seen[2].ends_with("] [B]: hello?"));
    }

    #[test]
    fn failed_acknowledgement_counts_as_interrupted() {
        let room = Room::new(10, None);
        let out = conn();
        out.lock().unwrap().broken = true;
        let mut input = Cursor::new(&b"alice\n"[..]);

        let err = negotiate(&mut input, &out, addr(1), &room).unwrap_err();

        assert!(matches!(err, ChatError::NegotiationInterrupted(a) if a == addr(1)));
        assert!(room.registry.is_empty());
        assert!(!room.registry.exists("alice", &addr(2)));
    }

    #[test]
    fn failed_rejection_counts_as_interrupted() {
        let room = Room::new(10, None);
        let out = conn();
        out.lock().unwrap().broken = true;
        let mut input = Cursor::new(&b"\nalice\n"[..]);

        let err = negotiate(&mut input, &out, addr(1), &room).unwrap_err();

        assert!(matches!(err, ChatError::NegotiationInterrupted(_)));
        assert!(room.registry.is_empty());
    }

    #[test]
    fn serve_logs_a_failed_acknowledgement_as_interrupted_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.txt");
        let room = Room::new(10, None);
        let b = join(&room, 2, "B");
        let a = conn();
        a.lock().unwrap().broken = true;
        let input = Cursor::new(&b"A\nhi\n"[..]);

        serve(input, Arc::clone(&a), addr(1), &room, &EventLog::new(&path)).unwrap();

        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.trim_end().ends_with("] connection 127.0.0.1:1 closed during username entry"));
        assert!(lines(&b).is_empty());
        assert_eq!(room.registry.names(), vec!["B"]);
    }

    #[test]
    fn invalid_utf8_is_relayed_with_replacement_characters() {
        let room = Room::new(10, None);
        let _a = join(&room, 1, "A");
        let b = join(&room, 2, "B");
        let mut input = Cursor::new(&b"caf\xe9\nstill here\n"[..]);

        assert_eq!(receive_loop(&mut input, &room, addr(1), "A"), 2);

        assert_eq!(lines(&b), vec!["[A]: caf\u{FFFD}", "[A]: still here"]);
    }

    #[test]
    fn invalid_utf8_name_does_not_drop_the_connection() {
        let room = Room::new(10, None);
        let out = conn();
        let mut input = Cursor::new(&b"Ren\xe9\n"[..]);

        let name = negotiate(&mut input, &out, addr(1), &room).unwrap();

        assert_eq!(name, "Ren\u{FFFD}");
        let replies = lines(&out);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains(protocol::ACCEPTED_TOKEN));
    }

    #[test]
    fn departure_is_announced_once() {
        let room = Room::new(10, None);
        let b = join(&room, 2, "B");
        let events = EventLog::disabled();
        room.registry.insert(addr(1), "A", conn()).unwrap();

        {
            let _first = Departure {
                room: &room,
                events: &events,
                addr: addr(1),
                username: "A".into(),
            };
            let _second = Departure {
                room: &room,
                events: &events,
                addr: addr(1),
                username: "A".into(),
            };
        }

        assert_eq!(lines(&b), vec!["INFO : A disconnected"]);
        assert_eq!(room.registry.len(), 1);
    }
}
