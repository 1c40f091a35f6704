use std::{
    io::Write,
    net::{SocketAddr, TcpStream},
    sync::PoisonError,
};

use tracing::{debug, warn};

use crate::{
    error::RegistryError,
    history::{History, HistoryLine},
    protocol,
    registry::{Registry, SharedWriter},
};

/// State shared by every session: who is online and what has been said.
pub struct Room<W = TcpStream> {
    pub registry: Registry<W>,
    pub history: History,
}

impl<W: Write> Room<W> {
    pub fn new(max_clients: usize, history_limit: Option<usize>) -> Self {
        Self {
            registry: Registry::new(max_clients),
            history: History::new(history_limit),
        }
    }

    /// Registers a newcomer and returns the lines it should be replayed, which
    /// is nothing when it is alone. Both happen under the history lock, so any
    /// broadcast is either in the returned lines or addressed to the newcomer
    /// live, never both.
    pub fn admit(
        &self,
        addr: SocketAddr,
        username: &str,
        writer: SharedWriter<W>,
    ) -> Result<Vec<HistoryLine>, RegistryError> {
        self.history.with_lines(|lines| {
            let online = self.registry.insert(addr, username, writer)?;
            Ok(if online > 1 {
                lines.iter().cloned().collect()
            } else {
                Vec::new()
            })
        })
    }

    /// Records `message` in the history and sends it to every registered
    /// client except `sender`. Returns how many peers it reached.
    ///
    /// The recipients are snapshotted while the history lock is still held
    /// (lock order: history, then registry). Peers are written after both
    /// locks are released. A peer that fails to accept the write is logged and
    /// skipped; its own session notices the broken connection on its next read.
    pub fn broadcast(&self, sender: &SocketAddr, message: &str) -> usize {
        let peers = self
            .history
            .append_with(message, || self.registry.snapshot());

        let mut delivered = 0;
        for peer in peers {
            if peer.addr == *sender {
                continue;
            }
            let mut writer = peer.writer.lock().unwrap_or_else(PoisonError::into_inner);
            match protocol::write_line(&mut *writer, message) {
                Ok(()) => delivered += 1,
                Err(err) => warn!(
                    peer = %peer.addr,
                    name = %peer.username,
                    error = %err,
                    "failed to deliver message"
                ),
            }
        }
        debug!(sender = %sender, delivered, "broadcast");
        delivered
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    /// In-memory client connection that can be switched to fail on write.
    #[derive(Default)]
    pub(crate) struct MemoryConn {
        pub(crate) written: Vec<u8>,
        pub(crate) broken: bool,
    }

    impl MemoryConn {
        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.written).into_owned()
        }
    }

    impl Write for MemoryConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"));
            }
            self.written.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    pub(crate) fn join(
        room: &Room<MemoryConn>,
        port: u16,
        name: &str,
    ) -> Arc<Mutex<MemoryConn>> {
        let conn = Arc::new(Mutex::new(MemoryConn::default()));
        room.registry
            .insert(addr(port), name, Arc::clone(&conn))
            .unwrap();
        conn
    }

    #[test]
    fn broadcast_skips_the_sender() {
        let room = Room::new(10, None);
        let a = join(&room, 1, "A");
        let b = join(&room, 2, "B");
        let c = join(&room, 3, "C");

        assert_eq!(room.broadcast(&addr(1), "[A]: hi"), 2);

        assert_eq!(a.lock().unwrap().text(), "");
        assert_eq!(b.lock().unwrap().text(), "[A]: hi\n");
        assert_eq!(c.lock().unwrap().text(), "[A]: hi\n");
    }

    #[test]
    fn every_broadcast_lands_in_history() {
        let room = Room::<MemoryConn>::new(10, None);
        room.broadcast(&addr(1), "first");
        room.broadcast(&addr(2), "second");
        room.broadcast(&addr(1), "third");

        let texts: Vec<_> = room.history.lines().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec![" first", " second", " third"]);
    }

    #[test]
    fn a_broken_peer_does_not_stop_delivery() {
        let room = Room::new(10, None);
        let _a = join(&room, 1, "A");
        let b = join(&room, 2, "B");
        let c = join(&room, 3, "C");
        b.lock().unwrap().broken = true;

        assert_eq!(room.broadcast(&addr(1), "[A]: hi"), 1);
        assert_eq!(c.lock().unwrap().text(), "[A]: hi\n");
        // the failing peer stays registered until its own session ends
        assert_eq!(room.registry.len(), 3);
    }

    #[test]
    fn admit_returns_history_only_when_others_are_online() {
        let room = Room::<MemoryConn>::new(10, None);
        room.broadcast(&addr(9), "INFO : earlier");

        let first = Arc::new(Mutex::new(MemoryConn::default()));
        assert!(room.admit(addr(1), "A", first).unwrap().is_empty());

        let second = Arc::new(Mutex::new(MemoryConn::default()));
        let backlog = room.admit(addr(2), "B", second).unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].text, " INFO : earlier");

        let taken = Arc::new(Mutex::new(MemoryConn::default()));
        assert_eq!(
            room.admit(addr(3), "A", taken),
            Err(RegistryError::NameTaken("A".into()))
        );
    }

    #[test]
    fn a_line_is_either_replayed_or_delivered_live() {
        let room = Arc::new(Room::<MemoryConn>::new(10, None));
        let _a = join(&room, 1, "A");

        // the newcomer's writer stays locked until its backlog is written,
        // just as during username entry
        let newcomer = Arc::new(Mutex::new(MemoryConn::default()));
        let mut out = newcomer.lock().unwrap();

        let talker = {
            let room = Arc::clone(&room);
            std::thread::spawn(move || {
                for i in 0..50 {
                    room.broadcast(&addr(1), &format!("[A]: {}", i));
                }
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(1));
        let backlog = room.admit(addr(2), "B", Arc::clone(&newcomer)).unwrap();
        crate::history::write_replay(&backlog, &mut *out).unwrap();
        drop(out);
        talker.join().unwrap();

        let text = newcomer.lock().unwrap().text();
        let lines: Vec<&str> = text.lines().collect();
        let (replayed, live) = lines.split_at(backlog.len());
        assert!(replayed.iter().all(|l| l.starts_with('[') && !l.starts_with("[A]")));
        assert!(live.iter().all(|l| l.starts_with("[A]: ")));

        let seen: Vec<String> = replayed
            .iter()
            .map(|l| l[22..].to_string())
            .chain(live.iter().map(|l| l.to_string()))
            .collect();
        let expected: Vec<String> = (0..50).map(|i| format!("[A]: {}", i)).collect();
        assert_eq!(seen, expected);
    }
}
