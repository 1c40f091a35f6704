use crate::app::Event;
use std::{
    io::BufRead,
    sync::mpsc,
    thread,
    time::Duration,
};
use tcpchat::protocol;

pub fn handle_input_events(tx: mpsc::Sender<Event>) {
    loop {
        let event = match crossterm::event::read() {
            Ok(crossterm::event::Event::Key(key_event)) => Event::Input(key_event),
            Ok(crossterm::event::Event::Mouse(mouse_event)) => Event::Mouse(mouse_event),
            Ok(_) => continue,
            Err(_) => break,
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}

pub fn run_cursor_blink_thread(tx: mpsc::Sender<Event>) {
    let blink_duration = Duration::from_millis(500);
    while tx.send(Event::CursorBlink).is_ok() {
        thread::sleep(blink_duration);
    }
}

/// Forwards every line from the server until it hangs up.
pub fn handle_server_messages<R: BufRead>(mut reader: R, tx: mpsc::Sender<Event>) {
    let mut line = String::new();
    loop {
        match protocol::read_line(&mut reader, &mut line) {
            Ok(true) => {
                if tx.send(Event::ServerLine(line.clone())).is_err() {
                    break;
                }
            }
            Ok(false) => {
                let _ = tx.send(Event::ServerClosed("Server disconnected".to_string()));
                break;
            }
            Err(e) => {
                let _ = tx.send(Event::ServerClosed(format!("Connection error: {}", e)));
                break;
            }
        }
    }
}
