mod app;
mod cli_args;
mod events;
mod input_widget;
mod login;

use crate::{
    app::{App, Event},
    cli_args::Args,
    events::{handle_input_events, handle_server_messages, run_cursor_blink_thread},
};
use clap::Parser;
use crossterm::style::Stylize;
use std::{
    io::{self, BufRead, BufReader, Write},
    net::TcpStream,
    sync::mpsc,
    thread,
};
use tcpchat::protocol;

fn prompt_username() -> io::Result<Option<String>> {
    print!("{}", "Enter your username: ".blue());
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(protocol::strip_line_ending(&line).to_string()))
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let server_addr = args.server_addr();

    let mut stream = TcpStream::connect(&server_addr).inspect_err(|e| {
        let message = format!("Could not reach {}: {}", server_addr, e);
        eprintln!("{}", message.as_str().red());
    })?;
    println!("Connecting to {} ...", server_addr);
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut preset = args.username;
    let username = login::login(
        &mut reader,
        &mut stream,
        || match preset.take() {
            Some(name) => Ok(Some(name)),
            None => prompt_username(),
        },
        |reply| println!("{}", reply),
    )?;
    let Some(username) = username else {
        println!("{}", "You are now disconnected!".red());
        return Ok(());
    };

    crossterm::execute!(io::stdout(), crossterm::event::EnableMouseCapture)?;
    let mut terminal = ratatui::init();

    let (event_tx, event_rx) = mpsc::channel::<Event>();

    let tx_to_input_events = event_tx.clone();
    thread::spawn(move || {
        handle_input_events(tx_to_input_events);
    });

    let tx_to_cursor_events = event_tx.clone();
    thread::spawn(move || {
        run_cursor_blink_thread(tx_to_cursor_events);
    });

    // the reader may already hold history sent right after the welcome line
    thread::spawn(move || {
        handle_server_messages(reader, event_tx);
    });

    let mut app = App::new(username, server_addr, Box::new(stream));
    let app_result = app.run(&mut terminal, event_rx);

    ratatui::restore();
    crossterm::execute!(io::stdout(), crossterm::event::DisableMouseCapture)?;
    println!("{}", "You are now disconnected!".red());
    app_result
}
