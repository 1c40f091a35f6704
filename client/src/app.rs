use crate::input_widget::{InputAction, InputWidget};
use chrono::{DateTime, Local, NaiveDateTime};
use crossterm::event::{MouseEvent, MouseEventKind};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Layout},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Padding, Paragraph, Wrap},
};
use std::{
    io::{self, Write},
    sync::mpsc,
};
use tcpchat::protocol;

pub struct Message {
    pub time: String,
    pub author: String,
    pub content: String,
}

pub enum Event {
    Input(crossterm::event::KeyEvent),
    Mouse(crossterm::event::MouseEvent),
    CursorBlink,
    ServerLine(String),
    ServerClosed(String),
}

/// Splits a server line into time, author and content.
///
/// Replayed history carries its own `[DD/MM/YYYY HH:MM:SS]` stamp; live lines
/// are stamped with `received`.
pub fn parse_server_line(line: &str, received: &DateTime<Local>) -> Message {
    let (time, rest) = match split_timestamp(line) {
        Some((time, rest)) => (time.to_string(), rest),
        None => (protocol::timestamp(received), line),
    };

    let (author, content) = if let Some((author, content)) = rest
        .strip_prefix('[')
        .and_then(|tail| tail.split_once("]: "))
    {
        (author, content)
    } else if let Some(content) = rest.strip_prefix("INFO : ") {
        ("INFO", content)
    } else if let Some(content) = rest.strip_prefix("ERROR : ") {
        ("ERROR", content)
    } else {
        ("Server", rest)
    };

    Message {
        time,
        author: author.to_string(),
        content: content.to_string(),
    }
}

fn split_timestamp(line: &str) -> Option<(&str, &str)> {
    let (stamp, rest) = line.strip_prefix('[')?.split_once("] ")?;
    NaiveDateTime::parse_from_str(stamp, protocol::TIMESTAMP_FORMAT).ok()?;
    Some((stamp, rest))
}

pub struct App {
    pub running: bool,
    pub input_widget: InputWidget,
    pub messages: Vec<Message>,
    /// Messages hidden below the view; zero follows the newest.
    pub scroll_offset: usize,
    pub username: String,
    pub server_addr: String,
    pub connected: bool,
    write_stream: Box<dyn Write + Send>,
}

impl App {
    pub fn new(username: String, server_addr: String, write_stream: Box<dyn Write + Send>) -> Self {
        Self {
            running: true,
            input_widget: InputWidget::new(username.clone()),
            messages: Vec::new(),
            scroll_offset: 0,
            username,
            server_addr,
            connected: true,
            write_stream,
        }
    }

    pub fn add_message(&mut self, author: &str, content: String) {
        self.messages.push(Message {
            time: protocol::timestamp(&Local::now()),
            author: author.to_string(),
            content,
        });
        self.keep_view_anchored();
    }

    fn keep_view_anchored(&mut self) {
        // a reader scrolled up keeps looking at the same messages
        if self.scroll_offset > 0 {
            self.scroll_offset += 1;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
    }

    fn scroll_up(&mut self) {
        if self.scroll_offset < self.messages.len().saturating_sub(1) {
            self.scroll_offset += 1;
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Input(key_event) => match self.input_widget.handle_key_event(key_event) {
                InputAction::Quit => self.running = false,
                InputAction::Submit(line) => self.send(line),
                InputAction::None => {}
            },
            Event::Mouse(mouse_event) => self.handle_mouse_event(mouse_event),
            Event::CursorBlink => self.input_widget.update_cursor_blink(),
            Event::ServerLine(line) => {
                self.messages.push(parse_server_line(&line, &Local::now()));
                self.keep_view_anchored();
            }
            Event::ServerClosed(reason) => {
                self.connected = false;
                self.add_message("INFO", format!("{}, press Esc to quit", reason));
            }
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal, rx: mpsc::Receiver<Event>) -> io::Result<()> {
        terminal.draw(|frame| self.draw(frame))?;
        while self.running {
            let Ok(event) = rx.recv() else {
                break;
            };
            self.handle_event(event);
            terminal.draw(|frame| self.draw(frame))?;
        }
        Ok(())
    }

    fn send(&mut self, line: String) {
        if !self.connected {
            self.add_message("ERROR", "not connected to the server".to_string());
            return;
        }
        match protocol::write_line(&mut self.write_stream, &line) {
            Ok(()) => self.add_message("You", line),
            Err(e) => self.add_message("ERROR", format!("Failed to send message: {}", e)),
        }
    }

    fn handle_mouse_event(&mut self, mouse_event: MouseEvent) {
        match mouse_event.kind {
            MouseEventKind::ScrollDown => self.scroll_down(),
            MouseEventKind::ScrollUp => self.scroll_up(),
            _ => {}
        }
    }

    fn author_style(&self, author: &str) -> Style {
        match author {
            "You" => Style::default().fg(Color::Cyan).bold(),
            "INFO" => Style::default().fg(Color::Yellow).bold(),
            "ERROR" => Style::default().fg(Color::Red).bold(),
            _ => Style::default().bold(),
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        const BG_PRIMARY: Color = Color::Rgb(0, 0, 0);
        const BG_SECONDARY: Color = Color::Rgb(30, 30, 30);
        const BG_SUCCESS: Color = Color::Rgb(89, 87, 86);
        const TEXT_PRIMARY: Color = Color::Rgb(255, 255, 255);
        const TEXT_SECONDARY: Color = Color::Rgb(128, 128, 128);

        let [main_area, info_area] =
            Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(frame.area());

        let available_width = main_area.width.saturating_sub(4);
        let input_area_height = self.input_widget.calculate_height(available_width);

        let [content_area, input_area, input_info_area] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(input_area_height),
            Constraint::Length(3),
        ])
        .areas(main_area);

        // newest messages that fit, counting wrapped lines
        let inner_width = content_area.width.saturating_sub(2).max(1) as usize;
        let mut budget = content_area.height.saturating_sub(2) as usize;
        let end = self.messages.len().saturating_sub(self.scroll_offset);
        let mut start = end;
        while start > 0 && budget > 0 {
            let message = &self.messages[start - 1];
            let width = message.time.len() + message.author.len() + message.content.chars().count() + 5;
            let needed = width.div_ceil(inner_width).max(1);
            if needed > budget && start != end {
                break;
            }
            budget = budget.saturating_sub(needed);
            start -= 1;
        }

        let lines: Vec<Line> = self.messages[start..end]
            .iter()
            .map(|message| {
                Line::from(vec![
                    Span::styled(
                        format!("[{}] ", message.time),
                        Style::default().fg(TEXT_SECONDARY),
                    ),
                    Span::styled(format!("{}: ", message.author), self.author_style(&message.author)),
                    Span::styled(message.content.clone(), Style::default().fg(TEXT_PRIMARY)),
                ])
            })
            .collect();

        let messages_widget = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::new().padding(Padding::uniform(1)));

        let version = Line::from(Span::styled(
            format!(" tcpchat v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(TEXT_PRIMARY),
        ))
        .centered()
        .bg(BG_SUCCESS);

        let status = if self.connected {
            format!(" Connected to {} ", self.server_addr)
        } else {
            format!(" Disconnected from {} ", self.server_addr)
        };
        let conn_info =
            Line::from(Span::styled(status, Style::default().fg(TEXT_SECONDARY))).bg(BG_SECONDARY);

        let [version_area, conn_area] = Layout::horizontal([
            Constraint::Length(version.width() as u16),
            Constraint::Fill(1),
        ])
        .areas(info_area);

        frame.render_widget(Block::new().bg(BG_PRIMARY), main_area);
        frame.render_widget(messages_widget, content_area);
        self.input_widget.render(frame, input_area, input_info_area);
        frame.render_widget(version, version_area);
        frame.render_widget(conn_info, conn_area);
    }
}
