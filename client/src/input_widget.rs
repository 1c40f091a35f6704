use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::Rect,
    prelude::Stylize,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Padding, Paragraph, Wrap},
};
use std::time::Instant;

/// What the app should do after a key press.
#[derive(Debug, PartialEq, Eq)]
pub enum InputAction {
    None,
    Submit(String),
    Quit,
}

/// Single-line editor. The cursor counts characters, not bytes.
pub struct InputWidget {
    text: String,
    cursor: usize,
    cursor_visible: bool,
    last_input_time: Instant,
    username: String,
}

impl InputWidget {
    pub fn new(username: String) -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            cursor_visible: true,
            last_input_time: Instant::now(),
            username,
        }
    }

    #[cfg(test)]
    fn text(&self) -> &str {
        &self.text
    }

    fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    fn insert(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.text.insert(at, c);
        self.cursor += 1;
    }

    fn delete_before_cursor(&mut self) {
        if self.cursor > 0 {
            let at = self.byte_index(self.cursor - 1);
            self.text.remove(at);
            self.cursor -= 1;
        }
    }

    fn delete_at_cursor(&mut self) {
        if self.cursor < self.char_count() {
            let at = self.byte_index(self.cursor);
            self.text.remove(at);
        }
    }

    fn delete_word_before_cursor(&mut self) {
        let chars: Vec<char> = self.text.chars().collect();
        let mut start = self.cursor;
        while start > 0 && chars[start - 1].is_whitespace() {
            start -= 1;
        }
        while start > 0 && !chars[start - 1].is_whitespace() {
            start -= 1;
        }
        let (from, to) = (self.byte_index(start), self.byte_index(self.cursor));
        self.text.drain(from..to);
        self.cursor = start;
    }

    fn take_line(&mut self) -> Option<String> {
        if self.text.trim().is_empty() {
            return None;
        }
        self.cursor = 0;
        Some(std::mem::take(&mut self.text))
    }

    pub fn handle_key_event(&mut self, key_event: KeyEvent) -> InputAction {
        let ctrl = key_event.modifiers.contains(KeyModifiers::CONTROL);
        self.last_input_time = Instant::now();

        match key_event.code {
            KeyCode::Esc => return InputAction::Quit,
            KeyCode::Char('c') if ctrl => return InputAction::Quit,
            KeyCode::Char('a') if ctrl => self.cursor = 0,
            KeyCode::Char('e') if ctrl => self.cursor = self.char_count(),
            KeyCode::Char('u') if ctrl => {
                let to = self.byte_index(self.cursor);
                self.text.drain(..to);
                self.cursor = 0;
            }
            KeyCode::Char('w') if ctrl => self.delete_word_before_cursor(),
            KeyCode::Char(c) => self.insert(c),
            KeyCode::Backspace if key_event.modifiers.contains(KeyModifiers::ALT) => {
                self.delete_word_before_cursor()
            }
            KeyCode::Backspace => self.delete_before_cursor(),
            KeyCode::Delete => self.delete_at_cursor(),
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.char_count()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.char_count(),
            KeyCode::Enter => {
                if let Some(line) = self.take_line() {
                    return InputAction::Submit(line);
                }
            }
            _ => {}
        }
        InputAction::None
    }

    pub fn update_cursor_blink(&mut self) {
        if self.last_input_time.elapsed().as_secs() >= 1 {
            self.cursor_visible = !self.cursor_visible;
        } else {
            self.cursor_visible = true;
        }
    }

    pub fn render(&self, frame: &mut Frame, input_area: Rect, info_area: Rect) {
        let split = self.byte_index(self.cursor);
        let (before, rest) = self.text.split_at(split);
        let mut rest_chars = rest.chars();
        let at_cursor = rest_chars.next();
        let after = rest_chars.as_str();

        let cursor_style = Style::default().fg(Color::Cyan).bg(Color::Rgb(0, 100, 100));
        let mut spans = vec![Span::from(before)];
        match (at_cursor, self.cursor_visible) {
            (Some(c), true) => spans.push(Span::styled(c.to_string(), cursor_style)),
            (Some(c), false) => spans.push(Span::from(c.to_string())),
            (None, true) => spans.push(Span::styled("█", Style::default().fg(Color::Cyan))),
            (None, false) => {}
        }
        spans.push(Span::from(after));

        let input_paragraph = Paragraph::new(Line::from(spans))
            .block(
                Block::new()
                    .borders(Borders::LEFT)
                    .border_type(BorderType::Thick)
                    .padding(Padding::new(1, 3, 0, 0)),
            )
            .wrap(Wrap { trim: false });

        let input_info = Paragraph::new(vec![
            Line::from(""),
            Line::from(
                Span::from(format!("Sending message as {}", self.username)).bold(),
            ),
            Line::from(""),
        ])
        .block(Block::new().padding(Padding::left(1)));

        frame.render_widget(
            input_paragraph,
            Rect {
                x: input_area.x + 1,
                y: input_area.y,
                width: input_area.width.saturating_sub(1),
                height: input_area.height,
            },
        );
        frame.render_widget(input_info, info_area);
    }

    pub fn calculate_height(&self, available_width: u16) -> u16 {
        let available_width = available_width.max(1);
        let text_width = self.char_count() as u16 + 1;
        let lines_needed = text_width.div_ceil(available_width).max(1);
        lines_needed.max(3)
    }
}
