//! Server-Sent Events decoding.
//!
//! Used for streamed chat completions and for MCP servers that answer a
//! POST with `text/event-stream`. Chunks may split lines anywhere, so bytes
//! are buffered until a full line is available.

use std::fmt;

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// The OpenAI end-of-stream marker.
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }
}

/// Incremental SSE decoder.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a whole body at once, including a trailing event with no
    /// terminating blank line.
    pub fn parse_all(body: &str) -> Vec<SseEvent> {
        let mut parser = Self::new();
        let mut events = parser.feed_str(body);
        events.extend(parser.finish());
        events
    }

    /// Feed raw bytes, returning every event completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        self.drain_lines()
    }

    pub fn feed_str(&mut self, text: &str) -> Vec<SseEvent> {
        self.buffer.push_str(text);
        self.drain_lines()
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.apply_line(line.trim_end_matches('\r'));
        }
        self.take_event()
    }

    fn drain_lines(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                events.extend(self.take_event());
            } else {
                self.apply_line(line);
            }
        }

        events
    }

    fn apply_line(&mut self, line: &str) {
        // Comment lines start with ':'
        let Some((field, value)) = split_field(line) else {
            return;
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            self.id = None;
            return None;
        }

        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        })
    }
}

fn split_field(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(':') {
        return None;
    }
    match line.split_once(':') {
        Some((field, value)) => Some((field, value.strip_prefix(' ').unwrap_or(value))),
        None => Some((line, "")),
    }
}

impl fmt::Debug for SseParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseParser")
            .field("buffered", &self.buffer.len())
            .field("pending_data_lines", &self.data.len())
            .finish()
    }
}
