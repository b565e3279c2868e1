//! Incremental decoder for `text/event-stream` bodies.
//!
//! Only the `data` field matters to the chat protocol: the `data:` lines of
//! one event are joined with `\n` and dispatched on the blank line that ends
//! the event. Comments (`:` lines) and the `event`/`id`/`retry` fields are
//! skipped.

/// Accumulates raw body chunks and yields complete event payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: Option<String>,
    skip_lf: bool,
}

impl SseDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk; returns the payloads of every event it completed.
    ///
    /// Chunks may split lines, CRLF pairs and multi-byte characters anywhere.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.end_line(&mut events);
                    self.skip_lf = true;
                }
                _ => self.line.push(byte),
            }
        }
        events
    }

    /// Flush at end of body: a trailing event without its blank line is still
    /// dispatched.
    pub fn finish(&mut self) -> Option<String> {
        if !self.line.is_empty() {
            // A non-empty line only ever buffers data, it never dispatches.
            self.end_line(&mut Vec::new());
        }
        self.skip_lf = false;
        self.data.take()
    }

    fn end_line(&mut self, events: &mut Vec<String>) {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            if let Some(payload) = self.data.take() {
                events.push(payload);
            }
            return;
        }
        if line[0] == b':' {
            return;
        }

        let text = String::from_utf8_lossy(&line);
        let (field, value) = match text.find(':') {
            Some(idx) => {
                let rest = &text[idx + 1..];
                (&text[..idx], rest.strip_prefix(' ').unwrap_or(rest))
            }
            None => (text.as_ref(), ""),
        };

        if field == "data" {
            match &mut self.data {
                Some(buffer) => {
                    buffer.push('\n');
                    buffer.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
    }
}
