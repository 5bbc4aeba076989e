//! Server-Sent Events framing.
//!
//! All three vendors deliver their streams as `text/event-stream`.  The
//! [`SseDecoder`] turns arbitrary byte chunks into complete [`SseFrame`]s:
//! it buffers partial lines across chunks, keeps multi-byte UTF-8 sequences
//! that straddle a chunk boundary intact, and dispatches a frame on every
//! blank line.
//!
//! Interpretation of the frame payload is left to the vendor-specific
//! delta accumulators.

/// Upper bound on buffered-but-undispatched input before the stream is
/// considered malformed.
pub const MAX_BUFFERED_BYTES: usize = 16 * 1024 * 1024;

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the last `event:` field, if any.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

impl SseFrame {
    /// Whether this frame is the OpenAI-style `[DONE]` sentinel.
    pub fn is_done_sentinel(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Raw bytes not yet decoded (an incomplete UTF-8 sequence).
    utf8_buf: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    line_buf: String,
    /// `event:` field of the frame being assembled.
    event: Option<String>,
    /// `data:` lines of the frame being assembled.
    data: Vec<String>,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes held back waiting for more input.
    pub fn buffered_len(&self) -> usize {
        self.utf8_buf.len() + self.line_buf.len() + self.data.iter().map(String::len).sum::<usize>()
    }

    /// Feed one chunk of bytes, returning every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.utf8_buf.extend_from_slice(chunk);
        self.decode_utf8();

        let mut frames = Vec::new();
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.feed_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is left once the byte stream has ended.
    ///
    /// A final frame without its terminating blank line is still dispatched.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.utf8_buf.is_empty() {
            let rest = String::from_utf8_lossy(&self.utf8_buf).into_owned();
            self.utf8_buf.clear();
            self.line_buf.push_str(&rest);
        }
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            if let Some(frame) = self.feed_line(line.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    /// Move the longest valid UTF-8 prefix of `utf8_buf` into `line_buf`.
    fn decode_utf8(&mut self) {
        loop {
            match std::str::from_utf8(&self.utf8_buf) {
                Ok(text) => {
                    self.line_buf.push_str(text);
                    self.utf8_buf.clear();
                    return;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    let rest = self.utf8_buf.split_off(valid_up_to);
                    self.line_buf
                        .push_str(&String::from_utf8_lossy(&self.utf8_buf));
                    self.utf8_buf = rest;
                    match e.error_len() {
                        // Truncated sequence at the tail; wait for more bytes.
                        None => return,
                        // Permanently invalid bytes; skip them and keep going.
                        Some(len) => {
                            self.line_buf.push(char::REPLACEMENT_CHARACTER);
                            self.utf8_buf.drain(..len);
                        }
                    }
                }
            }
        }
    }

    fn feed_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            // `id:` and `retry:` carry nothing the accumulators need.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: self.event.take(),
            data,
        })
    }
}
