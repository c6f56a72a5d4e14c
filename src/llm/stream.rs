//! Streaming reply reassembly
//!
//! The gateway streams `data: {json}` lines. [`LineReader`] turns arbitrary
//! byte chunks into complete lines and is independent of the transport, so
//! any chunk split can be fed in tests. [`StreamReassembler`] parses each
//! line and runs its body through the translator with one [`ThoughtState`]
//! for the whole stream.

use serde_json::Value;

use super::signature::{SessionState, SignatureFamily};
use super::translator::{translate, ThoughtState};
use super::types::{StreamEvent, TokenUsage};
use super::wire::error_message;

const DATA_MARKER: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Splits a byte stream into lines, holding back the incomplete tail
#[derive(Debug, Default)]
pub struct LineReader {
    pending: Vec<u8>,
    done: bool,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line, or `None` until more bytes arrive
    ///
    /// After [`finish`](Self::finish), the unterminated tail is returned as
    /// a final line.
    pub fn next_line(&mut self) -> Option<String> {
        let line_bytes = match self.pending.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
                line.pop();
                line
            }
            None if self.done && !self.pending.is_empty() => std::mem::take(&mut self.pending),
            None => return None,
        };

        let mut line = String::from_utf8_lossy(&line_bytes).into_owned();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Mark the end of input
    pub fn finish(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// What a single protocol line carried
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Body(Value),
    Error(String),
}

/// Parse one line; `None` for lines that carry nothing usable
pub fn parse_event_line(line: &str) -> Option<LineEvent> {
    let payload = line.trim_start().strip_prefix(DATA_MARKER)?.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }

    let wrapper: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("[Stream] skipping malformed line: {}", e);
            return None;
        }
    };

    if let Some(body) = wrapper.get("response") {
        return Some(LineEvent::Body(body.clone()));
    }
    if let Some(message) = error_message(&wrapper) {
        return Some(LineEvent::Error(message));
    }
    // Some dialects send the body unwrapped
    if wrapper.get("candidates").is_some() {
        return Some(LineEvent::Body(wrapper));
    }
    None
}

/// Turns raw stream chunks into ordered caller events
#[derive(Debug)]
pub struct StreamReassembler {
    reader: LineReader,
    thoughts: ThoughtState,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

impl StreamReassembler {
    /// Reassembler for a stream issued by `family`
    pub fn new(family: SignatureFamily) -> Self {
        Self {
            reader: LineReader::new(),
            thoughts: ThoughtState::new(family),
            finish_reason: None,
            usage: None,
        }
    }

    /// Feed one chunk and return the events of every line it completed
    pub fn feed(&mut self, chunk: &[u8], session: &mut SessionState) -> Vec<StreamEvent> {
        self.reader.push(chunk);
        self.drain(session)
    }

    /// Flush the unterminated tail, if any
    pub fn finish(&mut self, session: &mut SessionState) -> Vec<StreamEvent> {
        self.reader.finish();
        self.drain(session)
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }

    fn drain(&mut self, session: &mut SessionState) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(line) = self.reader.next_line() {
            match parse_event_line(&line) {
                Some(LineEvent::Body(body)) => match translate(&body, &mut self.thoughts, session) {
                    Ok(chunk) => {
                        if chunk.finish_reason.is_some() {
                            self.finish_reason = chunk.finish_reason;
                        }
                        if chunk.usage.is_some() {
                            self.usage = chunk.usage;
                        }
                        events.extend(chunk.parts.into_iter().map(StreamEvent::from));
                    }
                    Err(e) => events.push(StreamEvent::Error {
                        message: e.to_string(),
                    }),
                },
                Some(LineEvent::Error(message)) => events.push(StreamEvent::Error { message }),
                None => {}
            }
        }
        events
    }
}
