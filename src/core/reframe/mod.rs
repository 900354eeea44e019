//! Re-framing of streamed chat completions.
//!
//! The upstream API streams `data: <json>` lines whose deltas carry either
//! text fragments or pieces of a function call. [`Reframer`] turns those lines
//! into [`OutboundToken`]s: words are held until a non-word character ends
//! them, every other character goes out on its own, and a function call is
//! only emitted once it has been fully assembled.
//!
//! The reframer is synchronous and owns no I/O, so it can be driven from an
//! HTTP body stream, a captured transcript, or a test vector alike.

use memchr::memchr;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{ChatResponse, ChatResponseChoice};

/// A buffered word is flushed once it grows past this many characters.
pub const WORD_FLUSH_THRESHOLD: usize = 20;

/// `finish_reason` the upstream sends when a function call is complete.
pub const FUNCTION_CALL_FINISH_REASON: &str = "function_call";

/// A line still without a newline past this many bytes is dropped whole.
pub const MAX_LINE_BYTES: usize = 1 << 20;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCall {
    pub name: Option<String>,
    pub arguments: String,
}

#[derive(Serialize)]
struct FunctionCallEnvelope<'a> {
    function_call: &'a FunctionCall,
}

impl FunctionCall {
    /// Client-facing form: `{"function_call":{"name":...,"arguments":...}}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&FunctionCallEnvelope {
            function_call: self,
        })
        .unwrap_or_else(|_| String::from("{\"function_call\":null}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundToken {
    /// A run of `[A-Za-z0-9']`.
    Word(String),
    /// Any single character outside the word class.
    Symbol(char),
    FunctionCall(FunctionCall),
}

impl OutboundToken {
    pub fn into_text(self) -> String {
        match self {
            OutboundToken::Word(word) => word,
            OutboundToken::Symbol(ch) => ch.to_string(),
            OutboundToken::FunctionCall(call) => call.to_json(),
        }
    }
}

#[derive(Debug, Default)]
enum FunctionCallState {
    #[default]
    Idle,
    Accumulating(FunctionCall),
}

impl FunctionCallState {
    fn accumulate(&mut self, name: Option<String>, arguments: Option<String>) {
        if let FunctionCallState::Idle = self {
            *self = FunctionCallState::Accumulating(FunctionCall {
                name: None,
                arguments: String::new(),
            });
        }
        if let FunctionCallState::Accumulating(call) = self {
            if name.is_some() {
                call.name = name;
            }
            if let Some(arguments) = arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    fn take(&mut self) -> Option<FunctionCall> {
        match std::mem::take(self) {
            FunctionCallState::Idle => None,
            FunctionCallState::Accumulating(call) => Some(call),
        }
    }
}

/// Per-stream counters, logged when a stream completes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReframeStats {
    pub lines: u64,
    pub skipped_lines: u64,
    pub tokens: u64,
    pub function_calls: u64,
}

pub fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '\''
}

#[derive(Debug, Default)]
pub struct Reframer {
    line_buffer: Vec<u8>,
    discarding_line: bool,
    word: String,
    function_call: FunctionCallState,
    stats: ReframeStats,
}

impl Reframer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ReframeStats {
        self.stats
    }

    pub fn has_open_function_call(&self) -> bool {
        matches!(self.function_call, FunctionCallState::Accumulating(_))
    }

    /// Feed raw upstream bytes. Lines split across chunks are held until
    /// their newline arrives, up to [`MAX_LINE_BYTES`].
    pub fn push_chunk(&mut self, chunk: &[u8], out: &mut Vec<OutboundToken>) {
        let mut chunk = chunk;
        if self.discarding_line {
            match memchr(b'\n', chunk) {
                Some(newline_pos) => {
                    self.discarding_line = false;
                    chunk = &chunk[newline_pos + 1..];
                }
                None => return,
            }
        }
        self.line_buffer.extend_from_slice(chunk);

        while let Some(newline_pos) = memchr(b'\n', &self.line_buffer) {
            let line: Vec<u8> = self.line_buffer.drain(..=newline_pos).collect();
            self.push_raw_line(&line[..newline_pos], out);
        }

        if self.line_buffer.len() > MAX_LINE_BYTES {
            self.stats.lines += 1;
            self.stats.skipped_lines += 1;
            warn!(
                buffered = self.line_buffer.len(),
                "Dropping oversized SSE line"
            );
            self.line_buffer = Vec::new();
            self.discarding_line = true;
        }
    }

    /// Process one complete SSE line.
    pub fn push_line(&mut self, line: &str, out: &mut Vec<OutboundToken>) {
        self.stats.lines += 1;

        let Some(payload) = line.trim().strip_prefix("data:").map(str::trim_start) else {
            return;
        };
        if payload.is_empty() || payload == DONE_SENTINEL {
            return;
        }

        let response = match serde_json::from_str::<ChatResponse>(payload) {
            Ok(response) => response,
            Err(err) => {
                self.stats.skipped_lines += 1;
                debug!(error = %err, payload_len = payload.len(), "Skipping malformed SSE payload");
                return;
            }
        };

        if let Some(error) = &response.error {
            let summary = extract_error_summary(error).unwrap_or_else(|| "<unknown>".to_string());
            warn!(summary = %summary, "Upstream reported an error mid-stream");
        }

        if let Some(choice) = response.choices.into_iter().next() {
            self.apply_choice(choice, out);
        }
    }

    /// End of stream: drain the partial line, the word buffer and any open
    /// function call, in that order.
    pub fn finish(&mut self, out: &mut Vec<OutboundToken>) {
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            self.push_raw_line(&line, out);
        }
        self.flush_word(out);
        if let Some(call) = self.function_call.take() {
            debug!("Flushing function call left open at end of stream");
            self.emit(OutboundToken::FunctionCall(call), out);
        }
    }

    fn push_raw_line(&mut self, line: &[u8], out: &mut Vec<OutboundToken>) {
        match std::str::from_utf8(line) {
            Ok(text) => self.push_line(text, out),
            Err(err) => {
                self.stats.lines += 1;
                self.stats.skipped_lines += 1;
                debug!(error = %err, "Skipping SSE line with invalid UTF-8");
            }
        }
    }

    fn apply_choice(&mut self, choice: ChatResponseChoice, out: &mut Vec<OutboundToken>) {
        let ChatResponseChoice {
            delta,
            finish_reason,
        } = choice;

        if let Some(fragment) = delta.function_call {
            self.function_call.accumulate(fragment.name, fragment.arguments);
        } else if let Some(content) = delta.content {
            self.push_content(&content, out);
        }

        if finish_reason.as_deref() == Some(FUNCTION_CALL_FINISH_REASON) {
            self.flush_word(out);
            if let Some(call) = self.function_call.take() {
                self.emit(OutboundToken::FunctionCall(call), out);
            }
        }
    }

    fn push_content(&mut self, content: &str, out: &mut Vec<OutboundToken>) {
        for ch in content.chars() {
            if is_word_char(ch) {
                self.word.push(ch);
                if self.word.len() > WORD_FLUSH_THRESHOLD {
                    self.flush_word(out);
                }
            } else {
                self.flush_word(out);
                self.emit(OutboundToken::Symbol(ch), out);
            }
        }
    }

    fn flush_word(&mut self, out: &mut Vec<OutboundToken>) {
        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            self.emit(OutboundToken::Word(word), out);
        }
    }

    fn emit(&mut self, token: OutboundToken, out: &mut Vec<OutboundToken>) {
        self.stats.tokens += 1;
        if matches!(token, OutboundToken::FunctionCall(_)) {
            self.stats.function_calls += 1;
        }
        out.push(token);
    }
}

/// Pull a human-readable message out of an OpenAI-style error object.
pub fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| value.as_str().map(str::to_owned));

    summary
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}
