use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info};

use crate::api::{ChatMessage, ChatPrompt, ChatRequest, FunctionDefinition};
use crate::core::config::UpstreamSettings;
use crate::core::reframe::{extract_error_summary, OutboundToken, Reframer};

pub type UpstreamBody = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

#[derive(Debug)]
pub enum ChatStreamError {
    /// The upstream could not be reached, or its body broke off mid-stream.
    Transport(Box<dyn StdError + Send + Sync>),
    /// The upstream answered with a non-success status.
    Status { status: u16, summary: String },
}

impl fmt::Display for ChatStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatStreamError::Transport(err) => write!(f, "Upstream request failed: {err}"),
            ChatStreamError::Status { status, summary } => {
                write!(f, "Upstream returned {status}: {summary}")
            }
        }
    }
}

impl StdError for ChatStreamError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ChatStreamError::Transport(err) => Some(err.as_ref()),
            ChatStreamError::Status { .. } => None,
        }
    }
}

/// Summarise an upstream error body for the `{error}` response.
pub fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .unwrap_or_else(|| trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// System prompt first, then the caller's transcript, then the new prompt.
pub fn build_chat_request(
    prompt: ChatPrompt,
    model: &str,
    system_prompt: &str,
    functions: Vec<FunctionDefinition>,
) -> ChatRequest {
    let ChatPrompt {
        prompt,
        conversation_history,
    } = prompt;

    let mut messages = Vec::with_capacity(conversation_history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(conversation_history);
    messages.push(ChatMessage::user(prompt));

    ChatRequest {
        model: model.to_string(),
        messages,
        stream: true,
        functions,
    }
}

/// Send the streaming completion request. Fails before any body is read if
/// the upstream is unreachable or rejects the request.
pub async fn open_upstream(
    client: &reqwest::Client,
    upstream: &UpstreamSettings,
    request: &ChatRequest,
) -> Result<UpstreamBody, ChatStreamError> {
    let url = upstream.completions_url();
    debug!(
        url = %url,
        model = %request.model,
        messages = request.messages.len(),
        "Opening upstream completion stream"
    );

    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", upstream.api_key))
        .json(request)
        .send()
        .await
        .map_err(|err| ChatStreamError::Transport(Box::new(err)))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(ChatStreamError::Status {
            status: status.as_u16(),
            summary: summarize_error_body(&error_text),
        });
    }

    Ok(Box::pin(response.bytes_stream()))
}

/// Client-facing stream of re-framed tokens.
///
/// Each poll pulls at most one upstream chunk; the tokens it yields are handed
/// out one per item before the next chunk is read. Dropping the stream drops
/// the upstream body with it.
pub struct ReframedStream<S> {
    upstream: S,
    reframer: Reframer,
    pending: VecDeque<OutboundToken>,
    scratch: Vec<OutboundToken>,
    done: bool,
}

impl<S> ReframedStream<S> {
    pub fn new(upstream: S) -> Self {
        Self {
            upstream,
            reframer: Reframer::new(),
            pending: VecDeque::new(),
            scratch: Vec::new(),
            done: false,
        }
    }

    fn enqueue_scratch(&mut self) {
        self.pending.extend(self.scratch.drain(..));
    }
}

impl<S, E> Stream for ReframedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: StdError + Send + Sync + 'static,
{
    type Item = Result<Bytes, ChatStreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(token) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(Bytes::from(token.into_text()))));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match this.upstream.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    this.reframer.push_chunk(&chunk, &mut this.scratch);
                    this.enqueue_scratch();
                }
                Poll::Ready(Some(Err(err))) => {
                    this.done = true;
                    this.pending.clear();
                    debug!(error = %err, "Upstream stream failed");
                    return Poll::Ready(Some(Err(ChatStreamError::Transport(Box::new(err)))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    this.reframer.finish(&mut this.scratch);
                    this.enqueue_scratch();
                    let stats = this.reframer.stats();
                    info!(
                        lines = stats.lines,
                        skipped_lines = stats.skipped_lines,
                        tokens = stats.tokens,
                        function_calls = stats.function_calls,
                        "Chat stream completed"
                    );
                }
            }
        }
    }
}

impl<S> Drop for ReframedStream<S> {
    fn drop(&mut self) {
        if !self.done {
            debug!(
                tokens = self.reframer.stats().tokens,
                "Client went away; dropping upstream stream"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatRole;
    use futures_util::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn content_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        stream::iter(parts.into_iter().map(|part| Ok(Bytes::from(part))))
    }

    async fn collect_text<S>(stream: S) -> (Vec<String>, Option<ChatStreamError>)
    where
        S: Stream<Item = Result<Bytes, ChatStreamError>> + Unpin,
    {
        let mut stream = stream;
        let mut items = Vec::new();
        let mut error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => items.push(String::from_utf8(bytes.to_vec()).unwrap()),
                Err(err) => error = Some(err),
            }
        }
        (items, error)
    }

    #[tokio::test]
    async fn reframed_stream_yields_one_token_per_item() {
        let body = content_line("Hi, you") + "data: [DONE]\n\n";
        let (bytes_a, bytes_b) = body.as_bytes().split_at(17);
        let upstream = chunks(vec![bytes_a.to_vec(), bytes_b.to_vec()]);

        let (items, error) = collect_text(ReframedStream::new(upstream)).await;
        assert!(error.is_none());
        assert_eq!(items, vec!["Hi", ",", " ", "you"]);
    }

    #[tokio::test]
    async fn reframed_stream_flushes_open_function_call_at_end() {
        let body = format!(
            "data: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
            json!({"choices": [{"delta": {"function_call": {"name": "get_training_data", "arguments": "{"}}}]}),
            json!({"choices": [{"delta": {"function_call": {"arguments": "}"}}}]}),
        );
        let upstream = chunks(vec![body.into_bytes()]);

        let (items, error) = collect_text(ReframedStream::new(upstream)).await;
        assert!(error.is_none());
        assert_eq!(
            items,
            vec![r#"{"function_call":{"name":"get_training_data","arguments":"{}"}}"#]
        );
    }

    /// Yields one chunk, then stays pending like a slow upstream.
    struct HeldOpenUpstream {
        first: Option<Bytes>,
        dropped: Arc<AtomicBool>,
    }

    impl Stream for HeldOpenUpstream {
        type Item = Result<Bytes, std::io::Error>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            match self.first.take() {
                Some(chunk) => Poll::Ready(Some(Ok(chunk))),
                None => Poll::Pending,
            }
        }
    }

    impl Drop for HeldOpenUpstream {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_upstream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let upstream = HeldOpenUpstream {
            first: Some(Bytes::from(content_line("Hello there"))),
            dropped: Arc::clone(&dropped),
        };

        let mut stream = ReframedStream::new(upstream);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"Hello");
        assert!(!dropped.load(Ordering::SeqCst));

        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream_once() {
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from(content_line("before "))),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            )),
            Ok(Bytes::from(content_line("after"))),
        ];
        let mut stream = ReframedStream::new(stream::iter(parts));

        let mut seen = Vec::new();
        let mut errors = 0;
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => seen.push(String::from_utf8(bytes.to_vec()).unwrap()),
                Err(err) => {
                    errors += 1;
                    assert!(err.to_string().contains("reset by peer"));
                }
            }
        }

        assert_eq!(errors, 1);
        assert_eq!(seen, vec!["before", " "]);
    }

    #[test]
    fn build_chat_request_orders_messages() {
        let prompt: ChatPrompt = serde_json::from_value(json!({
            "prompt": "And your stack?",
            "conversationHistory": [
                {"role": "user", "content": "Who are you?"},
                {"role": "assistant", "content": "A developer."}
            ]
        }))
        .unwrap();

        let request = build_chat_request(prompt, "gpt-test", "be nice", Vec::new());
        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User
            ]
        );
        assert_eq!(request.messages[0].content, "be nice");
        assert_eq!(request.messages[3].content, "And your stack?");
        assert!(request.stream);
        assert_eq!(request.model, "gpt-test");
    }

    #[test]
    fn summarize_error_body_prefers_json_message() {
        assert_eq!(
            summarize_error_body(r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#),
            "Incorrect API key provided"
        );
        assert_eq!(summarize_error_body("  bad   gateway \n"), "bad gateway");
        assert_eq!(summarize_error_body(""), "<empty>");
        assert_eq!(summarize_error_body(r#"{"status":"failed"}"#), r#"{"status":"failed"}"#);
    }

    #[test]
    fn status_errors_render_status_and_summary() {
        let err = ChatStreamError::Status {
            status: 429,
            summary: "Rate limit reached".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream returned 429: Rate limit reached");
    }
}
