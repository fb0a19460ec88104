use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use memchr::memchr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{Content, GenerateContentRequest, GenerateContentResponse, InlineData, Part};
use crate::core::app::{AppAction, AppActionDispatcher};
use crate::core::message::{ImageAttachment, Message};
use crate::utils::url::construct_api_url;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One item of a response stream. A stream yields any number of chunks and
/// ends either by running out or right after a single `Error`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
}

pub type FragmentStream = BoxStream<'static, StreamMessage>;

/// Everything the remote API needs for one turn.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub model_id: String,
    /// Committed messages preceding the new prompt.
    pub history: Vec<Message>,
    pub prompt: String,
    pub image: Option<ImageAttachment>,
}

/// Source of response fragments. Each call performs exactly one request and
/// returns a lazy stream that is consumed once.
pub trait CompletionBackend: Send + Sync {
    fn stream_chat(&self, request: CompletionRequest) -> FragmentStream;
}

pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Reads the credential from `GEMINI_API_KEY`, falling back to `API_KEY`.
    pub fn api_key_from_env() -> Option<String> {
        ["GEMINI_API_KEY", "API_KEY"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

impl CompletionBackend for GeminiBackend {
    fn stream_chat(&self, request: CompletionRequest) -> FragmentStream {
        let Some(api_key) = self.api_key.clone() else {
            return error_stream(format_api_error(
                "No API key configured. Set GEMINI_API_KEY and restart.",
            ));
        };

        let url = construct_api_url(
            &self.base_url,
            &format!("models/{}:streamGenerateContent?alt=sse", request.model_id),
        );
        let body = build_request(&request);
        let client = self.client.clone();

        let opened = async move {
            debug!(%url, "opening response stream");
            let response = client
                .post(url)
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    let body = response
                        .bytes_stream()
                        .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|e| e.to_string()))
                        .boxed();
                    sse_fragments(body)
                }
                Ok(response) => {
                    let status = response.status();
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<no body>".to_string());
                    warn!(%status, "completion request rejected");
                    error_stream(format_api_error(&error_text))
                }
                Err(e) => error_stream(format_api_error(&e.to_string())),
            }
        };

        stream::once(opened).flatten().boxed()
    }
}

pub(crate) fn build_request(request: &CompletionRequest) -> GenerateContentRequest {
    // Gemini rejects turns with empty text; a reply that produced no
    // fragments stays in the transcript but is not replayed.
    let mut contents: Vec<Content> = request
        .history
        .iter()
        .filter(|message| !message.content.is_empty())
        .map(|message| Content {
            role: message.role.as_str().to_string(),
            parts: vec![Part::Text {
                text: message.content.clone(),
            }],
        })
        .collect();

    let mut parts = Vec::with_capacity(2);
    if let Some(image) = &request.image {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.base64.clone(),
            },
        });
    }
    parts.push(Part::Text {
        text: request.prompt.clone(),
    });
    contents.push(Content {
        role: "user".to_string(),
        parts,
    });

    GenerateContentRequest { contents }
}

fn error_stream(detail: String) -> FragmentStream {
    stream::iter([StreamMessage::Error(detail)]).boxed()
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(payload: &str) -> Option<StreamMessage> {
    if payload.trim().is_empty() {
        return None;
    }

    let value = match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => value,
        Err(_) => return Some(StreamMessage::Error(format_api_error(payload))),
    };

    if value.get("error").is_some() {
        return Some(StreamMessage::Error(format_api_error(payload)));
    }

    match serde_json::from_value::<GenerateContentResponse>(value) {
        Ok(response) => response.text().map(StreamMessage::Chunk),
        Err(_) => Some(StreamMessage::Error(format_api_error(payload))),
    }
}

fn process_sse_line(line: &str) -> Option<StreamMessage> {
    extract_data_payload(line).and_then(handle_data_payload)
}

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>, String>>,
    buffer: Vec<u8>,
    ready: VecDeque<StreamMessage>,
    finished: bool,
}

impl SseState {
    fn push(&mut self, message: StreamMessage) {
        if self.finished {
            return;
        }
        if matches!(message, StreamMessage::Error(_)) {
            self.finished = true;
        }
        self.ready.push_back(message);
    }

    fn drain_complete_lines(&mut self) {
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.handle_line(&line[..newline_pos]);
            if self.finished {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        match std::str::from_utf8(line) {
            Ok(line) => {
                if let Some(message) = process_sse_line(line.trim()) {
                    self.push(message);
                }
            }
            Err(e) => {
                warn!("Invalid UTF-8 in stream: {e}");
                self.push(StreamMessage::Error(format_api_error(&format!(
                    "Invalid UTF-8 in stream: {e}"
                ))));
            }
        }
    }

    fn flush_remaining(&mut self) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&line);
        }
        self.finished = true;
    }
}

/// Turns a raw SSE body into fragments, preserving source order.
fn sse_fragments(body: BoxStream<'static, Result<Vec<u8>, String>>) -> FragmentStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(message) = state.ready.pop_front() {
                return Some((message, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.drain_complete_lines();
                }
                Some(Err(e)) => state.push(StreamMessage::Error(format_api_error(&e))),
                None => state.flush_remaining(),
            }
        }
    })
    .boxed()
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .map(|message| {
            match value.pointer("/error/status").and_then(|v| v.as_str()) {
                Some(status) if !status.is_empty() => format!("{status}: {message}"),
                _ => message,
            }
        })
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
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Formats a raw error body for the log. The transcript only ever shows the
/// fixed notice; this text is what tells the user why.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error: <empty>".to_string();
    }

    // Error bodies sometimes arrive as a one-element JSON array.
    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let value = match &json_value {
            serde_json::Value::Array(items) if items.len() == 1 => &items[0],
            other => other,
        };
        if let Some(summary) = extract_error_summary(value) {
            if !summary.is_empty() {
                return format!("API Error: {summary}");
            }
        }
        return format!("API Error: {}", value);
    }

    format!("API Error: {}", trimmed)
}

pub struct StreamParams {
    pub session_id: String,
    pub stream_id: u64,
    pub request: CompletionRequest,
}

/// Pulls fragments for one stream and funnels them, in order, into the
/// action channel.
pub async fn run_stream(
    backend: Arc<dyn CompletionBackend>,
    params: StreamParams,
    dispatcher: AppActionDispatcher,
) {
    let StreamParams {
        session_id,
        stream_id,
        request,
    } = params;

    let mut fragments = backend.stream_chat(request);
    while let Some(message) = fragments.next().await {
        match message {
            StreamMessage::Chunk(content) => dispatcher.dispatch(AppAction::AppendResponseChunk {
                session_id: session_id.clone(),
                stream_id,
                content,
            }),
            StreamMessage::Error(detail) => {
                dispatcher.dispatch(AppAction::StreamErrored {
                    session_id,
                    stream_id,
                    detail,
                });
                return;
            }
        }
    }

    dispatcher.dispatch(AppAction::StreamCompleted {
        session_id,
        stream_id,
    });
}

#[derive(Clone)]
pub struct ChatStreamService {
    backend: Arc<dyn CompletionBackend>,
    dispatcher: AppActionDispatcher,
    shutdown: CancellationToken,
}

impl ChatStreamService {
    pub fn new(backend: Arc<dyn CompletionBackend>, dispatcher: AppActionDispatcher) -> Self {
        Self {
            backend,
            dispatcher,
            shutdown: CancellationToken::new(),
        }
    }

    /// Runs the stream in the background. It keeps writing into its own
    /// session even when another session is being displayed.
    pub fn spawn_stream(&self, params: StreamParams) -> tokio::task::JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let dispatcher = self.dispatcher.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = run_stream(backend, params, dispatcher) => {}
                _ = shutdown.cancelled() => {}
            }
        })
    }

    /// Stops every outstanding stream task. Only used when the client exits.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app::AppActionDispatcher;
    use crate::core::message::Role;

    fn body_from(chunks: &[&str]) -> BoxStream<'static, Result<Vec<u8>, String>> {
        let owned: Vec<Result<Vec<u8>, String>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        stream::iter(owned).boxed()
    }

    fn chunk_line(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"{text}\"}}],\"role\":\"model\"}}}}]}}\r\n\r\n"
        )
    }

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let variants = [
            r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#,
            r#"data:{"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#,
        ];
        for line in variants {
            assert_eq!(
                process_sse_line(line),
                Some(StreamMessage::Chunk("Hello".into()))
            );
        }
        assert_eq!(process_sse_line(""), None);
        assert_eq!(process_sse_line(": keep-alive"), None);
        assert_eq!(process_sse_line("data: "), None);
    }

    #[test]
    fn process_sse_line_routes_stream_errors() {
        let line = r#"data: {"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            process_sse_line(line),
            Some(StreamMessage::Error(
                "API Error: RESOURCE_EXHAUSTED: Resource has been exhausted".into()
            ))
        );
    }

    #[test]
    fn format_api_error_summarizes_json_arrays() {
        let raw = r#"[{"error":{"code":400,"message":"API key not valid.  Please pass a valid API key.","status":"INVALID_ARGUMENT"}}]"#;
        assert_eq!(
            format_api_error(raw),
            "API Error: INVALID_ARGUMENT: API key not valid. Please pass a valid API key."
        );
    }

    #[test]
    fn format_api_error_handles_json_without_summary() {
        assert_eq!(
            format_api_error(r#"{"status":"failed"}"#),
            r#"API Error: {"status":"failed"}"#
        );
    }

    #[test]
    fn format_api_error_handles_plaintext_and_empty() {
        assert_eq!(format_api_error("  api failure \n"), "API Error: api failure");
        assert_eq!(format_api_error("   "), "API Error: <empty>");
    }

    #[test]
    fn build_request_puts_image_before_prompt() {
        let request = CompletionRequest {
            model_id: "gemini-flash-latest".into(),
            history: vec![Message::user("Hello", None), Message::model("Hi!")],
            prompt: "What is this?".into(),
            image: Some(ImageAttachment {
                base64: "iVBOR".into(),
                mime_type: "image/png".into(),
            }),
        };
        let body = serde_json::to_value(build_request(&request)).expect("serialize");
        let contents = body["contents"].as_array().expect("contents");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], Role::User.as_str());
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "Hi!");
        assert_eq!(contents[2]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(contents[2]["parts"][1]["text"], "What is this?");
    }

    #[test]
    fn build_request_skips_empty_replies_in_history() {
        let request = CompletionRequest {
            model_id: "gemini-flash-latest".into(),
            history: vec![
                Message::user("Hello", None),
                Message::model(""),
                Message::user("Anyone there?", None),
                Message::model("Yes."),
            ],
            prompt: "Good.".into(),
            image: None,
        };
        let body = serde_json::to_value(build_request(&request)).expect("serialize");
        let contents = body["contents"].as_array().expect("contents");
        let texts: Vec<&str> = contents
            .iter()
            .map(|content| content["parts"][0]["text"].as_str().expect("text"))
            .collect();
        assert_eq!(texts, vec!["Hello", "Anyone there?", "Yes.", "Good."]);
    }

    #[tokio::test]
    async fn sse_fragments_report_invalid_utf8() {
        let ok = chunk_line("Hi");
        let body: BoxStream<'static, Result<Vec<u8>, String>> = stream::iter(vec![
            Ok(ok.into_bytes()),
            Ok(vec![b'd', b'a', b't', b'a', b':', 0xff, 0xfe, b'\n']),
        ])
        .boxed();

        let fragments: Vec<StreamMessage> = sse_fragments(body).collect().await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], StreamMessage::Chunk("Hi".into()));
        match &fragments[1] {
            StreamMessage::Error(detail) => assert!(detail.contains("Invalid UTF-8")),
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sse_fragments_reassemble_lines_split_across_chunks() {
        let first = chunk_line("Hi");
        let second = chunk_line(" there");
        let (head, tail) = second.split_at(17);
        let body = body_from(&[first.as_str(), head, tail, "data: {\"candidates\":[]}\n"]);

        let fragments: Vec<StreamMessage> = sse_fragments(body).collect().await;
        assert_eq!(
            fragments,
            vec![
                StreamMessage::Chunk("Hi".into()),
                StreamMessage::Chunk(" there".into()),
            ]
        );
    }

    #[tokio::test]
    async fn sse_fragments_stop_after_first_error() {
        let ok = chunk_line("partial");
        let ignored = chunk_line("ignored");
        let body = body_from(&[
            ok.as_str(),
            "data: {\"error\":{\"message\":\"boom\"}}\n",
            ignored.as_str(),
        ]);

        let fragments: Vec<StreamMessage> = sse_fragments(body).collect().await;
        assert_eq!(
            fragments,
            vec![
                StreamMessage::Chunk("partial".into()),
                StreamMessage::Error("API Error: boom".into()),
            ]
        );
    }

    #[tokio::test]
    async fn sse_fragments_surface_transport_errors_once() {
        let body: BoxStream<'static, Result<Vec<u8>, String>> = stream::iter(vec![
            Ok(chunk_line("a").into_bytes()),
            Err("connection reset".to_string()),
            Err("still broken".to_string()),
        ])
        .boxed();

        let fragments: Vec<StreamMessage> = sse_fragments(body).collect().await;
        assert_eq!(
            fragments,
            vec![
                StreamMessage::Chunk("a".into()),
                StreamMessage::Error("API Error: connection reset".into()),
            ]
        );
    }

    #[tokio::test]
    async fn sse_fragments_flush_unterminated_last_line() {
        let line = chunk_line("tail");
        let body = body_from(&[line.trim_end()]);
        let fragments: Vec<StreamMessage> = sse_fragments(body).collect().await;
        assert_eq!(fragments, vec![StreamMessage::Chunk("tail".into())]);
    }

    #[tokio::test]
    async fn missing_api_key_yields_single_error() {
        let backend = GeminiBackend::new(
            reqwest::Client::new(),
            DEFAULT_GEMINI_BASE_URL.to_string(),
            None,
        );
        let request = CompletionRequest {
            model_id: "gemini-flash-latest".into(),
            history: Vec::new(),
            prompt: "Hello".into(),
            image: None,
        };
        let fragments: Vec<StreamMessage> = backend.stream_chat(request).collect().await;
        assert_eq!(fragments.len(), 1);
        assert!(matches!(&fragments[0], StreamMessage::Error(detail) if detail.contains("GEMINI_API_KEY")));
    }

    struct Scripted(Vec<StreamMessage>);

    impl CompletionBackend for Scripted {
        fn stream_chat(&self, _request: CompletionRequest) -> FragmentStream {
            stream::iter(self.0.clone()).boxed()
        }
    }

    #[tokio::test]
    async fn run_stream_dispatches_chunks_then_completion() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let dispatcher = AppActionDispatcher::new(tx);
        let backend: Arc<dyn CompletionBackend> = Arc::new(Scripted(vec![
            StreamMessage::Chunk("Hi".into()),
            StreamMessage::Chunk("!".into()),
        ]));
        let params = StreamParams {
            session_id: "s".into(),
            stream_id: 7,
            request: CompletionRequest {
                model_id: "m".into(),
                history: Vec::new(),
                prompt: "Hello".into(),
                image: None,
            },
        };

        run_stream(backend, params, dispatcher).await;

        let mut received = Vec::new();
        while let Ok(action) = rx.try_recv() {
            received.push(action);
        }
        assert_eq!(received.len(), 3);
        assert!(matches!(
            &received[0],
            AppAction::AppendResponseChunk { content, stream_id: 7, .. } if content == "Hi"
        ));
        assert!(matches!(
            &received[1],
            AppAction::AppendResponseChunk { content, .. } if content == "!"
        ));
        assert!(matches!(
            &received[2],
            AppAction::StreamCompleted { session_id, stream_id: 7 } if session_id == "s"
        ));
    }

    #[tokio::test]
    async fn run_stream_stops_on_error() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let dispatcher = AppActionDispatcher::new(tx);
        let backend: Arc<dyn CompletionBackend> = Arc::new(Scripted(vec![StreamMessage::Error(
            "API Error: quota".into(),
        )]));
        let params = StreamParams {
            session_id: "s".into(),
            stream_id: 1,
            request: CompletionRequest {
                model_id: "m".into(),
                history: Vec::new(),
                prompt: "Hello".into(),
                image: None,
            },
        };

        run_stream(backend, params, dispatcher).await;

        let first = rx.try_recv().expect("error action");
        assert!(matches!(first, AppAction::StreamErrored { detail, .. } if detail == "API Error: quota"));
        assert!(rx.try_recv().is_err());
    }
}
