use super::{
    GeminiError, GeminiResult, GenerativeBackend, MaybeSend, TextStream, boxed_text_stream,
};
use crate::config::Config;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;

// ============================================
// Wire types
// ============================================

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Some("model".to_string()),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Role-less content, as used for system instructions.
    pub fn instruction(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::Text(text.into())],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, skipping thought parts.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let mut text = String::new();
        let mut found = false;
        for part in content.parts.iter().filter(|part| !part.thought) {
            if let Some(piece) = &part.text {
                text.push_str(piece);
                found = true;
            }
        }
        found.then_some(text)
    }

    fn block_reason(&self) -> Option<&str> {
        if !self.candidates.is_empty() {
            return None;
        }
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }

    /// Text of the response, or an error when the prompt was blocked.
    pub fn into_text(self) -> GeminiResult<String> {
        if let Some(reason) = self.block_reason() {
            return Err(GeminiError::Blocked(reason.to_string()));
        }
        Ok(self.text().unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn api_error(status: u16, body: &str) -> GeminiError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string());
    GeminiError::Api { status, message }
}

// ============================================
// REST client
// ============================================

/// Gemini REST client. Cheap to clone.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    fn stream_endpoint(&self, model: &str) -> String {
        format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"))
    }

    async fn post(
        &self,
        url: &str,
        request: &GenerateContentRequest,
        accept: &str,
    ) -> GeminiResult<reqwest::Response> {
        tracing::debug!(%url, "sending Gemini request");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("accept", accept)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }
        Ok(response)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl GenerativeBackend for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> GeminiResult<GenerateContentResponse> {
        let url = self.endpoint(model, "generateContent");
        let response = self.post(&url, request, "application/json").await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(GeminiError::Decode)
    }

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> GeminiResult<TextStream> {
        let url = self.stream_endpoint(model);
        let response = self.post(&url, request, "text/event-stream").await?;
        Ok(sse_text_stream(response.bytes_stream()))
    }
}

// ============================================
// Server-sent events
// ============================================

/// Incremental SSE decoder. Consecutive `data:` lines are joined and a blank
/// line terminates the event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    /// Feeds raw bytes and returns the payloads of every event completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&line[..pos]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            self.feed_line(&line, &mut events);
        }
        events
    }

    /// Flushes an event left open when the body ended without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            let mut ignored = Vec::new();
            self.feed_line(line.trim_end_matches('\r'), &mut ignored);
        }
        self.data.take()
    }

    fn feed_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if let Some(data) = self.data.take() {
                events.push(data);
            }
            return;
        }

        if let Some(rest) = line.strip_prefix("data:") {
            let fragment = rest.strip_prefix(' ').unwrap_or(rest);
            match &mut self.data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(fragment);
                }
                None => self.data = Some(fragment.to_string()),
            }
        }
    }
}

/// Parses one SSE payload into the text fragment it carries (possibly empty).
pub fn parse_stream_event(data: &str) -> GeminiResult<String> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return Ok(String::new());
    }
    serde_json::from_str::<GenerateContentResponse>(trimmed)
        .map_err(GeminiError::Decode)?
        .into_text()
}

struct SseState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<GeminiResult<String>>,
    finished: bool,
}

/// Turns a raw SSE byte stream into non-empty text fragments.
pub fn sse_text_stream<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + MaybeSend + 'static,
    B: AsRef<[u8]> + MaybeSend + 'static,
    E: Into<GeminiError> + MaybeSend + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    let fragments = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for data in state.decoder.push(chunk.as_ref()) {
                        state.pending.push_back(parse_stream_event(&data));
                    }
                }
                Some(Err(err)) => state.pending.push_back(Err(err.into())),
                None => {
                    state.finished = true;
                    if let Some(data) = state.decoder.finish() {
                        state.pending.push_back(parse_stream_event(&data));
                    }
                }
            }
        }
    })
    .try_filter(|piece| futures::future::ready(!piece.is_empty()));
    boxed_text_stream(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decoder_joins_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let events = decoder.push(b"1}\r\n\r\ndata: second\n\n");
        assert_eq!(events, vec![r#"{"a":1}"#.to_string(), "second".to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn decoder_keeps_multibyte_characters_split_across_chunks() {
        let bytes = "data: Extraídos\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["Extraídos".to_string()]);
    }

    #[test]
    fn decoder_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some("tail".to_string()));
    }

    #[test]
    fn parses_stream_event_text() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"}}]}"#;
        assert_eq!(parse_stream_event(data).unwrap(), "Hello");
        assert_eq!(parse_stream_event("").unwrap(), "");
        assert_eq!(parse_stream_event(" [DONE] ").unwrap(), "");
        assert_eq!(
            parse_stream_event(r#"{"candidates":[{"finishReason":"STOP"}]}"#).unwrap(),
            ""
        );
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(matches!(
            parse_stream_event(data),
            Err(GeminiError::Blocked(reason)) if reason == "SAFETY"
        ));
    }

    #[test]
    fn thought_parts_are_not_part_of_the_text() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [
                {"text": "thinking", "thought": true},
                {"text": "[]"}
            ]}}]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("[]"));
    }

    #[test]
    fn api_error_prefers_service_message() {
        let err = api_error(400, r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#);
        assert!(matches!(err, GeminiError::Api { status: 400, ref message } if message == "API key not valid"));

        let err = api_error(502, "Bad Gateway");
        assert!(matches!(err, GeminiError::Api { status: 502, ref message } if message == "Bad Gateway"));
    }

    #[test]
    fn request_serializes_in_wire_format() {
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![
                Part::InlineData(InlineData {
                    mime_type: "image/png".to_string(),
                    data: "AAAA".to_string(),
                }),
                Part::Text("describe".to_string()),
            ])],
            system_instruction: Some(Content::instruction("be brief")),
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: None,
            }),
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"inlineData": {"mimeType": "image/png", "data": "AAAA"}},
                        {"text": "describe"}
                    ]
                }],
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "generationConfig": {"responseMimeType": "application/json"}
            })
        );
    }

    #[tokio::test]
    async fn sse_stream_yields_fragments_in_order() {
        let body = stream::iter(vec![
            Ok::<_, GeminiError>(
                b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n".to_vec(),
            ),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\n\ndata: {\"candidates\":[{\"finishReason\":\"STOP\"}]}\n\n".to_vec()),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" world\"}]}}]}".to_vec()),
        ]);

        let pieces: Vec<String> = sse_text_stream(body).try_collect().await.unwrap();
        assert_eq!(pieces, vec!["Hel", "lo", " world"]);
    }

    #[tokio::test]
    async fn sse_stream_ends_after_transport_error() {
        let body = stream::iter(vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}\n\n".to_vec()),
            Err(GeminiError::EmptyResponse),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"late\"}]}}]}\n\n".to_vec()),
        ]);

        let items: Vec<GeminiResult<String>> = sse_text_stream(body).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    fn client_for(api_base: &str) -> GeminiClient {
        let config = Config::from_lookup(|key| match key {
            "API_KEY" => Some("test-key".to_string()),
            "GEMINI_API_BASE" => Some(api_base.to_string()),
            _ => None,
        })
        .unwrap();
        GeminiClient::new(&config)
    }

    fn hello_request() -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(vec![Part::Text("hi".to_string())])],
            ..Default::default()
        }
    }

    /// Answers a single HTTP request with a canned response and returns the
    /// raw request text, lowercased.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/v1beta", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_lowercase()
        });
        (base, handle)
    }

    #[test]
    fn endpoints_follow_the_rest_layout() {
        let client = client_for("https://example.test/v1beta/");
        assert_eq!(
            client.endpoint("gemini-2.5-flash", "generateContent"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            client.stream_endpoint("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn generate_content_sends_key_header() {
        let (base, server) = serve_once(
            "200 OK",
            "application/json",
            r#"{"candidates":[{"content":{"parts":[{"text":"[]"}]}}]}"#,
        )
        .await;
        let client = client_for(&base);

        let response = client
            .generate_content("gemini-2.5-flash", &hello_request())
            .await
            .unwrap();
        assert_eq!(response.text().as_deref(), Some("[]"));

        let request = server.await.unwrap();
        assert!(request.starts_with("post /v1beta/models/gemini-2.5-flash:generatecontent "));
        assert!(request.contains("x-goog-api-key: test-key"));
        assert!(request.contains(r#""text":"hi""#));
    }

    #[tokio::test]
    async fn error_status_maps_to_api_error() {
        let (base, server) = serve_once(
            "429 Too Many Requests",
            "application/json",
            r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .await;
        let client = client_for(&base);

        let err = client
            .generate_content("gemini-2.5-flash", &hello_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GeminiError::Api { status: 429, ref message } if message == "Resource has been exhausted"
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn streaming_request_decodes_sse_body() {
        let (base, server) = serve_once(
            "200 OK",
            "text/event-stream",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\r\n\r\n",
        )
        .await;
        let client = client_for(&base);

        let stream = client
            .stream_generate_content("gemini-2.5-flash", &hello_request())
            .await
            .unwrap();
        let pieces: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(pieces, vec!["Hel", "lo"]);

        let request = server.await.unwrap();
        assert!(request.starts_with(
            "post /v1beta/models/gemini-2.5-flash:streamgeneratecontent?alt=sse "
        ));
        assert!(request.contains("x-goog-api-key: test-key"));
    }
}
