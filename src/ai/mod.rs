/// AI module for AppPhoto
///
/// Both flows talk to a single hosted Gemini model family through the
/// [`GenerativeBackend`] seam, so controllers and tests never depend on the
/// HTTP transport directly.
///
/// # Architecture
///
/// - `gemini` - Wire types, REST client and server-sent-event decoding
/// - `extraction` - Schema-constrained document extraction
/// - `chat` - Stateful streaming chat sessions
///
/// # Usage
///
/// ```rust,no_run
/// use appphoto::ai::{ExtractionClient, GeminiClient};
/// use appphoto::config::Config;
/// use std::sync::Arc;
///
/// # async fn example(image: Vec<u8>) -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let backend = Arc::new(GeminiClient::new(&config));
/// let client = ExtractionClient::new(backend, config.extraction_model.clone());
/// let people = client.analyze_document(&image, "image/jpeg").await?;
/// # Ok(())
/// # }
/// ```
mod chat;
mod extraction;
mod gemini;

use async_trait::async_trait;
use futures::Stream;
use futures::stream::StreamExt;

pub use chat::{CHAT_SYSTEM_INSTRUCTION, ChatSession, TextChunk, TurnStream};
pub use extraction::{
    EXTRACTION_PROMPT, ExtractionClient, REQUIRED_FIELDS, document_schema, inline_image_part,
    parse_records,
};
pub use gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    InlineData, Part, SseDecoder, parse_stream_event, sse_text_stream,
};

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not decode Gemini response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Could not parse AI response.")]
    MalformedOutput(#[source] serde_json::Error),

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("response contained no text")]
    EmptyResponse,
}

pub type GeminiResult<T> = Result<T, GeminiError>;

/// `Send` on native targets. Browser futures and streams are bound to the
/// JS thread, so the bound is dropped on wasm32.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + ?Sized> MaybeSend for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSend for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSync: Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Sync + ?Sized> MaybeSync for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSync {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSync for T {}

/// Incremental text fragments of one streamed response, in generation order.
#[cfg(not(target_arch = "wasm32"))]
pub type TextStream = futures::stream::BoxStream<'static, GeminiResult<String>>;
#[cfg(target_arch = "wasm32")]
pub type TextStream = futures::stream::LocalBoxStream<'static, GeminiResult<String>>;

/// Boxes a fragment stream into a [`TextStream`] for the current target.
pub fn boxed_text_stream<S>(stream: S) -> TextStream
where
    S: Stream<Item = GeminiResult<String>> + MaybeSend + 'static,
{
    #[cfg(not(target_arch = "wasm32"))]
    {
        stream.boxed()
    }
    #[cfg(target_arch = "wasm32")]
    {
        stream.boxed_local()
    }
}

/// Transport to a generative model endpoint.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait GenerativeBackend: MaybeSend + MaybeSync {
    /// Single-shot generation.
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> GeminiResult<GenerateContentResponse>;

    /// Streaming generation. The returned stream ends when the service
    /// closes the response, or right after yielding its first error.
    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> GeminiResult<TextStream>;
}
