use super::{
    Content, GeminiResult, GenerateContentRequest, GenerativeBackend, Part, TextStream,
    boxed_text_stream,
};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

pub const CHAT_SYSTEM_INSTRUCTION: &str =
    "You are a friendly and helpful AI assistant. Answer questions clearly and concisely.";

/// Locks the shared history. A panic elsewhere while holding the lock leaves
/// the turns already pushed intact, so the poisoned guard is taken over.
fn lock_history(history: &Mutex<Vec<Content>>) -> MutexGuard<'_, Vec<Content>> {
    history.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("chat history lock was poisoned; recovering");
        PoisonError::into_inner(poisoned)
    })
}

/// One incremental piece of a streamed model reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
}

/// A conversation with the chat model. History is tracked client-side and
/// replayed with every turn; clones share the same history.
#[derive(Clone)]
pub struct ChatSession {
    backend: Arc<dyn GenerativeBackend>,
    model: String,
    system_instruction: String,
    history: Arc<Mutex<Vec<Content>>>,
}

impl ChatSession {
    /// Creates an empty session. No network I/O happens here.
    pub fn new(backend: Arc<dyn GenerativeBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            system_instruction: CHAT_SYSTEM_INSTRUCTION.to_string(),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of committed turns (user and model contents).
    pub fn history_len(&self) -> usize {
        lock_history(&self.history).len()
    }

    fn request_for(&self, user_text: &str) -> GenerateContentRequest {
        let mut contents = lock_history(&self.history).clone();
        contents.push(Content::user(vec![Part::Text(user_text.to_string())]));
        GenerateContentRequest {
            contents,
            system_instruction: Some(Content::instruction(&self.system_instruction)),
            generation_config: None,
        }
    }

    /// Sends one user turn. The request is issued when the returned stream is
    /// first polled; fragments are yielded in the order they are generated.
    pub fn send_turn(&self, user_text: &str) -> TurnStream {
        let backend = Arc::clone(&self.backend);
        let model = self.model.clone();
        let request = self.request_for(user_text);

        let inner = boxed_text_stream(
            stream::once(async move { backend.stream_generate_content(&model, &request).await })
                .try_flatten(),
        );

        TurnStream {
            inner,
            user_text: user_text.to_string(),
            reply: String::new(),
            history: Arc::clone(&self.history),
            finished: false,
        }
    }
}

/// Single-pass stream of a model reply. Once it completes successfully the
/// exchange is appended to the session history; a failed turn leaves the
/// history untouched.
pub struct TurnStream {
    inner: TextStream,
    user_text: String,
    reply: String,
    history: Arc<Mutex<Vec<Content>>>,
    finished: bool,
}

impl TurnStream {
    fn commit(&mut self) {
        let mut history = lock_history(&self.history);
        history.push(Content::user(vec![Part::Text(std::mem::take(
            &mut self.user_text,
        ))]));
        history.push(Content::model(std::mem::take(&mut self.reply)));
    }
}

impl Stream for TurnStream {
    type Item = GeminiResult<TextChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(text))) => {
                self.reply.push_str(&text);
                Poll::Ready(Some(Ok(TextChunk { text })))
            }
            Poll::Ready(Some(Err(err))) => {
                self.finished = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                self.commit();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{GeminiError, GenerateContentResponse};
    use async_trait::async_trait;

    /// Replays a fixed list of fragments and records every request.
    struct ScriptedBackend {
        fragments: Vec<&'static str>,
        fail_after: Option<usize>,
        requests: Mutex<Vec<GenerateContentRequest>>,
    }

    impl ScriptedBackend {
        fn new(fragments: Vec<&'static str>, fail_after: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                fragments,
                fail_after,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[cfg_attr(not(target_arch = "wasm32"), async_trait)]
    #[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
    impl GenerativeBackend for ScriptedBackend {
        async fn generate_content(
            &self,
            _model: &str,
            _request: &GenerateContentRequest,
        ) -> GeminiResult<GenerateContentResponse> {
            unreachable!("chat never issues single-shot requests")
        }

        async fn stream_generate_content(
            &self,
            _model: &str,
            request: &GenerateContentRequest,
        ) -> GeminiResult<TextStream> {
            self.requests.lock().unwrap().push(request.clone());
            let mut items: Vec<GeminiResult<String>> =
                self.fragments.iter().map(|f| Ok(f.to_string())).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(GeminiError::Api {
                    status: 503,
                    message: "overloaded".to_string(),
                }));
            }
            Ok(boxed_text_stream(stream::iter(items)))
        }
    }

    #[tokio::test]
    async fn session_starts_empty_without_network() {
        let backend = ScriptedBackend::new(vec![], None);
        let session = ChatSession::new(backend.clone(), "gemini-2.5-flash");
        assert_eq!(session.history_len(), 0);
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn turn_is_lazy_and_ordered() {
        let backend = ScriptedBackend::new(vec!["Hel", "lo", " world"], None);
        let session = ChatSession::new(backend.clone(), "gemini-2.5-flash");

        let mut turn = session.send_turn("hi");
        assert!(backend.requests.lock().unwrap().is_empty());

        let mut text = String::new();
        while let Some(chunk) = turn.next().await {
            text.push_str(&chunk.unwrap().text);
        }
        assert_eq!(text, "Hello world");
        assert_eq!(session.history_len(), 2);

        let request = &backend.requests.lock().unwrap()[0];
        assert_eq!(
            request.system_instruction,
            Some(Content::instruction(CHAT_SYSTEM_INSTRUCTION))
        );
        assert_eq!(request.contents.len(), 1);
    }

    #[tokio::test]
    async fn later_turns_replay_history() {
        let backend = ScriptedBackend::new(vec!["ok"], None);
        let session = ChatSession::new(backend.clone(), "gemini-2.5-flash");

        let _: Vec<_> = session.send_turn("first").collect().await;
        let _: Vec<_> = session.send_turn("second").collect().await;

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[1].contents.len(), 3);
        assert_eq!(requests[1].contents[1], Content::model("ok"));
    }

    #[tokio::test]
    async fn failed_turn_ends_stream_and_keeps_history() {
        let backend = ScriptedBackend::new(vec!["par", "tial"], Some(1));
        let session = ChatSession::new(backend, "gemini-2.5-flash");

        let items: Vec<_> = session.send_turn("hi").collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
        assert_eq!(session.history_len(), 0);
    }

    #[tokio::test]
    async fn poisoned_history_keeps_its_turns() {
        let backend = ScriptedBackend::new(vec!["ok"], None);
        let session = ChatSession::new(backend.clone(), "gemini-2.5-flash");
        let _: Vec<_> = session.send_turn("first").collect().await;

        let history = Arc::clone(&session.history);
        let _ = std::thread::spawn(move || {
            let _guard = history.lock().unwrap();
            panic!("worker died while holding the history");
        })
        .join();
        assert!(session.history.is_poisoned());

        assert_eq!(session.history_len(), 2);
        let _: Vec<_> = session.send_turn("second").collect().await;
        assert_eq!(session.history_len(), 4);
        assert_eq!(backend.requests.lock().unwrap()[1].contents.len(), 3);
    }
}
