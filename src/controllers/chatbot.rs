use crate::ai::{ChatSession, GeminiResult};
use crate::types::{ChatMessage, Role};
use futures::StreamExt;

pub const GREETING: &str = "Hello! How can I help you today?";
pub const STREAM_FAILED_MESSAGE: &str =
    "An error occurred while fetching the response. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatStatus {
    Ready,
    Sending,
    ErrorShown,
}

/// A user turn accepted by [`ChatbotController::begin_send`], ready to stream.
pub struct PendingTurn {
    session: ChatSession,
    text: String,
}

impl PendingTurn {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Returns `messages` with its last element replaced.
fn replace_last(messages: &[ChatMessage], replacement: ChatMessage) -> Vec<ChatMessage> {
    let keep = messages.len().saturating_sub(1);
    let mut next = Vec::with_capacity(keep + 1);
    next.extend_from_slice(&messages[..keep]);
    next.push(replacement);
    next
}

fn without_last(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages[..messages.len().saturating_sub(1)].to_vec()
}

/// View state of the chatbot: message history, composer input and the
/// single-send guard.
pub struct ChatbotController {
    session: Option<ChatSession>,
    messages: Vec<ChatMessage>,
    input: String,
    sending: bool,
    error: Option<String>,
}

impl Default for ChatbotController {
    fn default() -> Self {
        Self {
            session: None,
            messages: vec![ChatMessage::model(GREETING)],
            input: String::new(),
            sending: false,
            error: None,
        }
    }
}

impl ChatbotController {
    pub fn new(session: ChatSession) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn status(&self) -> ChatStatus {
        if self.sending {
            ChatStatus::Sending
        } else if self.error.is_some() {
            ChatStatus::ErrorShown
        } else {
            ChatStatus::Ready
        }
    }

    pub fn can_send(&self) -> bool {
        !self.input.trim().is_empty() && self.session.is_some() && !self.sending
    }

    /// Commits the user message plus an empty model placeholder and takes the
    /// send guard. Returns `None` when sending is not allowed right now.
    pub fn begin_send(&mut self) -> Option<PendingTurn> {
        if !self.can_send() {
            return None;
        }
        let session = self.session.clone()?;
        let text = self.input.trim().to_string();

        let mut next = self.messages.clone();
        next.push(ChatMessage::user(text.clone()));
        next.push(ChatMessage::model(String::new()));
        self.messages = next;

        self.input.clear();
        self.error = None;
        self.sending = true;
        Some(PendingTurn { session, text })
    }

    /// Shows the reply received so far in the trailing placeholder.
    pub fn apply_partial(&mut self, text: &str) {
        if !self.sending {
            return;
        }
        if matches!(self.messages.last(), Some(last) if last.role == Role::Model) {
            self.messages = replace_last(&self.messages, ChatMessage::model(text));
        }
    }

    /// Ends the pending turn. On failure the placeholder is dropped while the
    /// user message stays; the send guard is released either way.
    pub fn complete_turn(&mut self, result: GeminiResult<String>) {
        if let Err(err) = result {
            tracing::warn!(error = %err, "chat stream failed");
            if self.sending
                && matches!(self.messages.last(), Some(last) if last.role == Role::Model)
            {
                self.messages = without_last(&self.messages);
            }
            self.error = Some(STREAM_FAILED_MESSAGE.to_string());
        }
        self.sending = false;
    }
}

/// Streams the reply for `turn`, calling `on_text` with the accumulated text
/// after every fragment. Returns the full reply.
pub async fn stream_reply(
    turn: PendingTurn,
    mut on_text: impl FnMut(&str),
) -> GeminiResult<String> {
    let mut stream = turn.session.send_turn(&turn.text);
    let mut reply = String::new();
    while let Some(chunk) = stream.next().await {
        reply.push_str(&chunk?.text);
        on_text(&reply);
    }
    Ok(reply)
}
