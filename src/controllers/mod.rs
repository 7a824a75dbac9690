//! View-state machines for the two screens. They hold no rendering code so
//! the concurrency and rollback rules can be driven directly from tests.

pub mod analyzer;
pub mod chatbot;

pub use analyzer::{AnalyzerController, AnalyzerState, InputError, SelectedImage, mime_type_for};
pub use chatbot::{ChatStatus, ChatbotController, PendingTurn, stream_reply};
