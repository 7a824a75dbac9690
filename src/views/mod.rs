pub mod analyzer;
pub mod chat;
pub mod shared;

pub use analyzer::AnalyzerView;
pub use chat::ChatView;
