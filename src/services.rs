use crate::ai::{ChatSession, ExtractionClient, GeminiClient, GenerativeBackend};
use crate::config::Config;
use crate::export::{RecordExporter, XlsxExporter};
use std::sync::Arc;

/// Shared, read-only collaborators handed to the views through context.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<Config>,
    pub backend: Arc<dyn GenerativeBackend>,
    pub exporter: Arc<dyn RecordExporter>,
}

impl AppServices {
    pub fn from_config(config: Config) -> Self {
        let backend: Arc<dyn GenerativeBackend> = Arc::new(GeminiClient::new(&config));
        let exporter: Arc<dyn RecordExporter> = Arc::new(XlsxExporter::new(&config.export_dir));
        Self::new(config, backend, exporter)
    }

    pub fn new(
        config: Config,
        backend: Arc<dyn GenerativeBackend>,
        exporter: Arc<dyn RecordExporter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            exporter,
        }
    }

    pub fn extraction_client(&self) -> ExtractionClient {
        ExtractionClient::new(Arc::clone(&self.backend), self.config.extraction_model.clone())
    }

    /// A fresh chat session; each mounted chatbot owns its own.
    pub fn create_chat_session(&self) -> ChatSession {
        ChatSession::new(Arc::clone(&self.backend), self.config.chat_model.clone())
    }
}
