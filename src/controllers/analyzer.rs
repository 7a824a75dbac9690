use crate::ai::GeminiResult;
use crate::export::{ExportError, RecordExporter, flatten_records};
use crate::types::ExtractedRecord;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::Path;
use std::sync::Arc;

pub const INVALID_FILE_MESSAGE: &str = "Please upload a valid image file.";
pub const NO_FILE_MESSAGE: &str = "Please select an image first.";
pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze the image. The AI model might be unable to process this document. Please try another one.";
pub const EXPORT_FAILED_MESSAGE: &str = "Could not export the extracted data. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("{file_name} is not an image ({mime_type})")]
    NotAnImage { file_name: String, mime_type: String },

    #[error("an analysis is already running")]
    Busy,
}

/// Guesses an image MIME type from a file name, for pickers that do not
/// report one.
pub fn mime_type_for(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" | "jfif" | "pjpeg" | "pjp" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    };
    Some(mime)
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectedImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
}

impl SelectedImage {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: Arc::new(bytes),
        }
    }

    /// Inline `data:` URL for previews.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(self.bytes.as_slice()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnalyzerState {
    Idle,
    FileSelected,
    Analyzing,
    Succeeded(Vec<ExtractedRecord>),
    Failed(String),
}

/// View state of the document analyzer.
pub struct AnalyzerController {
    selected: Option<SelectedImage>,
    state: AnalyzerState,
    notice: Option<String>,
    exporter: Arc<dyn RecordExporter>,
}

impl AnalyzerController {
    pub fn new(exporter: Arc<dyn RecordExporter>) -> Self {
        Self {
            selected: None,
            state: AnalyzerState::Idle,
            notice: None,
            exporter,
        }
    }

    pub fn state(&self) -> &AnalyzerState {
        &self.state
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        self.selected.as_ref()
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self.state, AnalyzerState::Analyzing)
    }

    pub fn records(&self) -> Option<&[ExtractedRecord]> {
        match &self.state {
            AnalyzerState::Succeeded(records) => Some(records.as_slice()),
            _ => None,
        }
    }

    /// Message for the error banner, if any.
    pub fn error(&self) -> Option<&str> {
        if let Some(notice) = &self.notice {
            return Some(notice.as_str());
        }
        match &self.state {
            AnalyzerState::Failed(message) => Some(message.as_str()),
            _ => None,
        }
    }

    /// Accepts a new image, discarding any previous result. Non-image files
    /// only raise the inline notice and leave the state alone.
    pub fn select_file(&mut self, image: SelectedImage) -> Result<(), InputError> {
        if self.is_analyzing() {
            return Err(InputError::Busy);
        }
        if !image.mime_type.starts_with("image/") {
            self.notice = Some(INVALID_FILE_MESSAGE.to_string());
            return Err(InputError::NotAnImage {
                file_name: image.file_name,
                mime_type: image.mime_type,
            });
        }

        tracing::debug!(file = %image.file_name, bytes = image.bytes.len(), "image selected");
        self.selected = Some(image);
        self.state = AnalyzerState::FileSelected;
        self.notice = None;
        Ok(())
    }

    /// Enters `Analyzing` and hands out the image to send. Returns `None` when
    /// no file is selected or an analysis is already in flight.
    pub fn begin_analysis(&mut self) -> Option<SelectedImage> {
        if self.is_analyzing() {
            return None;
        }
        let Some(image) = self.selected.clone() else {
            self.notice = Some(NO_FILE_MESSAGE.to_string());
            return None;
        };
        self.state = AnalyzerState::Analyzing;
        self.notice = None;
        Some(image)
    }

    pub fn complete_analysis(&mut self, result: GeminiResult<Vec<ExtractedRecord>>) {
        if !self.is_analyzing() {
            return;
        }
        self.state = match result {
            Ok(records) => AnalyzerState::Succeeded(records),
            Err(err) => {
                tracing::warn!(error = %err, "document analysis failed");
                AnalyzerState::Failed(ANALYSIS_FAILED_MESSAGE.to_string())
            }
        };
    }

    /// Hands the current result to the exporter. Returns the number of rows
    /// exported; nothing happens without a non-empty result.
    pub fn export(&mut self) -> Result<usize, ExportError> {
        let rows = match self.records() {
            Some(records) if !records.is_empty() => flatten_records(records),
            _ => return Ok(0),
        };
        match self.exporter.export_records(&rows) {
            Ok(()) => {
                self.notice = None;
                Ok(rows.len())
            }
            Err(err) => {
                tracing::warn!(error = %err, "spreadsheet export failed");
                self.notice = Some(EXPORT_FAILED_MESSAGE.to_string());
                Err(err)
            }
        }
    }
}
