use std::env;
use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API_KEY environment variable not set")]
    MissingApiKey,
}

/// Transport and credential settings, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub extraction_model: String,
    pub chat_model: String,
    pub export_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = non_blank("API_KEY")
            .or_else(|| non_blank("GEMINI_API_KEY"))
            .ok_or(ConfigError::MissingApiKey)?;

        let api_base = non_blank("GEMINI_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let extraction_model =
            non_blank("APPPHOTO_EXTRACTION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let chat_model = non_blank("APPPHOTO_CHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let export_dir = non_blank("APPPHOTO_EXPORT_DIR")
            .map(PathBuf::from)
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            api_key: api_key.trim().to_string(),
            api_base,
            extraction_model,
            chat_model,
            export_dir,
        })
    }
}
