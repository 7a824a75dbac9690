use anyhow::Context;
use appphoto::config::Config;
use appphoto::services::AppServices;

/// Bundled config for builds without a .env file (web, mobile)
const BUNDLED_CONFIG: &str = include_str!("../assets/config.env");

#[cfg(not(target_arch = "wasm32"))]
fn load_dotenv() {
    // First try to load from .env file (desktop dev)
    if dotenvy::dotenv().is_ok() {
        return;
    }

    load_bundled_config();
}

#[cfg(target_arch = "wasm32")]
fn load_dotenv() {
    load_bundled_config();
}

fn load_bundled_config() {
    for line in BUNDLED_CONFIG.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            // Only set if not already set (allow env override)
            if std::env::var(key).is_err() {
                // SAFETY: We're setting env vars at startup before any threads are spawned
                unsafe {
                    std::env::set_var(key, value);
                }
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn init_tracing() {
    // The Dioxus logger may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

#[cfg(target_arch = "wasm32")]
fn init_tracing() {}

fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    let config = Config::from_env().context("refusing to start without Gemini credentials")?;
    tracing::info!(
        extraction_model = %config.extraction_model,
        chat_model = %config.chat_model,
        "starting AppPhoto"
    );

    dioxus::LaunchBuilder::new()
        .with_context(AppServices::from_config(config))
        .launch(appphoto::ui::App);
    Ok(())
}
