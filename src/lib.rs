//! AppPhoto: document analysis and chat on top of the Gemini API, rendered
//! with Dioxus.

pub mod ai;
pub mod config;
pub mod controllers;
pub mod export;
pub mod services;
pub mod types;
pub mod ui;
pub mod views;
