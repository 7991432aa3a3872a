//! Personalized email content generation.
//!
//! This crate provides:
//! - [`build_prompt`]: per-lead prompt construction
//! - [`ContentModel`]: the model seam, with [`GeminiClient`] as the shipped implementation
//! - [`clean_response`]: fence stripping and HTML validation

pub mod cleanup;
pub mod gemini;
pub mod model;
pub mod prompt;

pub use cleanup::clean_response;
pub use gemini::GeminiClient;
pub use model::ContentModel;
pub use prompt::{PromptInput, build_prompt};
