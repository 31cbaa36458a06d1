//! Generative text service boundary.
//!
//! Every model call in the crate goes through [`TextGenerator`]: one system
//! prompt, one user prompt, bounded output, low temperature. The model is
//! asked for JSON but nothing guarantees it, so replies go through
//! [`extract_json`] which never fails and tags its result instead.

mod client;
mod json;
pub mod prompts;

pub use client::{AuthScheme, ChatClient};
pub use json::{JsonExtraction, extract_json};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Failed to initialize generation client: {0}")]
    Init(String),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// One system + user prompt pair with output bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl PromptRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 800,
            temperature: 0.1,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Blocking text generation. Implementations must be shareable across workers.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &PromptRequest) -> LlmResult<String>;

    fn model_name(&self) -> &str;
}
