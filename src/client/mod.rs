//! The `ApiClient` capability and its implementations.
//!
//! Everything that can answer a completion or chat request implements
//! [`ApiClient`]: the provider adapter that talks HTTP, and the decorators
//! stacked on top of it (`MeteredClient` here, `ResultCache` in `crate::cache`).
//! Callers only ever see the trait, so the chain can be assembled freely:
//!
//! ```text
//! ResultCache -> MeteredClient -> OpenAiCompatibleClient
//! ```
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod credentials;
mod metered;
mod provider;
mod wire;

pub use credentials::{validate_api_key, ApiKey};
pub use metered::MeteredClient;
pub use provider::OpenAiCompatibleClient;

pub use crate::ledger::TokenUsage;

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Document context around the cursor for an inline completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub language: String,
    pub prefix: String,
    pub suffix: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Text to insert at the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// A source of completions and chat responses.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn fetch_completions(&self, request: &CompletionRequest) -> Result<CompletionResult, ApiError>;

    async fn fetch_chat_completion(&self, request: &ChatRequest) -> Result<ChatResult, ApiError>;
}

#[async_trait]
impl<T> ApiClient for Arc<T>
where
    T: ApiClient + ?Sized,
{
    async fn fetch_completions(&self, request: &CompletionRequest) -> Result<CompletionResult, ApiError> {
        (**self).fetch_completions(request).await
    }

    async fn fetch_chat_completion(&self, request: &ChatRequest) -> Result<ChatResult, ApiError> {
        (**self).fetch_chat_completion(request).await
    }
}
