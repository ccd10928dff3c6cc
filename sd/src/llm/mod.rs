//! LLM transport for sessiond
//!
//! The execution loop depends only on the [`LlmClient`] trait; the Anthropic
//! Messages implementation is the production transport.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, StreamChunk,
    TokenUsage, ToolCall, ToolDefinition,
};

use crate::config::LlmConfig;

/// Create an LLM client from configuration
///
/// Only the "anthropic" provider is supported; the provider field exists so
/// a config written for a future provider fails loudly instead of silently.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_config(config)?)),
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown LLM provider: '{}'. Supported: anthropic",
            other
        ))),
    }
}
