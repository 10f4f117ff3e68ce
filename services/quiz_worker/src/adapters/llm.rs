//! services/quiz_worker/src/adapters/llm.rs
//!
//! This module contains the adapter for the chat-completion LLM.
//! It implements the `LanguageModelService` port from the `core` crate and
//! routes each call to the model configured for its role.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use quiz_engine_core::ports::{
    ChatMessage, ChatRole, CompletionOptions, LanguageModelService, ModelRole, PortError, PortResult,
};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Concrete model names per pipeline role.
#[derive(Debug, Clone)]
pub struct ModelRouting {
    pub analysis: String,
    pub drafting: String,
    pub validation: String,
}

impl ModelRouting {
    pub fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Analysis => &self.analysis,
            ModelRole::Drafting => &self.drafting,
            ModelRole::Validation => &self.validation,
        }
    }
}

/// An adapter that implements `LanguageModelService` using an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiLlmAdapter {
    client: Client<OpenAIConfig>,
    models: ModelRouting,
}

impl OpenAiLlmAdapter {
    /// Creates a new `OpenAiLlmAdapter`.
    pub fn new(client: Client<OpenAIConfig>, models: ModelRouting) -> Self {
        Self { client, models }
    }
}

fn to_request_message(message: &ChatMessage) -> PortResult<ChatCompletionRequestMessage> {
    let content = message.content.clone();
    let built = match message.role {
        ChatRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ),
        ChatRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ),
        ChatRole::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ),
    };
    Ok(built)
}

//=========================================================================================
// `LanguageModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LanguageModelService for OpenAiLlmAdapter {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> PortResult<String> {
        let model = self.models.model_for(options.role);
        let request_messages = messages
            .iter()
            .map(to_request_message)
            .collect::<PortResult<Vec<_>>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(model)
            .messages(request_messages)
            .temperature(options.temperature)
            .n(1);
        if let Some(max_tokens) = options.max_tokens {
            builder.max_tokens(max_tokens);
        }
        if options.json_mode {
            builder.response_format(ResponseFormat::JsonObject);
        }
        let request = builder.build().map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(model, messages = messages.len(), "Sending chat completion request");

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Provider(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Provider(format!("Model {model} returned no text content.")))
    }
}
