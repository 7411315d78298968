//! LLM integration.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! The natural-language capabilities the orchestrator consumes (intent
//! classification, body generation) live behind the [`Language`] trait in
//! [`language`]; this module only provides the raw text-completion
//! provider they are built on.

pub mod language;

pub use language::{IntentAssessment, Language, LanguageCapability};

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use secrecy::ExposeSecret;

use crate::error::CollaboratorError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Minimal text-completion interface over a chat model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CollaboratorError>;

    fn model_name(&self) -> &str;
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, CollaboratorError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, CollaboratorError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            CollaboratorError::Http {
                service: "anthropic".to_string(),
                reason: format!("failed to create client: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigModel::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, CollaboratorError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            CollaboratorError::Http {
                service: "openai".to_string(),
                reason: format!("failed to create client: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigModel::new(model, &config.model)))
}

/// Bridges a rig `CompletionModel` to [`LlmProvider`].
pub struct RigModel<M> {
    model: M,
    model_name: String,
}

impl<M> RigModel<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigModel<M>
where
    M: CompletionModel + Send + Sync,
{
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CollaboratorError> {
        let request = self
            .model
            .completion_request(rig::message::Message::user(prompt))
            .preamble(system.to_string())
            .build();

        let response =
            self.model
                .completion(request)
                .await
                .map_err(|e| CollaboratorError::Http {
                    service: self.model_name.clone(),
                    reason: e.to_string(),
                })?;

        let text: String = response
            .choice
            .iter()
            .filter_map(|content| match content {
                rig::message::AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(CollaboratorError::InvalidResponse {
                service: self.model_name.clone(),
                reason: "empty completion".to_string(),
            });
        }

        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
