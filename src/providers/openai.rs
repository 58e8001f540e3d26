use async_trait::async_trait;
use serde_json::Value;

use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};

use crate::error::{CreatorPilotError, Result};
use crate::interfaces::providers::{
    ChatMessage, ChatRole, Completion, CompletionRequest, LlmProvider, ProviderKind,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat completions client. Request bodies are built with the async-openai
/// types and sent once; the router owns fallback.
#[derive(Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            http: super::http_client(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    async fn chat_completion(&self, request: &CreateChatCompletionRequest) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("Chat completion transport failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("Chat completion read failed: {e}")))?;
        if !status.is_success() {
            return Err(super::status_error(ProviderKind::OpenAi, status, &body));
        }
        serde_json::from_str(&body).map_err(|e| {
            CreatorPilotError::Serialization(format!("Chat completion decode failed: {e}"))
        })
    }

    fn build_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let built = match message.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map(ChatCompletionRequestMessage::System),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Text(
                    message.content.clone(),
                ))
                .build()
                .map(ChatCompletionRequestMessage::User),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map(ChatCompletionRequestMessage::Assistant),
        };
        built.map_err(|e| CreatorPilotError::Runtime(e.to_string()))
    }

    fn build_request(request: &CompletionRequest) -> Result<CreateChatCompletionRequest> {
        let messages = request
            .messages
            .iter()
            .map(Self::build_message)
            .collect::<Result<Vec<_>>>()?;

        CreateChatCompletionRequestArgs::default()
            .model(request.model.clone())
            .messages(messages)
            .max_completion_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
            .map_err(|e| CreatorPilotError::Runtime(e.to_string()))
    }

    fn completion_from_value(response: &Value, requested_model: &str) -> Result<Completion> {
        let content = response
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|text| text.to_string())
            .ok_or_else(|| CreatorPilotError::Provider("Empty chat response".to_string()))?;
        let usage = response.get("usage");
        let token_count = |field: &str| {
            usage
                .and_then(|usage| usage.get(field))
                .and_then(|value| value.as_u64())
                .unwrap_or(0) as u32
        };
        Ok(Completion {
            content,
            model: response
                .get("model")
                .and_then(|value| value.as_str())
                .unwrap_or(requested_model)
                .to_string(),
            input_tokens: token_count("prompt_tokens"),
            output_tokens: token_count("completion_tokens"),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let chat_request = Self::build_request(request)?;
        let raw = self.chat_completion(&chat_request).await?;
        Self::completion_from_value(&raw, &request.model)
    }
}
