//! OpenAI provider.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::catalog::ContentKind;

use super::claude::classify_transport_error;
use super::types::{
    categorize_prompt, characters_prompt, identify_prompt, JSON_SYSTEM_PROMPT,
};
use super::{
    parse_json_payload, AiError, AiProvider, AiResult, CallOptions, CategoryVerdict,
    CharacterPass, CharacterSet, IdentifyOutcome, ProviderHealth,
};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");
        Self { api_key: api_key.trim().to_string(), model, client }
    }

    fn has_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(&self, prompt: String, options: &CallOptions) -> AiResult<String> {
        if !self.has_key() {
            return Err(AiError::Unauthorized("OPENAI_API_KEY not set".to_string()));
        }

        let body = serde_json::json!({
            "model": &self.model,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": JSON_SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AiError::Unauthorized(format!("openai returned {status}")));
        }
        if !status.is_success() {
            return Err(AiError::Unreachable(format!("openai returned {status}")));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::Malformed("openai reply missing message content".to_string()))
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn id(&self) -> &'static str {
        "openai"
    }

    async fn identify(
        &self,
        text: &str,
        kind: ContentKind,
        options: &CallOptions,
    ) -> AiResult<IdentifyOutcome> {
        let reply = self.complete(identify_prompt(text, kind), options).await?;
        IdentifyOutcome::from_value(parse_json_payload(&reply)?, kind)
    }

    async fn categorize(
        &self,
        section_text: &str,
        allowed_categories: &[String],
        options: &CallOptions,
    ) -> AiResult<CategoryVerdict> {
        let reply = self
            .complete(categorize_prompt(section_text, allowed_categories), options)
            .await?;
        CategoryVerdict::from_value(parse_json_payload(&reply)?, allowed_categories)
    }

    async fn extract_characters(
        &self,
        novel_text: &str,
        pass: CharacterPass,
        prior: Option<&CharacterSet>,
        options: &CallOptions,
    ) -> AiResult<CharacterSet> {
        let reply = self
            .complete(characters_prompt(novel_text, pass, prior), options)
            .await?;
        CharacterSet::from_value(parse_json_payload(&reply)?)
    }

    async fn health(&self) -> ProviderHealth {
        if self.has_key() {
            ProviderHealth::Ok
        } else {
            ProviderHealth::Degraded
        }
    }
}
