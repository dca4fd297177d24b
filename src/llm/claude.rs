//! Anthropic (Claude) provider.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::catalog::ContentKind;

use super::types::{
    categorize_prompt, characters_prompt, identify_prompt, JSON_SYSTEM_PROMPT,
};
use super::{
    parse_json_payload, AiError, AiProvider, AiResult, CallOptions, CategoryVerdict,
    CharacterPass, CharacterSet, IdentifyOutcome, ProviderHealth,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub struct ClaudeProvider {
    api_key: String,
    model: String,
    client: Client,
}

impl ClaudeProvider {
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
            return Err(AiError::Unauthorized("ANTHROPIC_API_KEY not set".to_string()));
        }

        let body = serde_json::json!({
            "model": &self.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "system": JSON_SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AiError::Unauthorized(format!("anthropic returned {status}")));
        }
        if !status.is_success() {
            return Err(AiError::Unreachable(format!("anthropic returned {status}")));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;
        value["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::Malformed("anthropic reply missing content text".to_string()))
    }
}

pub(super) fn classify_transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl AiProvider for ClaudeProvider {
    fn id(&self) -> &'static str {
        "claude"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let provider = ClaudeProvider::new(String::new());
        let err = provider
            .identify("text", ContentKind::Novel, &CallOptions::identify())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "provider_unauthorized");
        assert_eq!(provider.health().await, ProviderHealth::Degraded);
    }
}
