//! Local provider (Ollama-compatible HTTP endpoint).

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

pub struct OllamaProvider {
    host: String,
    model: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(host: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");
        Self { host: host.trim_end_matches('/').to_string(), model, client }
    }

    async fn complete(&self, prompt: String, options: &CallOptions) -> AiResult<String> {
        let body = serde_json::json!({
            "model": &self.model,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
            "messages": [
                { "role": "system", "content": JSON_SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Unreachable(format!("ollama returned {status}")));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;
        value["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::Malformed("ollama reply missing message content".to_string()))
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn id(&self) -> &'static str {
        "ollama"
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
        let probe = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        match probe {
            Ok(r) if r.status().is_success() => ProviderHealth::Ok,
            Ok(_) => ProviderHealth::Degraded,
            Err(_) => ProviderHealth::Down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_trailing_slash_trimmed() {
        let provider = OllamaProvider::new("http://localhost:11434/".to_string(), "m".to_string());
        assert_eq!(provider.host, "http://localhost:11434");
    }
}
