use crate::config::AppConfig;
use crate::error::{GrantScopeError, Result};
use async_trait::async_trait;
use polars::prelude::*;
use tracing::{debug, warn};

const SYSTEM_MESSAGE: &str =
    "You are a data analyst answering questions about a tabular grant dataset. Base every answer on the table provided.";

/// Answers natural-language prompts against a table.
///
/// `Ok(None)` means the engine replied with nothing usable; transport and API
/// failures are errors.
#[async_trait]
pub trait TabularQueryEngine: Send + Sync {
    async fn query(&self, table: &DataFrame, prompt: &str) -> Result<Option<String>>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    sample_rows: usize,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("sample_rows", &self.sample_rows)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let defaults = AppConfig::default();
        Self {
            api_key,
            base_url,
            model,
            temperature: defaults.temperature,
            sample_rows: defaults.sample_rows,
        }
    }

    pub fn from_config(api_key: String, config: &AppConfig) -> Self {
        Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            sample_rows: config.sample_rows,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_llm(&self, prompt: &str) -> Result<Option<String>> {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_MESSAGE},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
        });

        debug!("Calling {} with a {}-byte prompt", self.model, prompt.len());

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GrantScopeError::Engine(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GrantScopeError::Engine(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GrantScopeError::Engine(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

#[async_trait]
impl TabularQueryEngine for LlmClient {
    async fn query(&self, table: &DataFrame, prompt: &str) -> Result<Option<String>> {
        let rendered = render_table(table, self.sample_rows)?;
        let full_prompt = format!("{}\n\nTable:\n{}", prompt, rendered);
        self.call_llm(&full_prompt).await
    }
}

/// Pulls the first choice's message content out of a chat-completions body.
pub(crate) fn extract_content(response_json: &serde_json::Value) -> Result<Option<String>> {
    if let Some(error) = response_json.get("error") {
        return Err(GrantScopeError::Engine(format!("LLM API error: {}", error)));
    }

    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| GrantScopeError::Engine("No choices array in LLM response".to_string()))?;

    let Some(first) = choices.first() else {
        warn!("LLM response had no choices");
        return Ok(None);
    };

    if let Some(finish_reason) = first.get("finish_reason").and_then(|r| r.as_str()) {
        if finish_reason == "length" {
            warn!("LLM response was truncated due to length limit");
        } else if finish_reason == "content_filter" {
            return Err(GrantScopeError::Engine(
                "LLM response was filtered by content policy".to_string(),
            ));
        }
    }

    Ok(first["message"]["content"]
        .as_str()
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string))
}

/// Schema line followed by the first `rows` rows as CSV.
pub fn render_table(table: &DataFrame, rows: usize) -> Result<String> {
    let schema = table
        .get_columns()
        .iter()
        .map(|s| format!("{} ({})", s.name(), s.dtype()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut head = table.head(Some(rows));
    let mut buffer: Vec<u8> = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut head)?;
    let csv = String::from_utf8(buffer)
        .map_err(|e| GrantScopeError::Engine(format!("Table rendering produced invalid UTF-8: {}", e)))?;

    Ok(format!(
        "{} rows in total; columns: {}\nFirst {} rows:\n{}",
        table.height(),
        schema,
        head.height(),
        csv
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_content() {
        let body = json!({"choices": [{"message": {"content": "  Answer  "}, "finish_reason": "stop"}]});
        assert_eq!(extract_content(&body).unwrap().as_deref(), Some("Answer"));
    }

    #[test]
    fn test_empty_content_is_none() {
        let blank = json!({"choices": [{"message": {"content": ""}}]});
        assert_eq!(extract_content(&blank).unwrap(), None);
        let null = json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(extract_content(&null).unwrap(), None);
        let no_choices = json!({"choices": []});
        assert_eq!(extract_content(&no_choices).unwrap(), None);
    }

    #[test]
    fn test_api_error_is_engine_error() {
        let body = json!({"error": {"message": "invalid key"}});
        assert!(matches!(extract_content(&body), Err(GrantScopeError::Engine(_))));
    }

    #[test]
    fn test_render_table_limits_rows() {
        let df = df!["Funder Name" => ["A", "B", "C"], "Amount Usd" => [1.0, 2.0, 3.0]].unwrap();
        let rendered = render_table(&df, 2).unwrap();
        assert!(rendered.starts_with("3 rows in total; columns: Funder Name (str), Amount Usd (f64)"));
        assert!(rendered.contains("First 2 rows:"));
        assert!(rendered.contains("Funder Name,Amount Usd"));
        assert!(!rendered.contains("C,3"));
    }

    #[test]
    fn test_from_config_trims_base_url() {
        let config = AppConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..AppConfig::default()
        };
        let client = LlmClient::from_config("sk".to_string(), &config);
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(client.model(), "gpt-4o");
    }
}
