use crate::error::{GrantScopeError, Result};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_SAMPLE_ROWS: usize = 50;

/// Runtime settings, read from the environment (and `.env`) with CLI overrides
/// applied by the binary.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    /// Rows of the table embedded in each model prompt.
    pub sample_rows: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let temperature = match lookup("GRANTSCOPE_TEMPERATURE") {
            Some(raw) => raw.trim().parse::<f32>().map_err(|e| {
                GrantScopeError::Config(format!("GRANTSCOPE_TEMPERATURE '{}': {}", raw, e))
            })?,
            None => defaults.temperature,
        };

        let sample_rows = match lookup("GRANTSCOPE_SAMPLE_ROWS") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                GrantScopeError::Config(format!("GRANTSCOPE_SAMPLE_ROWS '{}': {}", raw, e))
            })?,
            None => defaults.sample_rows,
        };

        Ok(Self {
            api_key: lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty()),
            model: lookup("OPENAI_MODEL").unwrap_or(defaults.model),
            base_url: lookup("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            temperature,
            sample_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("GRANTSCOPE_SAMPLE_ROWS", "10"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.sample_rows, 10);
    }

    #[test]
    fn test_bad_temperature() {
        let err = AppConfig::from_lookup(lookup_from(&[("GRANTSCOPE_TEMPERATURE", "hot")])).unwrap_err();
        assert!(matches!(err, GrantScopeError::Config(_)));
    }
}
