use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::llm::LlmProvider;

pub const DEFAULT_CORS_ORIGINS: &[&str] = &["https://sehat-ai-main.vercel.app", "http://localhost:3000"];
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub models_dir: PathBuf,
    pub languages: Vec<String>,
    pub intra_threads: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub llm: LlmConfig,
    pub translation: TranslationConfig,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Read the configuration from the process environment (after `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let provider = match var("LLM_PROVIDER") {
            Some(value) => value.parse::<LlmProvider>().map_err(|e| ConfigError::Invalid {
                name: "LLM_PROVIDER",
                reason: e.to_string(),
            })?,
            None => LlmProvider::Groq,
        };
        let api_key = var(provider.api_key_var()).ok_or(ConfigError::Missing(provider.api_key_var()))?;

        let llm = LlmConfig {
            provider,
            api_key,
            model: var("LLM_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            temperature: parse_or("LLM_TEMPERATURE", var("LLM_TEMPERATURE"), 0.3)?,
            timeout: Duration::from_secs(parse_or("LLM_TIMEOUT_SECS", var("LLM_TIMEOUT_SECS"), 60)?),
        };

        let translation = TranslationConfig {
            models_dir: var("TRANSLATION_MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            languages: var("TRANSLATION_LANGUAGES")
                .map(|value| split_list(&value))
                .unwrap_or_else(|| vec!["hi".to_string()]),
            intra_threads: parse_or("TRANSLATION_THREADS", var("TRANSLATION_THREADS"), 4)?,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", var("PORT"), 5000)?,
            llm,
            translation,
            cors_origins: var("CORS_ALLOWED_ORIGINS")
                .map(|value| split_list(&value))
                .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect()),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", var("MAX_UPLOAD_BYTES"), DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_follow_the_original_deployment() {
        let config = config_from(&[("GROQ_API_KEY", "test-key")]).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.llm.provider, LlmProvider::Groq);
        assert_eq!(config.llm.model, "llama3-70b-8192");
        assert_eq!(config.llm.temperature, 0.3);
        assert_eq!(config.llm.timeout, Duration::from_secs(60));
        assert_eq!(config.translation.languages, vec!["hi"]);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
    }

    #[test]
    fn api_key_of_the_selected_provider_is_required() {
        let err = config_from(&[("LLM_PROVIDER", "openrouter"), ("GROQ_API_KEY", "k")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPENROUTER_API_KEY")));
    }

    #[test]
    fn lists_and_numbers_are_parsed() {
        let config = config_from(&[
            ("GROQ_API_KEY", "k"),
            ("TRANSLATION_LANGUAGES", "hi, mr,,kn "),
            ("CORS_ALLOWED_ORIGINS", "http://a.test"),
            ("LLM_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.translation.languages, vec!["hi", "mr", "kn"]);
        assert_eq!(config.cors_origins, vec!["http://a.test"]);
        assert_eq!(config.llm.timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_numbers_are_reported_by_name() {
        let err = config_from(&[("GROQ_API_KEY", "k"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}
