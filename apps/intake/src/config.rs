use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::llm_client::{llamacpp, ollama, BackendKind, GenerationOptions, DEFAULT_TIMEOUT};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub port: u16,
    pub rust_log: String,
}

/// Model backend selection and sampling options.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: BackendKind,
    pub model: String,
    pub ollama_base_url: String,
    pub llamacpp_base_url: String,
    pub options: GenerationOptions,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = GenerationOptions::default();

        let backend = match lookup("LLM_BACKEND") {
            Some(value) => value
                .parse::<BackendKind>()
                .map_err(|e| anyhow!(e))
                .context("LLM_BACKEND is invalid")?,
            None => BackendKind::Ollama,
        };

        let llm = LlmConfig {
            backend,
            model: require(&lookup, "LLM_MODEL")?,
            ollama_base_url: lookup("OLLAMA_BASE_URL")
                .unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string()),
            llamacpp_base_url: lookup("LLAMACPP_BASE_URL")
                .unwrap_or_else(|| llamacpp::DEFAULT_BASE_URL.to_string()),
            options: GenerationOptions {
                temperature: parse_or(&lookup, "LLM_TEMPERATURE", defaults.temperature)?,
                max_tokens: parse_or(&lookup, "LLM_MAX_TOKENS", defaults.max_tokens)?,
                top_p: parse_or(&lookup, "LLM_TOP_P", defaults.top_p)?,
            },
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "LLM_TIMEOUT_SECS",
                DEFAULT_TIMEOUT.as_secs(),
            )?),
        };

        Ok(Config {
            llm,
            port: parse_or(&lookup, "PORT", 8000u16)
                .context("PORT must be a valid port number")?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("'{key}' has an invalid value: {value}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("LLM_MODEL", "qwen3:8b")]).unwrap();
        assert_eq!(config.llm.backend, BackendKind::Ollama);
        assert_eq!(config.llm.model, "qwen3:8b");
        assert_eq!(config.llm.ollama_base_url, "http://localhost:11434");
        assert_eq!(config.llm.llamacpp_base_url, "http://localhost:8080");
        assert_eq!(config.llm.options, GenerationOptions::default());
        assert_eq!(config.llm.timeout, Duration::from_secs(120));
        assert_eq!(config.port, 8000);
        assert_eq!(config.rust_log, "info");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LLM_MODEL", "qwen3-8b.gguf"),
            ("LLM_BACKEND", "llamacpp"),
            ("LLAMACPP_BASE_URL", "http://gpu-box:8081"),
            ("LLM_MAX_TOKENS", "4096"),
            ("LLM_TEMPERATURE", "0.3"),
            ("LLM_TIMEOUT_SECS", "30"),
            ("PORT", "9000"),
        ])
        .unwrap();
        assert_eq!(config.llm.backend, BackendKind::LlamaCpp);
        assert_eq!(config.llm.llamacpp_base_url, "http://gpu-box:8081");
        assert_eq!(config.llm.options.max_tokens, 4096);
        assert!((config.llm.options.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.llm.timeout, Duration::from_secs(30));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_model_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("LLM_MODEL"));
        assert!(config_from(&[("LLM_MODEL", "  ")]).is_err());
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config_from(&[("LLM_MODEL", "m"), ("LLM_BACKEND", "openai")]).is_err());
        assert!(config_from(&[("LLM_MODEL", "m"), ("PORT", "eighty")]).is_err());
        assert!(config_from(&[("LLM_MODEL", "m"), ("LLM_TOP_P", "high")]).is_err());
    }
}
