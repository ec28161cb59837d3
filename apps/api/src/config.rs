use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::RetryPolicy;

const DEFAULT_MODEL_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Start-up fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub model_api_url: String,
    pub model_api_key: String,
    pub model: String,
    pub model_max_attempts: u32,
    pub model_timeout: Duration,
    pub max_upload_bytes: usize,
    pub session_idle_ttl: Duration,
    pub prompt_template_path: Option<PathBuf>,
    pub metric_catalog_path: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let model_max_attempts = or_default("MODEL_MAX_ATTEMPTS", "1")
            .parse::<u32>()
            .context("MODEL_MAX_ATTEMPTS must be a positive integer")?;
        if model_max_attempts == 0 {
            bail!("MODEL_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            model_api_url: or_default("MODEL_API_URL", DEFAULT_MODEL_API_URL),
            model_api_key: require("MODEL_API_KEY")?,
            model: or_default("MODEL", DEFAULT_MODEL),
            model_max_attempts,
            model_timeout: Duration::from_secs(
                or_default("MODEL_TIMEOUT_SECS", "120")
                    .parse::<u64>()
                    .context("MODEL_TIMEOUT_SECS must be a number of seconds")?,
            ),
            max_upload_bytes: lookup("MAX_UPLOAD_BYTES")
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("MAX_UPLOAD_BYTES must be a number of bytes")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            session_idle_ttl: Duration::from_secs(
                or_default("SESSION_IDLE_TTL_SECS", "3600")
                    .parse::<u64>()
                    .context("SESSION_IDLE_TTL_SECS must be a number of seconds")?,
            ),
            prompt_template_path: lookup("PROMPT_TEMPLATE_PATH").map(PathBuf::from),
            metric_catalog_path: lookup("METRIC_CATALOG_PATH").map(PathBuf::from),
            port: or_default("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: or_default("RUST_LOG", "info"),
        })
    }

    /// How often idle sessions are swept: every minute, or every TTL if shorter.
    pub fn session_sweep_interval(&self) -> Duration {
        self.session_idle_ttl
            .min(Duration::from_secs(60))
            .max(Duration::from_secs(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.model_max_attempts,
            timeout: self.model_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_with_only_api_key() {
        let config = config_from(&[("MODEL_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.model_api_url, DEFAULT_MODEL_API_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.model_max_attempts, 1);
        assert_eq!(config.model_timeout, Duration::from_secs(120));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.port, 8080);
        assert_eq!(config.rust_log, "info");
        assert!(config.prompt_template_path.is_none());
        assert_eq!(config.session_idle_ttl, Duration::from_secs(3600));
        assert_eq!(config.session_sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_short_session_ttl_sweeps_at_least_as_often() {
        let config =
            config_from(&[("MODEL_API_KEY", "k"), ("SESSION_IDLE_TTL_SECS", "20")]).unwrap();
        assert_eq!(config.session_idle_ttl, Duration::from_secs(20));
        assert_eq!(config.session_sweep_interval(), Duration::from_secs(20));
    }

    #[test]
    fn test_missing_api_key_fails() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("MODEL_API_KEY"));
    }

    #[test]
    fn test_overrides_are_read() {
        let config = config_from(&[
            ("MODEL_API_KEY", "sk-test"),
            ("MODEL", "local-llama"),
            ("MODEL_API_URL", "http://localhost:11434/v1/chat/completions"),
            ("MODEL_MAX_ATTEMPTS", "3"),
            ("MODEL_TIMEOUT_SECS", "15"),
            ("MAX_UPLOAD_BYTES", "2048"),
            ("PROMPT_TEMPLATE_PATH", "/etc/analyser/prompt.txt"),
            ("PORT", "9000"),
        ])
        .unwrap();
        assert_eq!(config.model, "local-llama");
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.retry_policy().timeout, Duration::from_secs(15));
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(
            config.prompt_template_path,
            Some(PathBuf::from("/etc/analyser/prompt.txt"))
        );
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        assert!(config_from(&[("MODEL_API_KEY", "k"), ("MODEL_MAX_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn test_malformed_numbers_are_rejected() {
        assert!(config_from(&[("MODEL_API_KEY", "k"), ("PORT", "eighty")]).is_err());
        assert!(config_from(&[("MODEL_API_KEY", "k"), ("MAX_UPLOAD_BYTES", "-1")]).is_err());
        assert!(config_from(&[("MODEL_API_KEY", "k"), ("MODEL_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config_from(&[("MODEL_API_KEY", "k"), ("SESSION_IDLE_TTL_SECS", "1h")]).is_err());
    }
}
