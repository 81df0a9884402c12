use std::time::Duration;

use duration_string::DurationString;

use crate::retry::RetryPolicy;

pub const DEFAULT_SENSOR_API_URL: &str = "https://isensair-backend.onrender.com";
pub const DEFAULT_ML_SERVICE_URL: &str = "https://naufalrozan-isense-air-service.hf.space";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_DEEPSEEK_URL: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";

/// Endpoints and credentials of the services the dashboard talks to.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sensor_api_url: String,
    pub ml_service_url: String,
    pub llm: LlmConfig,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub openai_url: String,
    pub openai_model: String,
    pub openai_api_key: Option<String>,
    pub deepseek_url: String,
    pub deepseek_model: String,
    pub deepseek_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config::from_lookup(|_| None)
    }
}

impl Config {
    /// Read the configuration from environment variables:
    ///
    /// - `SENSOR_API_URL`, `ML_SERVICE_URL`
    /// - `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_URL`
    /// - `DEEPSEEK_API_KEY`, `DEEPSEEK_MODEL`, `DEEPSEEK_URL`
    /// - `RIVERWATCH_RETRIES`, `RIVERWATCH_BACKOFF` (e.g. `500ms`, `1s`)
    ///
    /// Unset, empty or unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let defaults = RetryPolicy::default();
        let retries = var("RIVERWATCH_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.retries);
        let backoff = var("RIVERWATCH_BACKOFF")
            .and_then(|v| v.parse::<DurationString>().ok())
            .map(Duration::from)
            .unwrap_or(defaults.backoff);

        Config {
            sensor_api_url: or("SENSOR_API_URL", DEFAULT_SENSOR_API_URL),
            ml_service_url: or("ML_SERVICE_URL", DEFAULT_ML_SERVICE_URL),
            llm: LlmConfig {
                openai_url: or("OPENAI_URL", DEFAULT_OPENAI_URL),
                openai_model: or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
                openai_api_key: var("OPENAI_API_KEY"),
                deepseek_url: or("DEEPSEEK_URL", DEFAULT_DEEPSEEK_URL),
                deepseek_model: or("DEEPSEEK_MODEL", DEFAULT_DEEPSEEK_MODEL),
                deepseek_api_key: var("DEEPSEEK_API_KEY"),
            },
            retry: RetryPolicy { retries, backoff },
        }
    }
}
