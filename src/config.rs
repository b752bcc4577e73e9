use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

pub const MAX_WORKERS_CAP: usize = 8;

/// Relay process settings, read once at startup.
#[derive(Clone, Deserialize)]
pub struct RelayConfig {
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    #[serde(default)]
    pub telegram_thread_id: Option<i64>,
    #[serde(default = "default_group_delay_ms")]
    pub group_delay_ms: u64,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_api_base")]
    pub telegram_api_base: String,
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
    #[serde(default = "default_rate_limit_fallback_secs")]
    pub rate_limit_fallback_secs: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_group_delay_ms() -> u64 {
    1500
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_retry_multiplier() -> f64 {
    1.2
}

fn default_max_send_attempts() -> u32 {
    5
}

fn default_rate_limit_fallback_secs() -> f64 {
    5.0
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl RelayConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let config: RelayConfig = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.telegram_bot_token.trim().is_empty() {
            return Err(AppError::validation("TELEGRAM_BOT_TOKEN", "Must not be empty"));
        }

        crate::security::InputValidator::validate_chat_id(&self.telegram_chat_id)?;

        if !(1.0..=2.0).contains(&self.retry_multiplier) {
            return Err(AppError::validation("RETRY_MULTIPLIER", "Must be between 1.0 and 2.0"));
        }

        if self.max_send_attempts == 0 || self.max_send_attempts > 10 {
            return Err(AppError::validation("MAX_SEND_ATTEMPTS", "Must be between 1 and 10"));
        }

        if self.group_delay_ms > 60_000 {
            return Err(AppError::validation("GROUP_DELAY_MS", "Must be 60000ms or less"));
        }

        if self.rate_limit_fallback_secs.is_nan() || self.rate_limit_fallback_secs <= 0.0 {
            return Err(AppError::validation(
                "RATE_LIMIT_FALLBACK_SECS",
                "Must be greater than 0",
            ));
        }

        if !self.telegram_api_base.starts_with("http://")
            && !self.telegram_api_base.starts_with("https://")
        {
            return Err(AppError::validation("TELEGRAM_API_BASE", "Must be an http(s) URL"));
        }

        Ok(())
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("telegram_bot_token", &"<redacted>")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_thread_id", &self.telegram_thread_id)
            .field("group_delay_ms", &self.group_delay_ms)
            .field("bind_addr", &self.bind_addr)
            .field("telegram_api_base", &self.telegram_api_base)
            .field("retry_multiplier", &self.retry_multiplier)
            .field("max_send_attempts", &self.max_send_attempts)
            .field("rate_limit_fallback_secs", &self.rate_limit_fallback_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Submitter settings, read from `PTI_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub relay_url: String,
    #[serde(default = "default_target_kb")]
    pub target_kb: usize,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_min_photos")]
    pub min_photos: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_target_kb() -> usize {
    200
}

fn default_pacing_ms() -> u64 {
    600
}

fn default_min_photos() -> usize {
    20
}

fn default_max_workers() -> usize {
    MAX_WORKERS_CAP
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

fn default_fallback_timeout_ms() -> u64 {
    9_000
}

fn default_timezone() -> String {
    "local".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:8000".to_string(),
            target_kb: default_target_kb(),
            pacing_ms: default_pacing_ms(),
            min_photos: default_min_photos(),
            max_workers: default_max_workers(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            fallback_timeout_ms: default_fallback_timeout_ms(),
            timezone: default_timezone(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let config: ClientConfig = envy::prefixed("PTI_").from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.relay_url.starts_with("http://") && !self.relay_url.starts_with("https://") {
            return Err(AppError::validation("PTI_RELAY_URL", "Must be an http(s) URL"));
        }

        if self.target_kb == 0 {
            return Err(AppError::validation("PTI_TARGET_KB", "Must be greater than 0"));
        }

        if self.max_workers == 0 || self.max_workers > MAX_WORKERS_CAP {
            return Err(AppError::validation("PTI_MAX_WORKERS", "Must be between 1 and 8"));
        }

        if self.attempt_timeout_ms < 100 || self.fallback_timeout_ms < 100 {
            return Err(AppError::validation(
                "PTI_ATTEMPT_TIMEOUT_MS",
                "Encode timeouts must be at least 100ms",
            ));
        }

        if self.pacing_ms > 60_000 {
            return Err(AppError::validation("PTI_PACING_MS", "Must be 60000ms or less"));
        }

        Ok(())
    }

    pub fn target_budget_bytes(&self) -> usize {
        self.target_kb * 1024
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}
