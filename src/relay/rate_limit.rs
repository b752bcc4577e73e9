use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

/// Raw HTTP reply from the messaging API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: String,
}

impl ApiReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body shortened for log lines.
    pub fn preview(&self) -> &str {
        let mut end = self.body.len().min(300);
        while !self.body.is_char_boundary(end) {
            end -= 1;
        }
        &self.body[..end]
    }
}

/// Every reply, whichever encoding the API chose, lands in exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome {
    Delivered(Value),
    RateLimited { retry_after: Option<f64> },
    Rejected { status: u16, description: String },
}

fn rate_limit_text() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)too many requests|retry[_ ]after").unwrap())
}

fn embedded_retry_after() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)retry[_ ]after\D{0,8}(\d+(?:\.\d+)?)").unwrap())
}

pub fn classify(reply: &ApiReply) -> ApiOutcome {
    let json: Option<Value> = serde_json::from_str(&reply.body).ok();
    let api_ok = json
        .as_ref()
        .and_then(|j| j.get("ok"))
        .and_then(Value::as_bool);

    if (200..300).contains(&reply.status) && api_ok != Some(false) {
        let result = json
            .as_ref()
            .and_then(|j| j.get("result").cloned())
            .unwrap_or(Value::Null);
        return ApiOutcome::Delivered(result);
    }

    let error_code = json
        .as_ref()
        .and_then(|j| j.get("error_code"))
        .and_then(Value::as_u64);

    let retry_after = json
        .as_ref()
        .and_then(|j| {
            j.pointer("/parameters/retry_after")
                .or_else(|| j.get("retry_after"))
        })
        .and_then(Value::as_f64)
        .or_else(|| {
            embedded_retry_after()
                .captures(&reply.body)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
        });

    if reply.status == 429 || error_code == Some(429) || rate_limit_text().is_match(&reply.body) {
        return ApiOutcome::RateLimited { retry_after };
    }

    let description = json
        .as_ref()
        .and_then(|j| j.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            if reply.body.trim().is_empty() {
                format!("HTTP {}", reply.status)
            } else {
                reply.body.clone()
            }
        });

    ApiOutcome::Rejected {
        status: reply.status,
        description,
    }
}

/// `ceil(retry_after * 1000 * multiplier)` milliseconds; `fallback_secs` when the
/// server gave no usable value.
pub fn backoff_delay(retry_after: Option<f64>, fallback_secs: f64, multiplier: f64) -> Duration {
    let secs = retry_after
        .filter(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or(fallback_secs);
    Duration::from_millis((secs * 1000.0 * multiplier).ceil() as u64)
}
