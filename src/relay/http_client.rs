use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::submission::RelayTarget;
use crate::errors::{AppError, AppResult};
use crate::models::{Batch, DeliveryResult, GroupPayload, SubmissionSummary, Unit};

/// Client for the relay's HTTP entrypoint (`/relay/summary`, `/relay/group`).
#[derive(Debug, Clone)]
pub struct RelayHttpClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GroupReply {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    attempts: Option<u32>,
}

impl ErrorReply {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn message(&self, status: u16, body: &str) -> String {
        match &self.error {
            Some(error) => error.clone(),
            None if body.trim().is_empty() => format!("HTTP {}", status),
            None => body.chars().take(300).collect(),
        }
    }
}

impl RelayHttpClient {
    pub fn new(base_url: &str) -> AppResult<Self> {
        // Group requests include the relay's rate-limit waits and pacing
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn summary_error(status: u16, body: &str) -> AppError {
    let reply = ErrorReply::parse(body);
    AppError::summary_failed(Some(status), &reply.message(status, body))
}

fn batch_error(batch_index: usize, status: u16, body: &str) -> AppError {
    let reply = ErrorReply::parse(body);
    if status == 429 {
        return AppError::RetriesExhausted {
            batch_index,
            attempts: reply.attempts.unwrap_or(0),
        };
    }
    AppError::batch_failed(batch_index, Some(status), &reply.message(status, body))
}

fn delivery_result(batch_index: usize, body: &str) -> AppResult<DeliveryResult> {
    let reply: GroupReply = serde_json::from_str(body)?;
    Ok(DeliveryResult {
        batch_index,
        attempts: reply.attempts.unwrap_or(1),
        result: reply.result,
    })
}

#[async_trait]
impl RelayTarget for RelayHttpClient {
    async fn send_summary(&self, summary: &SubmissionSummary) -> AppResult<()> {
        let response = self
            .client
            .post(self.endpoint("/relay/summary"))
            .json(summary)
            .send()
            .await
            .map_err(|e| AppError::summary_failed(None, &e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(summary_error(status.as_u16(), &body))
    }

    async fn send_batch(&self, unit: &Unit, batch: &Batch) -> AppResult<DeliveryResult> {
        let payload = GroupPayload::from_batch(unit, batch);

        log::debug!(
            "POST /relay/group {} ({} photos)",
            batch.caption_prefix(),
            batch.photos.len()
        );

        let response = self
            .client
            .post(self.endpoint("/relay/group"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::batch_failed(batch.index, None, &e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::batch_failed(batch.index, None, &e.to_string()))?;

        if status.is_success() {
            delivery_result(batch.index, &body)
        } else {
            Err(batch_error(batch.index, status.as_u16(), &body))
        }
    }
}
