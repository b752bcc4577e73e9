use std::sync::Arc;
use tokio::time::sleep;

use super::rate_limit::{backoff_delay, classify, ApiOutcome};
use super::summary::build_summary_message;
use super::telegram_client::{MediaGroupUpload, MessagingApi, TextMessage};
use crate::config::RelayConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{Batch, DeliveryResult, SubmissionSummary};

#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub chat_id: String,
    pub thread_id: Option<i64>,
    pub retry_multiplier: f64,
    pub max_send_attempts: u32,
    pub rate_limit_fallback_secs: f64,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            chat_id: config.telegram_chat_id.clone(),
            thread_id: config.telegram_thread_id,
            retry_multiplier: config.retry_multiplier,
            max_send_attempts: config.max_send_attempts,
            rate_limit_fallback_secs: config.rate_limit_fallback_secs,
        }
    }
}

/// Lifecycle of one batch send. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Waiting,
    Sent,
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::Sent | DeliveryState::Failed)
    }
}

/// Sends summaries and photo batches through a [`MessagingApi`], retrying batches
/// while the API asks us to slow down.
pub struct Relay {
    api: Arc<dyn MessagingApi>,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(api: Arc<dyn MessagingApi>, settings: RelaySettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// One request, no retry. Any non-success reply fails the submission.
    pub async fn send_summary(&self, summary: &SubmissionSummary) -> AppResult<()> {
        let message = TextMessage::markdown(
            &self.settings.chat_id,
            self.settings.thread_id,
            build_summary_message(summary),
        );

        let reply = self
            .api
            .send_message(&message)
            .await
            .map_err(|e| AppError::summary_failed(None, &e.to_string()))?;

        match classify(&reply) {
            ApiOutcome::Delivered(_) => {
                log::info!("Summary sent for unit {}", summary.unit.unit_id());
                Ok(())
            }
            ApiOutcome::RateLimited { .. } => {
                log::error!("Summary rate limited: {}", reply.preview());
                Err(AppError::summary_failed(
                    Some(reply.status),
                    "rate limited by messaging API",
                ))
            }
            ApiOutcome::Rejected {
                status,
                description,
            } => {
                log::error!("Summary rejected ({}): {}", status, reply.preview());
                Err(AppError::summary_failed(Some(status), &description))
            }
        }
    }

    /// Upload one batch as a media group. Rate-limited replies are retried after
    /// the server-provided wait, up to `max_attempts` requests in total.
    pub async fn send_batch(&self, batch: &Batch, max_attempts: u32) -> AppResult<DeliveryResult> {
        let max_attempts = max_attempts.max(1);
        let upload =
            MediaGroupUpload::from_batch(batch, &self.settings.chat_id, self.settings.thread_id)?;
        let label = batch.caption_prefix();
        let mut state = DeliveryState::Pending;

        for attempt in 1..=max_attempts {
            log::debug!("{}: attempt {}/{} ({:?})", label, attempt, max_attempts, state);

            let reply = match self.api.send_media_group(&upload).await {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!("{}: transport failure: {}", label, e);
                    return Err(AppError::batch_failed(batch.index, None, &e.to_string()));
                }
            };

            match classify(&reply) {
                ApiOutcome::Delivered(result) => {
                    state = DeliveryState::Sent;
                    log::info!(
                        "{}: {:?}, {} photos after {} attempt(s)",
                        label,
                        state,
                        batch.photos.len(),
                        attempt
                    );
                    return Ok(DeliveryResult {
                        batch_index: batch.index,
                        attempts: attempt,
                        result,
                    });
                }
                ApiOutcome::Rejected {
                    status,
                    description,
                } => {
                    state = DeliveryState::Failed;
                    log::error!(
                        "{}: rejected with {} ({:?}): {}",
                        label,
                        status,
                        state,
                        reply.preview()
                    );
                    return Err(AppError::batch_failed(batch.index, Some(status), &description));
                }
                ApiOutcome::RateLimited { retry_after } => {
                    if attempt == max_attempts {
                        break;
                    }

                    state = DeliveryState::Waiting;
                    let delay = backoff_delay(
                        retry_after,
                        self.settings.rate_limit_fallback_secs,
                        self.settings.retry_multiplier,
                    );
                    log::warn!(
                        "{}: rate limited (retry_after={:?}), waiting {:?} before attempt {}",
                        label,
                        retry_after,
                        delay,
                        attempt + 1
                    );
                    sleep(delay).await;
                    state = DeliveryState::Pending;
                }
            }
        }

        log::error!("{}: still rate limited after {} attempts", label, max_attempts);
        Err(AppError::RetriesExhausted {
            batch_index: batch.index,
            attempts: max_attempts,
        })
    }

    /// Default attempt budget from configuration.
    pub fn max_attempts(&self) -> u32 {
        self.settings.max_send_attempts
    }
}
