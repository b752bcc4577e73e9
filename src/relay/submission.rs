use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use super::batches::partition_batches;
use super::delivery::Relay;
use crate::config::ClientConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{Batch, DeliveryResult, EncodedPhoto, PhotoTally, SubmissionSummary, Unit};
use crate::security::MAX_PHOTOS_PER_BATCH;

/// Something that can take a submission: the in-process [`Relay`] or the HTTP
/// entrypoint in front of one.
#[async_trait]
pub trait RelayTarget: Send + Sync {
    async fn send_summary(&self, summary: &SubmissionSummary) -> AppResult<()>;

    async fn send_batch(&self, unit: &Unit, batch: &Batch) -> AppResult<DeliveryResult>;
}

#[async_trait]
impl RelayTarget for Relay {
    async fn send_summary(&self, summary: &SubmissionSummary) -> AppResult<()> {
        Relay::send_summary(self, summary).await
    }

    async fn send_batch(&self, _unit: &Unit, batch: &Batch) -> AppResult<DeliveryResult> {
        Relay::send_batch(self, batch, self.max_attempts()).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPolicy {
    pub min_photos: usize,
    /// Wait after every successfully delivered batch.
    pub pacing_delay: Duration,
    pub batch_size: usize,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            min_photos: 20,
            pacing_delay: Duration::from_millis(600),
            batch_size: MAX_PHOTOS_PER_BATCH,
        }
    }
}

impl From<&ClientConfig> for SubmissionPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            min_photos: config.min_photos,
            pacing_delay: config.pacing_delay(),
            batch_size: MAX_PHOTOS_PER_BATCH,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub session_id: String,
    pub photos_sent: usize,
    pub batches: Vec<DeliveryResult>,
}

/// Send one inspection: the summary once, then every batch in order. The first
/// relay failure stops the sequence; nothing is resumed or rolled back.
pub async fn submit(
    target: &dyn RelayTarget,
    mut summary: SubmissionSummary,
    photos: Vec<EncodedPhoto>,
    policy: &SubmissionPolicy,
) -> AppResult<SubmissionReport> {
    if photos.len() < policy.min_photos {
        return Err(AppError::validation(
            "photos",
            &format!(
                "at least {} photos required, got {}",
                policy.min_photos,
                photos.len()
            ),
        ));
    }

    let session_id = Uuid::new_v4().to_string();
    let photo_count = photos.len();
    let unit = summary.unit.clone();
    let batches = partition_batches(&unit.unit_id(), photos, policy.batch_size);
    let total = batches.len();

    summary.photos = Some(PhotoTally {
        files: photo_count,
        albums: total,
    });

    log::info!(
        "Submission {}: unit {}, {} photos in {} batches",
        session_id,
        unit.unit_id(),
        photo_count,
        total
    );

    target.send_summary(&summary).await?;

    let mut delivered = Vec::with_capacity(total);
    for batch in &batches {
        match target.send_batch(&unit, batch).await {
            Ok(result) => {
                log::info!(
                    "Submission {}: batch {}/{} delivered",
                    session_id,
                    batch.index,
                    total
                );
                delivered.push(result);
                sleep(policy.pacing_delay).await;
            }
            Err(e) => {
                log::error!(
                    "Submission {} stopped at batch {}/{}: {}",
                    session_id,
                    batch.index,
                    total,
                    e
                );
                return Err(AppError::partial_delivery(delivered.len(), total, e));
            }
        }
    }

    Ok(SubmissionReport {
        session_id,
        photos_sent: photo_count,
        batches: delivered,
    })
}
