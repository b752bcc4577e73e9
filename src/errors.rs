use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 photo data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Configuration error: {0}")]
    Env(#[from] envy::Error),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),

    // Compression
    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Encode attempt timed out after {timeout_ms}ms")]
    EncodeTimeout { timeout_ms: u64 },

    #[error("Photo #{index} could not be compressed: {reason}")]
    CompressionFailed { index: usize, reason: String },

    // Delivery
    #[error("Summary delivery failed: {reason}")]
    SummaryDeliveryFailed { status: Option<u16>, reason: String },

    #[error("Batch {batch_index} delivery failed: {cause}")]
    BatchDeliveryFailed {
        batch_index: usize,
        status: Option<u16>,
        cause: String,
    },

    #[error("Batch {batch_index} still rate limited after {attempts} attempts")]
    RetriesExhausted { batch_index: usize, attempts: u32 },

    #[error("Submission stopped after {delivered} of {total} batches: {source}")]
    PartialDelivery {
        delivered: usize,
        total: usize,
        #[source]
        source: Box<AppError>,
    },
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn compression_failed(index: usize, reason: impl ToString) -> Self {
        Self::CompressionFailed {
            index,
            reason: reason.to_string(),
        }
    }

    pub fn summary_failed(status: Option<u16>, reason: &str) -> Self {
        Self::SummaryDeliveryFailed {
            status,
            reason: reason.to_string(),
        }
    }

    pub fn batch_failed(batch_index: usize, status: Option<u16>, cause: &str) -> Self {
        Self::BatchDeliveryFailed {
            batch_index,
            status,
            cause: cause.to_string(),
        }
    }

    pub fn partial_delivery(delivered: usize, total: usize, source: AppError) -> Self {
        Self::PartialDelivery {
            delivered,
            total,
            source: Box::new(source),
        }
    }

    /// Failures that end the whole submission rather than one photo.
    pub fn is_fatal_for_submission(&self) -> bool {
        matches!(
            self,
            AppError::SummaryDeliveryFailed { .. }
                | AppError::BatchDeliveryFailed { .. }
                | AppError::RetriesExhausted { .. }
                | AppError::PartialDelivery { .. }
        )
    }

    /// A failed encode attempt that the next preset may still recover from.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Encoder(_) | AppError::EncodeTimeout { .. } | AppError::Image(_)
        )
    }

    /// Upstream HTTP status carried by a delivery failure, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            AppError::SummaryDeliveryFailed { status, .. }
            | AppError::BatchDeliveryFailed { status, .. } => *status,
            AppError::PartialDelivery { source, .. } => source.upstream_status(),
            _ => None,
        }
    }
}
