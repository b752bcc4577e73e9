// Adaptive photo compression: walk a preset ladder until the encoded image fits the
// byte budget, with every attempt isolated on the blocking pool under a timeout.

pub mod encoder;
pub mod pool;
pub mod presets;

use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::{ClientConfig, MAX_WORKERS_CAP};
use crate::errors::{AppError, AppResult};
use crate::models::{EncodedPhoto, RawImage, WEBP_MIME};

pub use encoder::{EncodedImage, PhotoEncoder, WebpEncoder};
pub use pool::PoolReport;
pub use presets::{Preset, PresetLadder};

pub const DEFAULT_TARGET_BUDGET: usize = 200 * 1024;

#[derive(Debug, Clone)]
pub struct CompressorSettings {
    pub target_budget: usize,
    pub attempt_timeout: Duration,
    pub fallback_timeout: Duration,
    pub max_workers: usize,
    pub ladder: PresetLadder,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            target_budget: DEFAULT_TARGET_BUDGET,
            attempt_timeout: Duration::from_secs(10),
            fallback_timeout: Duration::from_secs(9),
            max_workers: MAX_WORKERS_CAP,
            ladder: PresetLadder::default(),
        }
    }
}

impl From<&ClientConfig> for CompressorSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            target_budget: config.target_budget_bytes(),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            fallback_timeout: Duration::from_millis(config.fallback_timeout_ms),
            max_workers: config.max_workers,
            ladder: PresetLadder::default(),
        }
    }
}

impl CompressorSettings {
    /// `min(8, configured, hardware parallelism)`, at least one.
    pub fn worker_count(&self) -> usize {
        self.max_workers.min(MAX_WORKERS_CAP).min(num_cpus()).max(1)
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

/// Per-image progress through the preset ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionJob {
    /// 0-based position in the caller's input.
    pub source_index: usize,
    pub target_byte_budget: usize,
    pub attempts_made: usize,
    pub preset_index: usize,
}

impl CompressionJob {
    pub fn new(source_index: usize, target_byte_budget: usize) -> Self {
        Self {
            source_index,
            target_byte_budget,
            attempts_made: 0,
            preset_index: 0,
        }
    }

    /// 1-based photo number used in filenames and failure reports.
    pub fn number(&self) -> usize {
        self.source_index + 1
    }

    fn begin_attempt(&mut self, preset_index: usize) {
        self.preset_index = preset_index;
        self.attempts_made += 1;
    }
}

#[derive(Clone)]
pub struct Compressor {
    encoder: Arc<dyn PhotoEncoder>,
    settings: Arc<CompressorSettings>,
    /// One permit per running encode, held until the encoder returns.
    encode_slots: Arc<Semaphore>,
}

impl Compressor {
    pub fn new(encoder: impl PhotoEncoder, settings: CompressorSettings) -> Self {
        let encode_slots = Arc::new(Semaphore::new(settings.worker_count()));
        Self {
            encoder: Arc::new(encoder),
            settings: Arc::new(settings),
            encode_slots,
        }
    }

    pub fn settings(&self) -> &CompressorSettings {
        &self.settings
    }

    /// Compress one image to at most the target budget. The fallback preset's
    /// output is accepted even when it is over budget.
    pub async fn compress(&self, image: RawImage, source_index: usize) -> AppResult<EncodedPhoto> {
        let budget = self.settings.target_budget;
        let ladder = &self.settings.ladder;
        let mut job = CompressionJob::new(source_index, budget);

        let mime: Arc<str> = Arc::from(image.mime.as_str());
        let source: Arc<Vec<u8>> = Arc::new(image.data);

        log::debug!(
            "Compressing photo #{} ({} bytes, {})",
            job.number(),
            source.len(),
            mime
        );

        for (preset_index, preset) in ladder.steps().iter().enumerate() {
            job.begin_attempt(preset_index);

            match self
                .attempt(&source, &mime, *preset, self.settings.attempt_timeout)
                .await
            {
                Ok(encoded) if encoded.bytes.len() <= budget => {
                    return Ok(self.finish(&job, encoded));
                }
                Ok(encoded) => {
                    log::debug!(
                        "Photo #{} over budget at preset {} ({} > {} bytes)",
                        job.number(),
                        preset_index,
                        encoded.bytes.len(),
                        budget
                    );
                }
                Err(e) if e.is_retryable() => {
                    log::warn!(
                        "Photo #{} attempt {} failed at preset {}: {}",
                        job.number(),
                        job.attempts_made,
                        preset_index,
                        e
                    );
                }
                Err(e) => return Err(AppError::compression_failed(job.number(), e)),
            }
        }

        job.begin_attempt(ladder.steps().len());
        match self
            .attempt(&source, &mime, ladder.fallback(), self.settings.fallback_timeout)
            .await
        {
            Ok(encoded) => {
                if encoded.bytes.len() > budget {
                    log::warn!(
                        "Photo #{} kept over budget at fallback preset ({} > {} bytes)",
                        job.number(),
                        encoded.bytes.len(),
                        budget
                    );
                }
                Ok(self.finish(&job, encoded))
            }
            Err(e) => Err(AppError::compression_failed(job.number(), e)),
        }
    }

    async fn attempt(
        &self,
        source: &Arc<Vec<u8>>,
        mime: &Arc<str>,
        preset: Preset,
        limit: Duration,
    ) -> AppResult<EncodedImage> {
        let encoder = Arc::clone(&self.encoder);
        let source = Arc::clone(source);
        let mime = Arc::clone(mime);

        let permit = Arc::clone(&self.encode_slots)
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("encode slots closed: {}", e)))?;

        // A timed-out task keeps its blocking thread and its permit until libwebp
        // returns; the result is dropped with the JoinHandle.
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            encoder.encode(&source, &mime, &preset)
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AppError::Encoder(format!(
                "encode task failed: {}",
                join_error
            ))),
            Err(_) => Err(AppError::EncodeTimeout {
                timeout_ms: limit.as_millis() as u64,
            }),
        }
    }

    fn finish(&self, job: &CompressionJob, encoded: EncodedImage) -> EncodedPhoto {
        log::debug!(
            "Photo #{} done after {} attempt(s): {}x{}, {} bytes",
            job.number(),
            job.attempts_made,
            encoded.width,
            encoded.height,
            encoded.bytes.len()
        );

        EncodedPhoto {
            filename: photo_filename(job.number()),
            mime: WEBP_MIME.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&encoded.bytes),
            width: encoded.width,
            height: encoded.height,
            byte_size: encoded.bytes.len(),
        }
    }
}

/// `photo_{unix millis}_{number}.webp`
pub fn photo_filename(number: usize) -> String {
    format!(
        "photo_{}_{}.webp",
        chrono::Utc::now().timestamp_millis(),
        number
    )
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn raw() -> RawImage {
        RawImage::new(vec![1, 2, 3], "image/jpeg")
    }

    #[tokio::test]
    async fn test_compress_returns_first_preset_within_budget() {
        let compressor = Compressor::new(SizedEncoder, settings(500));
        let photo = compressor.compress(raw(), 0).await.unwrap();

        // 0.60 -> 600, 0.52 -> 520, 0.46 -> 460 bytes
        assert_eq!(photo.byte_size, 460);
        assert_eq!((photo.width, photo.height), (1024, 768));
        assert_eq!(photo.mime, "image/webp");
    }

    #[tokio::test]
    async fn test_compress_accepts_fallback_over_budget() {
        let compressor = Compressor::new(SizedEncoder, settings(100));
        let photo = compressor.compress(raw(), 4).await.unwrap();

        assert_eq!(photo.byte_size, 400);
        assert_eq!((photo.width, photo.height), (900, 675));
        assert!(photo.filename.starts_with("photo_"));
        assert!(photo.filename.ends_with("_5.webp"));
    }

    #[tokio::test]
    async fn test_compress_encodes_data_as_base64() {
        let compressor = Compressor::new(SizedEncoder, settings(10_000));
        let photo = compressor.compress(raw(), 0).await.unwrap();

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&photo.data)
            .unwrap();
        assert_eq!(decoded.len(), photo.byte_size);
        assert_eq!(photo.byte_size, 600);
    }

    struct AlwaysFails {
        calls: Arc<AtomicUsize>,
    }

    impl PhotoEncoder for AlwaysFails {
        fn encode(&self, _source: &[u8], _mime: &str, _preset: &Preset) -> AppResult<EncodedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Encoder("corrupt".to_string()))
        }
    }

    #[tokio::test]
    async fn test_compress_fails_after_fallback_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let compressor = Compressor::new(
            AlwaysFails {
                calls: Arc::clone(&calls),
            },
            settings(500),
        );

        let err = compressor.compress(raw(), 6).await.unwrap_err();

        assert!(matches!(err, AppError::CompressionFailed { index: 7, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), PresetLadder::default().max_attempts());
    }

    /// Stalls on high-quality presets so the attempt timeout fires.
    struct StallsAboveHalfQuality;

    impl PhotoEncoder for StallsAboveHalfQuality {
        fn encode(&self, source: &[u8], mime: &str, preset: &Preset) -> AppResult<EncodedImage> {
            if preset.quality >= 0.5 {
                std::thread::sleep(Duration::from_millis(300));
            }
            SizedEncoder.encode(source, mime, preset)
        }
    }

    struct RejectsInput {
        calls: Arc<AtomicUsize>,
    }

    impl PhotoEncoder for RejectsInput {
        fn encode(&self, _source: &[u8], _mime: &str, _preset: &Preset) -> AppResult<EncodedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::validation("source", "empty capture"))
        }
    }

    #[tokio::test]
    async fn test_compress_stops_on_non_retryable_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let compressor = Compressor::new(
            RejectsInput {
                calls: Arc::clone(&calls),
            },
            settings(500),
        );

        let err = compressor.compress(raw(), 2).await.unwrap_err();

        match err {
            AppError::CompressionFailed { index, reason } => {
                assert_eq!(index, 3);
                assert!(reason.contains("empty capture"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compress_moves_on_after_timeout() {
        let compressor = Compressor::new(
            StallsAboveHalfQuality,
            CompressorSettings {
                attempt_timeout: Duration::from_millis(50),
                ..settings(10_000)
            },
        );

        let photo = compressor.compress(raw(), 0).await.unwrap();

        assert_eq!((photo.width, photo.height), (1024, 768));
        assert_eq!(photo.byte_size, 460);
    }

    #[test]
    fn test_worker_count_is_capped() {
        let settings = CompressorSettings {
            max_workers: 64,
            ..CompressorSettings::default()
        };
        assert!(settings.worker_count() <= 8);
        assert!(settings.worker_count() >= 1);
    }

    #[test]
    fn test_compression_job_number_is_one_based() {
        let mut job = CompressionJob::new(6, 1024);
        job.begin_attempt(2);
        assert_eq!(job.number(), 7);
        assert_eq!(job.attempts_made, 1);
        assert_eq!(job.preset_index, 2);
    }
}
