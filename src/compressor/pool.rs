use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;

use super::Compressor;
use crate::errors::AppError;
use crate::models::{EncodedPhoto, RawImage};

/// Outcome of compressing a whole selection of photos.
#[derive(Debug, Default)]
pub struct PoolReport {
    /// In completion order, not input order.
    pub photos: Vec<EncodedPhoto>,
    /// One `CompressionFailed` per photo that could not be encoded.
    pub failures: Vec<AppError>,
}

impl PoolReport {
    pub fn attempted(&self) -> usize {
        self.photos.len() + self.failures.len()
    }

    /// 1-based numbers of the photos that failed, ascending.
    pub fn failed_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .failures
            .iter()
            .filter_map(|e| match e {
                AppError::CompressionFailed { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        indices.sort_unstable();
        indices
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Compression pool lock poisoned (non-critical), continuing");
            poisoned.into_inner()
        }
    }
}

impl Compressor {
    /// Compress every image with a bounded set of workers. Each worker pulls the
    /// next pending image as soon as it is done with the previous one; the call
    /// returns once every image has been attempted.
    pub async fn compress_all(&self, images: Vec<RawImage>) -> PoolReport {
        self.compress_indexed(images.into_iter().enumerate().collect())
            .await
    }

    /// Like [`compress_all`](Self::compress_all), with each image carrying its own
    /// 0-based position for filenames and failure reports.
    pub async fn compress_indexed(&self, images: Vec<(usize, RawImage)>) -> PoolReport {
        let total = images.len();
        if total == 0 {
            return PoolReport::default();
        }

        let workers = self.settings().worker_count().min(total);
        let pending: Arc<Mutex<VecDeque<(usize, RawImage)>>> =
            Arc::new(Mutex::new(images.into_iter().collect()));
        let report = Arc::new(Mutex::new(PoolReport::default()));
        let completed = Arc::new(AtomicUsize::new(0));

        log::info!("Compressing {} photos with {} workers", total, workers);

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let compressor = self.clone();
            let pending = Arc::clone(&pending);
            let report = Arc::clone(&report);
            let completed = Arc::clone(&completed);

            set.spawn(async move {
                loop {
                    let next = lock(&pending).pop_front();
                    let Some((source_index, image)) = next else {
                        break;
                    };

                    let outcome = compressor.compress(image, source_index).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

                    match outcome {
                        Ok(photo) => {
                            log::debug!(
                                "[worker {}] photo #{} ready ({}/{})",
                                worker_id,
                                source_index + 1,
                                done,
                                total
                            );
                            lock(&report).photos.push(photo);
                        }
                        Err(e) => {
                            log::warn!("[worker {}] {} ({}/{})", worker_id, e, done, total);
                            lock(&report).failures.push(e);
                        }
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                log::error!("Compression worker task failed: {}", e);
            }
        }

        let report = std::mem::take(&mut *lock(&report));
        log::info!(
            "Compression finished: {} ok, {} failed",
            report.photos.len(),
            report.failures.len()
        );
        report
    }
}
