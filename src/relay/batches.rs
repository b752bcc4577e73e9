use crate::models::{Batch, EncodedPhoto};
use crate::security::MAX_PHOTOS_PER_BATCH;

/// Split `items` into consecutive groups of `size` (at least 1), preserving order.
/// Only the last group may be shorter.
pub fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut groups = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter();

    loop {
        let group: Vec<T> = iter.by_ref().take(size).collect();
        if group.is_empty() {
            break;
        }
        groups.push(group);
    }

    groups
}

/// Partition photos into batches indexed `1..=total`. `batch_size` is clamped to
/// the API's per-group limit.
pub fn partition_batches(unit_id: &str, photos: Vec<EncodedPhoto>, batch_size: usize) -> Vec<Batch> {
    let size = batch_size.clamp(1, MAX_PHOTOS_PER_BATCH);
    let groups = chunk(photos, size);
    let total = groups.len();

    groups
        .into_iter()
        .enumerate()
        .map(|(i, photos)| Batch {
            unit_id: unit_id.to_string(),
            index: i + 1,
            total,
            photos,
        })
        .collect()
}
