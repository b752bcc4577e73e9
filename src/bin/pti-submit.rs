use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset, Local};

use pti_uploader::compressor::{Compressor, CompressorSettings, WebpEncoder};
use pti_uploader::config::ClientConfig;
use pti_uploader::models::{RawImage, SubmissionSummary, TimeInfo};
use pti_uploader::relay::{submit, RelayHttpClient, SubmissionPolicy};
use pti_uploader::security::InputValidator;

const USAGE: &str = "usage: pti-submit <summary.json> <photo>...";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(summary_path) = args.next() else {
        bail!(USAGE);
    };
    let photo_paths: Vec<String> = args.collect();
    if photo_paths.is_empty() {
        bail!(USAGE);
    }

    let config = ClientConfig::from_env().context("Failed to load PTI_* configuration")?;
    let summary = load_summary(&summary_path, &config.timezone).await?;

    let images = load_photos(&photo_paths).await?;

    log::info!(
        "Unit {}: {} of {} photos accepted",
        summary.unit.unit_id(),
        images.len(),
        photo_paths.len()
    );

    let compressor = Compressor::new(WebpEncoder, CompressorSettings::from(&config));
    let report = compressor.compress_indexed(images).await;

    for failure in &report.failures {
        log::warn!("{}", failure);
    }
    let encoded_bytes: usize = report.photos.iter().map(|p| p.byte_size).sum();
    log::info!(
        "Compressed {} photos ({} KB total), {} failed",
        report.photos.len(),
        encoded_bytes / 1024,
        report.failures.len()
    );

    let client = RelayHttpClient::new(&config.relay_url)?;
    let policy = SubmissionPolicy::from(&config);
    let sent = submit(&client, summary, report.photos, &policy).await?;

    log::info!(
        "Submission {} complete: {} photos in {} batches",
        sent.session_id,
        sent.photos_sent,
        sent.batches.len()
    );
    Ok(())
}

/// Read the summary JSON, stamping the current time when the file has none.
async fn load_summary(path: &str, timezone: &str) -> anyhow::Result<SubmissionSummary> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;
    let mut value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path))?;

    if value.get("time").map_or(true, |t| t.is_null()) {
        let time = stamp_time(Local::now().fixed_offset(), timezone);
        if let Some(object) = value.as_object_mut() {
            object.insert("time".to_string(), serde_json::to_value(time)?);
        }
    }

    serde_json::from_value(value).with_context(|| format!("Invalid summary in {}", path))
}

/// Read every valid photo, keeping its 0-based argument position so filenames and
/// failure reports name the photo the user passed.
async fn load_photos(paths: &[String]) -> anyhow::Result<Vec<(usize, RawImage)>> {
    let mut images = Vec::with_capacity(paths.len());
    for (position, path) in paths.iter().enumerate() {
        if let Err(e) = InputValidator::validate_photo_path(path) {
            log::warn!("Skipping photo #{} ({}): {}", position + 1, path, e);
            continue;
        }

        let mime = InputValidator::mime_for_path(path).unwrap_or("application/octet-stream");
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path))?;
        images.push((position, RawImage::new(data, mime)));
    }
    Ok(images)
}

/// The human-readable time always names the offset it was formatted in; a
/// configured zone name only fills `tz`.
fn stamp_time(now: DateTime<FixedOffset>, timezone: &str) -> TimeInfo {
    let offset = format!("UTC{}", now.format("%:z"));
    let mut time = TimeInfo::from_datetime(now, &offset);
    if timezone != "local" {
        time.tz = timezone.to_string();
    }
    time
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stamp_time_labels_real_offset() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let time = stamp_time(now, "Europe/Berlin");

        assert_eq!(time.human, "2024-05-01 08:00:00 UTC-05:00");
        assert_eq!(time.tz, "Europe/Berlin");
        assert_eq!(time.iso, "2024-05-01T13:00:00.000Z");
    }

    #[test]
    fn test_stamp_time_local() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let time = stamp_time(now, "local");

        assert_eq!(time.human, "2024-05-01 08:00:00 UTC+02:00");
        assert_eq!(time.tz, "UTC+02:00");
    }

    #[tokio::test]
    async fn test_load_photos_keeps_argument_positions() {
        let dir = std::env::temp_dir();
        let stem = format!("pti_submit_{}", std::process::id());
        let photo = dir.join(format!("{}_a.jpg", stem));
        let notes = dir.join(format!("{}_b.txt", stem));
        let other = dir.join(format!("{}_c.png", stem));
        std::fs::write(&photo, b"jpeg").unwrap();
        std::fs::write(&notes, b"not a photo").unwrap();
        std::fs::write(&other, b"png").unwrap();

        let paths: Vec<String> = [&photo, &notes, &other]
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        let loaded = load_photos(&paths).await;

        for path in [&photo, &notes, &other] {
            let _ = std::fs::remove_file(path);
        }

        let loaded = loaded.unwrap();
        let positions: Vec<usize> = loaded.iter().map(|(i, _)| *i).collect();
        assert_eq!(positions, vec![0, 2]);
        assert_eq!(loaded[1].1.mime, "image/png");
    }
}
