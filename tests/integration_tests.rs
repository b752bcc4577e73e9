use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pti_uploader::{
    compressor::{
        Compressor, CompressorSettings, EncodedImage, PhotoEncoder, Preset, WebpEncoder,
    },
    errors::{AppError, AppResult},
    models::{Driver, EncodedPhoto, RawImage, SubmissionSummary, TimeInfo, Unit},
    relay::{
        submit, ApiReply, MediaGroupUpload, MessagingApi, Relay, RelayHttpClient, RelaySettings,
        SubmissionPolicy, TextMessage,
    },
    security::InputValidator,
    server::{build_router, AppState},
};

// Integration tests for the PTI uploader. The compressor, the submission
// orchestrator, the HTTP entrypoint and the relay run together; only the messaging
// API is faked.

#[derive(Debug, Clone, PartialEq)]
enum Delivered {
    Summary(String),
    Album(Vec<String>),
}

/// Stand-in for the Telegram Bot API.
#[derive(Default)]
struct FakeTelegram {
    album_replies: Mutex<VecDeque<ApiReply>>,
    log: Mutex<Vec<Delivered>>,
}

impl FakeTelegram {
    fn with_album_replies(replies: Vec<ApiReply>) -> Self {
        Self {
            album_replies: Mutex::new(replies.into()),
            log: Mutex::new(Vec::new()),
        }
    }

    fn log(&self) -> Vec<Delivered> {
        self.log.lock().unwrap().clone()
    }

    fn albums(&self) -> Vec<Vec<String>> {
        self.log()
            .into_iter()
            .filter_map(|d| match d {
                Delivered::Album(captions) => Some(captions),
                Delivered::Summary(_) => None,
            })
            .collect()
    }
}

fn ok() -> ApiReply {
    ApiReply::new(200, r#"{"ok":true,"result":[{"message_id":42}]}"#)
}

#[async_trait]
impl MessagingApi for FakeTelegram {
    async fn send_message(&self, message: &TextMessage) -> AppResult<ApiReply> {
        self.log
            .lock()
            .unwrap()
            .push(Delivered::Summary(message.text.clone()));
        Ok(ok())
    }

    async fn send_media_group(&self, upload: &MediaGroupUpload) -> AppResult<ApiReply> {
        let captions = upload.manifest.iter().map(|m| m.caption.clone()).collect();
        self.log.lock().unwrap().push(Delivered::Album(captions));
        Ok(self
            .album_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ok))
    }
}

/// Instant encoder: a fixed small output for every preset, failing for images whose
/// first byte is `fail_on`.
struct TinyEncoder {
    fail_on: Option<u8>,
}

impl PhotoEncoder for TinyEncoder {
    fn encode(&self, source: &[u8], _mime: &str, preset: &Preset) -> AppResult<EncodedImage> {
        if self.fail_on.is_some() && source.first().copied() == self.fail_on {
            return Err(AppError::Encoder("corrupt capture".to_string()));
        }
        let (width, height) = preset.scaled_dimensions(3024, 4032);
        Ok(EncodedImage {
            bytes: vec![0x52, 0x49, 0x46, 0x46],
            width,
            height,
        })
    }
}

fn relay_settings() -> RelaySettings {
    RelaySettings {
        chat_id: "-1001234567890".to_string(),
        thread_id: Some(7),
        retry_multiplier: 1.0,
        max_send_attempts: 5,
        rate_limit_fallback_secs: 0.05,
    }
}

/// Spawn the HTTP entrypoint on an ephemeral port and return its base URL.
async fn spawn_relay(api: Arc<FakeTelegram>) -> String {
    let app = build_router(AppState {
        relay: Arc::new(Relay::new(api, relay_settings())),
        pacing_delay: Duration::from_millis(5),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn summary() -> SubmissionSummary {
    SubmissionSummary {
        driver: Driver {
            first_name: "Ivan".to_string(),
            last_name: "Petrov".to_string(),
        },
        unit: Unit {
            truck: "512".to_string(),
            trailer: "T-88".to_string(),
        },
        comment: Some("Tires OK".to_string()),
        time: TimeInfo {
            human: "2024-05-01 08:00:00 America/Chicago".to_string(),
            iso: "2024-05-01T13:00:00.000Z".to_string(),
            tz: "America/Chicago".to_string(),
        },
        location: None,
        acquisition_method: None,
        photos: None,
    }
}

fn captures(count: u8) -> Vec<RawImage> {
    (1..=count)
        .map(|n| RawImage::new(vec![n, 0, 0], "image/jpeg"))
        .collect()
}

fn fast_policy() -> SubmissionPolicy {
    SubmissionPolicy {
        pacing_delay: Duration::from_millis(5),
        ..SubmissionPolicy::default()
    }
}

async fn compress(count: u8, fail_on: Option<u8>) -> Vec<EncodedPhoto> {
    let compressor = Compressor::new(TinyEncoder { fail_on }, CompressorSettings::default());
    let report = compressor.compress_all(captures(count)).await;
    assert_eq!(report.attempted(), count as usize);
    report.photos
}

#[tokio::test]
async fn test_full_submission_over_http() {
    let telegram = Arc::new(FakeTelegram::default());
    let base_url = spawn_relay(telegram.clone()).await;

    let photos = compress(23, None).await;
    assert_eq!(photos.len(), 23);

    let client = RelayHttpClient::new(&base_url).unwrap();
    let report = submit(&client, summary(), photos, &fast_policy())
        .await
        .unwrap();

    assert_eq!(report.photos_sent, 23);
    assert_eq!(report.batches.len(), 3);
    assert!(report.batches.iter().all(|b| b.attempts == 1));

    let log = telegram.log();
    assert_eq!(log.len(), 4);
    match &log[0] {
        Delivered::Summary(text) => {
            assert!(text.contains("*Unit:* `512` / `T-88`"));
            assert!(text.contains("*Photos:* 23 files in 3 album(s)"));
            assert!(text.contains("> Tires OK"));
        }
        other => panic!("summary should be sent first, got {:?}", other),
    }

    let albums = telegram.albums();
    let sizes: Vec<usize> = albums.iter().map(|a| a.len()).collect();
    assert_eq!(sizes, vec![10, 10, 3]);
    assert_eq!(albums[0][0], "(1/3) 512/T-88 #1");
    assert_eq!(albums[1][9], "(2/3) 512/T-88 #10");
    assert_eq!(albums[2][2], "(3/3) 512/T-88 #3");
}

#[tokio::test]
async fn test_rejected_batch_stops_submission() {
    let telegram = Arc::new(FakeTelegram::with_album_replies(vec![
        ok(),
        ApiReply::new(
            400,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: group send failed"}"#,
        ),
    ]));
    let base_url = spawn_relay(telegram.clone()).await;

    let client = RelayHttpClient::new(&base_url).unwrap();
    let err = submit(&client, summary(), compress(23, None).await, &fast_policy())
        .await
        .unwrap_err();

    match &err {
        AppError::PartialDelivery {
            delivered, total, ..
        } => {
            assert_eq!(*delivered, 1);
            assert_eq!(*total, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.upstream_status(), Some(400));
    assert!(err.is_fatal_for_submission());

    // Batch 3 never reached the API
    assert_eq!(telegram.albums().len(), 2);
}

#[tokio::test]
async fn test_rate_limited_batch_is_retried_through_http() {
    let telegram = Arc::new(FakeTelegram::with_album_replies(vec![ApiReply::new(
        429,
        r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 0","parameters":{"retry_after":0}}"#,
    )]));
    let base_url = spawn_relay(telegram.clone()).await;

    let client = RelayHttpClient::new(&base_url).unwrap();
    let report = submit(&client, summary(), compress(20, None).await, &fast_policy())
        .await
        .unwrap();

    assert_eq!(report.batches[0].attempts, 2);
    assert_eq!(report.batches[1].attempts, 1);
    assert_eq!(telegram.albums().len(), 3);
}

#[tokio::test]
async fn test_compression_failure_can_trip_photo_minimum() {
    let photos = compress(20, Some(7)).await;
    assert_eq!(photos.len(), 19);

    let telegram = Arc::new(FakeTelegram::default());
    let relay = Relay::new(telegram.clone(), relay_settings());
    let err = submit(&relay, summary(), photos, &fast_policy())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation { .. }));
    assert!(telegram.log().is_empty());
}

#[tokio::test]
async fn test_in_process_relay_submission() {
    let telegram = Arc::new(FakeTelegram::default());
    let relay = Relay::new(telegram.clone(), relay_settings());

    let policy = SubmissionPolicy {
        min_photos: 1,
        ..fast_policy()
    };
    let report = submit(&relay, summary(), compress(4, None).await, &policy)
        .await
        .unwrap();

    assert_eq!(report.batches.len(), 1);
    assert_eq!(telegram.albums()[0].len(), 4);
}

fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

#[tokio::test]
async fn test_webp_compression_of_real_images() {
    let compressor = Compressor::new(WebpEncoder, CompressorSettings::default());
    let images = vec![
        RawImage::new(sample_png(1600, 1200), "image/png"),
        RawImage::new(sample_png(300, 200), "image/png"),
    ];

    let report = compressor.compress_all(images).await;
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.photos.len(), 2);

    for photo in &report.photos {
        assert_eq!(photo.mime, "image/webp");
        assert!(photo.width.max(photo.height) <= 1200);
        assert!(photo.byte_size > 0);
    }

    // Small images are never upscaled
    assert!(report
        .photos
        .iter()
        .any(|p| (p.width, p.height) == (300, 200)));
}

#[test]
fn test_photo_path_validation_with_real_file() {
    let dir = std::env::temp_dir();
    let photo_path = dir.join(format!("pti_integration_{}.png", std::process::id()));
    let text_path = dir.join(format!("pti_integration_{}.txt", std::process::id()));

    std::fs::write(&photo_path, sample_png(4, 4)).unwrap();
    std::fs::write(&text_path, b"not a photo").unwrap();

    let photo = photo_path.to_string_lossy().to_string();
    let text = text_path.to_string_lossy().to_string();

    let photo_result = InputValidator::validate_photo_path(&photo);
    let text_result = InputValidator::validate_photo_path(&text);

    let _ = std::fs::remove_file(&photo_path);
    let _ = std::fs::remove_file(&text_path);

    assert!(photo_result.is_ok(), "{:?}", photo_result);
    assert!(matches!(text_result, Err(AppError::Validation { .. })));
    assert_eq!(InputValidator::mime_for_path(&photo), Some("image/png"));
}
