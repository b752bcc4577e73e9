use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::errors::{AppError, AppResult};
use crate::models::GroupPayload;

/// Telegram caps a media group at 10 items.
pub const MAX_PHOTOS_PER_BATCH: usize = 10;

/// Upper bound for one raw capture read by the submitter.
const MAX_RAW_FILE_SIZE: u64 = 50 * 1024 * 1024;

fn chat_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(-?\d{1,20}|@[A-Za-z][A-Za-z0-9_]{4,31})$").unwrap())
}

fn unsafe_filename_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap())
}

pub struct InputValidator;

impl InputValidator {
    pub fn validate_chat_id(chat_id: &str) -> AppResult<()> {
        let trimmed = chat_id.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("TELEGRAM_CHAT_ID", "Must not be empty"));
        }

        if !chat_id_pattern().is_match(trimmed) {
            return Err(AppError::validation(
                "TELEGRAM_CHAT_ID",
                "Must be a numeric chat id or an @channel name",
            ));
        }

        Ok(())
    }

    pub fn validate_photo_path(path: &str) -> AppResult<()> {
        if path.trim().is_empty() {
            return Err(AppError::validation("photo", "File path cannot be empty"));
        }

        let path_obj = Path::new(path);

        // Check for path traversal attempts
        if path.contains("..") || path.contains('~') {
            return Err(AppError::validation("photo", "Invalid file path detected"));
        }

        if Self::mime_for_path(path).is_none() {
            return Err(AppError::validation(
                "photo",
                &format!("Unsupported image type: {}", path),
            ));
        }

        if !path_obj.is_file() {
            return Err(AppError::validation("photo", &format!("Not a file: {}", path)));
        }

        let metadata = std::fs::metadata(path_obj)?;
        if metadata.len() > MAX_RAW_FILE_SIZE {
            return Err(AppError::validation(
                "photo",
                &format!("File too large (max 50MB): {}", path),
            ));
        }

        Ok(())
    }

    /// MIME type from a photo's extension; `None` for anything that is not an image.
    pub fn mime_for_path(path: &str) -> Option<&'static str> {
        let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            "bmp" => Some("image/bmp"),
            _ => None,
        }
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let sanitized = unsafe_filename_chars().replace_all(filename.trim(), "_");

        if sanitized.is_empty() {
            return "photo.webp".to_string();
        }

        // Limit length
        if sanitized.len() > 255 {
            let mut cut = 252;
            while !sanitized.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}...", &sanitized[..cut])
        } else {
            sanitized.to_string()
        }
    }

    pub fn validate_group_payload(payload: &GroupPayload) -> AppResult<()> {
        if payload.media.is_empty() || payload.media.len() > MAX_PHOTOS_PER_BATCH {
            return Err(AppError::validation("media", "Must contain between 1 and 10 photos"));
        }

        if payload.total == 0 || payload.index == 0 || payload.index > payload.total {
            return Err(AppError::validation("index", "Must satisfy 1 <= index <= total"));
        }

        for (i, photo) in payload.media.iter().enumerate() {
            if !photo.mime.starts_with("image/") {
                return Err(AppError::validation(
                    "media",
                    &format!("Photo #{} has a non-image MIME type", i + 1),
                ));
            }
            if photo.data.is_empty() {
                return Err(AppError::validation(
                    "media",
                    &format!("Photo #{} has no data", i + 1),
                ));
            }
        }

        Ok(())
    }
}
