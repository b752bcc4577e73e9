use async_trait::async_trait;
use base64::Engine;
use reqwest::{multipart, Client};
use serde::Serialize;
use std::fmt;

use super::rate_limit::ApiReply;
use crate::config::RelayConfig;
use crate::errors::{AppError, AppResult};
use crate::models::Batch;
use crate::security::InputValidator;

/// The two messaging operations the relay needs. Implementations only move bytes;
/// interpreting the reply is the caller's job.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn send_message(&self, message: &TextMessage) -> AppResult<ApiReply>;

    async fn send_media_group(&self, upload: &MediaGroupUpload) -> AppResult<ApiReply>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextMessage {
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
}

impl TextMessage {
    pub fn markdown(chat_id: &str, thread_id: Option<i64>, text: String) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            message_thread_id: thread_id,
            text,
            parse_mode: Some("Markdown"),
        }
    }
}

/// One entry of the `media` manifest, pointing at a named multipart part.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InputMediaPhoto {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub field_name: String,
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// A batch decoded and laid out for `sendMediaGroup`. Built once per batch and
/// turned into a fresh form for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaGroupUpload {
    pub chat_id: String,
    pub message_thread_id: Option<i64>,
    pub files: Vec<MediaFile>,
    pub manifest: Vec<InputMediaPhoto>,
}

impl MediaGroupUpload {
    pub fn from_batch(batch: &Batch, chat_id: &str, thread_id: Option<i64>) -> AppResult<Self> {
        let mut files = Vec::with_capacity(batch.photos.len());
        let mut manifest = Vec::with_capacity(batch.photos.len());

        for (i, photo) in batch.photos.iter().enumerate() {
            let position = i + 1;
            let field_name = format!("file{}", position);
            let bytes = base64::engine::general_purpose::STANDARD.decode(photo.data.as_bytes())?;

            files.push(MediaFile {
                field_name: field_name.clone(),
                filename: InputValidator::sanitize_filename(&photo.filename),
                mime: photo.mime.clone(),
                bytes,
            });
            manifest.push(InputMediaPhoto {
                kind: "photo",
                media: format!("attach://{}", field_name),
                caption: batch.caption(position),
            });
        }

        Ok(Self {
            chat_id: chat_id.to_string(),
            message_thread_id: thread_id,
            files,
            manifest,
        })
    }

    pub fn manifest_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(&self.manifest)?)
    }

    pub fn build_form(&self) -> AppResult<multipart::Form> {
        let mut form = multipart::Form::new().text("chat_id", self.chat_id.clone());

        if let Some(thread_id) = self.message_thread_id {
            form = form.text("message_thread_id", thread_id.to_string());
        }

        form = form.text("media", self.manifest_json()?);

        for file in &self.files {
            let part = multipart::Part::bytes(file.bytes.clone())
                .file_name(file.filename.clone())
                .mime_str(&file.mime)?;

            form = form.part(file.field_name.clone(), part);
        }

        Ok(form)
    }
}

/// Telegram Bot API client.
pub struct TelegramClient {
    client: Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(config: &RelayConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            api_base: config.telegram_api_base.trim_end_matches('/').to_string(),
            token: config.telegram_bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn read_reply(response: reqwest::Response) -> AppResult<ApiReply> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| AppError::Network(e.without_url()))?;
        let reply = ApiReply::new(status, body);

        log::debug!("Telegram response {}: {}", status, reply.preview());
        Ok(reply)
    }
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl MessagingApi for TelegramClient {
    async fn send_message(&self, message: &TextMessage) -> AppResult<ApiReply> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(message)
            .send()
            .await
            // The URL carries the bot token
            .map_err(|e| AppError::Network(e.without_url()))?;

        Self::read_reply(response).await
    }

    async fn send_media_group(&self, upload: &MediaGroupUpload) -> AppResult<ApiReply> {
        let form = upload.build_form()?;

        log::debug!(
            "sendMediaGroup: {} files for chat {}",
            upload.files.len(),
            upload.chat_id
        );

        let response = self
            .client
            .post(self.method_url("sendMediaGroup"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Network(e.without_url()))?;

        Self::read_reply(response).await
    }
}
