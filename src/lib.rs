//! Pre-trip inspection uploads: compress a batch of photos to small WebP files and
//! relay them, with a formatted summary, to a Telegram chat.

pub mod compressor;
pub mod config;
pub mod errors;
pub mod models;
pub mod relay;
pub mod security;
pub mod server;

pub use errors::{AppError, AppResult};
