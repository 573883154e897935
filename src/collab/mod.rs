//! External collaborators the bot talks to.
//!
//! The pipeline only sees the traits defined here; concrete HTTP-backed
//! implementations live in the submodules.
//!
//! # Architecture
//!
//! - [`SubmissionSource`]: newest submissions + live metadata refresh
//! - [`CommentHistory`]: has a given account already replied?
//! - [`ImageFetcher`]: download and decode the image behind a URL
//! - [`Translator`]: OCR + translation service returning [`TranslationRegion`]s
//! - [`ImageHost`]: public image upload
//! - [`Publisher`]: post the reply

pub mod fetch;
pub mod imgur;
pub mod reddit;
pub mod translate;

use std::io::Cursor;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::queue::QueueItem;

pub use fetch::HttpImageFetcher;
pub use imgur::ImgurHost;
pub use reddit::RedditClient;
pub use translate::{TranslateError, TranslationClient};

/// Collaborator call errors
#[derive(Error, Debug)]
pub enum CollabError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} responded with status {status}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("malformed {service} response: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

pub type Result<T> = std::result::Result<T, CollabError>;

/// Live metadata re-read for a queued item on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemMetadata {
    pub view_count: u64,
}

/// One text region found by the translation service.
///
/// Coordinates are source-image pixels. Field names follow the service's
/// camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRegion {
    pub original_language: String,
    /// Empty means "no overlay for this region".
    pub translated_text: String,
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl TranslationRegion {
    #[must_use]
    pub fn width(&self) -> f32 {
        (self.max_x - self.min_x).max(0.0)
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        (self.max_y - self.min_y).max(0.0)
    }

    /// Whether this region gets a bubble and text.
    #[must_use]
    pub fn has_text(&self) -> bool {
        !self.translated_text.trim().is_empty()
    }
}

/// Source of candidate submissions.
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    /// Newest submissions, newest first.
    async fn latest(&self) -> Result<Vec<QueueItem>>;

    /// Re-read the live metadata of one item.
    async fn refresh(&self, item: &QueueItem) -> Result<ItemMetadata>;
}

#[async_trait]
pub trait CommentHistory: Send + Sync {
    /// Whether `author` already has a top-level comment on `item`.
    async fn has_commented(&self, item: &QueueItem, author: &str) -> Result<bool>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download and decode. `None` on any failure (dead link, 404, corrupt data).
    async fn fetch(&self, url: &Url) -> Option<RgbaImage>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Detect and translate text regions. A non-success status is an error.
    async fn translate(
        &self,
        image: &RgbaImage,
    ) -> std::result::Result<Vec<TranslationRegion>, TranslateError>;
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload and return the public link, `None` if the host is unavailable.
    async fn upload(&self, image: &RgbaImage) -> Option<Url>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn reply(&self, item: &QueueItem, body: &str) -> Result<()>;
}

/// Encode as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> std::result::Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Encode as a `data:image/png;base64,...` URL.
pub fn png_data_url(image: &RgbaImage) -> std::result::Result<String, image::ImageError> {
    let png = encode_png(image)?;
    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png)
    ))
}

/// Strip a `data:<mime>;base64,` prefix if present.
#[must_use]
pub fn strip_data_url_prefix(data: &str) -> &str {
    if data.starts_with("data:") {
        if let Some(idx) = data.find(";base64,") {
            return &data[idx + ";base64,".len()..];
        }
    }
    data
}
