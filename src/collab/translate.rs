//! Client for the OCR + translation service.
//!
//! Request body:
//!
//! ```json
//! { "base64Images": ["data:image/png;base64,..."], "apiKey": "..." }
//! ```
//!
//! The response carries one region list per submitted image:
//!
//! ```json
//! { "images": [[{ "originalLanguage": "jp", "translatedText": "...", "minX": 0, ... }]] }
//! ```

use async_trait::async_trait;
use image::RgbaImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use super::{png_data_url, TranslationRegion, Translator};

/// Translation service errors
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("translation request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("translation transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid translation response: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    base64_images: Vec<String>,
    api_key: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    images: Vec<Vec<TranslationRegion>>,
}

/// HTTP client for the translation endpoint.
pub struct TranslationClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl TranslationClient {
    #[must_use]
    pub fn new(http: Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Translator for TranslationClient {
    #[instrument(skip(self, image), fields(endpoint = %self.endpoint))]
    async fn translate(&self, image: &RgbaImage) -> Result<Vec<TranslationRegion>, TranslateError> {
        // The API accepts several images; one per request is all the bot needs.
        let request = TranslateRequest {
            base64_images: vec![png_data_url(image)?],
            api_key: &self.api_key,
        };

        let response = self.http.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Status { status, body });
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Decode(e.to_string()))?;

        let regions = first_image_regions(parsed)?;
        debug!(regions = regions.len(), "Translation received");
        Ok(regions)
    }
}

fn first_image_regions(response: TranslateResponse) -> Result<Vec<TranslationRegion>, TranslateError> {
    response
        .images
        .into_iter()
        .next()
        .ok_or_else(|| TranslateError::Decode("response contained no images".to_string()))
}
