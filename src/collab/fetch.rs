//! Image download and decode.

use async_trait::async_trait;
use image::RgbaImage;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::ImageFetcher;

/// Fetches images over HTTP and decodes them with the `image` crate.
pub struct HttpImageFetcher {
    http: Client,
}

impl HttpImageFetcher {
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    async fn try_fetch(&self, url: &Url) -> anyhow::Result<RgbaImage> {
        let bytes = self
            .http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        decode(&bytes)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    #[instrument(skip(self, url), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Option<RgbaImage> {
        // Deleted posts, dead links and hosts that are down are routine.
        match self.try_fetch(url).await {
            Ok(image) => {
                debug!(width = image.width(), height = image.height(), "Image decoded");
                Some(image)
            }
            Err(e) => {
                debug!("Image unavailable: {e:#}");
                None
            }
        }
    }
}

fn decode(bytes: &[u8]) -> anyhow::Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}
