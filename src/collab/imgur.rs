//! Anonymous Imgur upload.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use image::RgbaImage;
use reqwest::Client;
use serde::Deserialize;
use tracing::{instrument, warn};
use url::Url;

use super::{encode_png, CollabError, ImageHost};

const UPLOAD_URL: &str = "https://api.imgur.com/3/image";

/// Uploads composited images to Imgur with a client id.
pub struct ImgurHost {
    http: Client,
    client_id: String,
}

impl ImgurHost {
    #[must_use]
    pub fn new(http: Client, client_id: impl Into<String>) -> Self {
        Self {
            http,
            client_id: client_id.into(),
        }
    }

    async fn try_upload(&self, image: &RgbaImage) -> anyhow::Result<Url> {
        if self.client_id.is_empty() {
            return Err(CollabError::MissingCredential("imgur client id").into());
        }

        let payload = general_purpose::STANDARD.encode(encode_png(image)?);
        let response = self
            .http
            .post(UPLOAD_URL)
            .header("Authorization", format!("Client-ID {}", self.client_id))
            .form(&[("image", payload.as_str()), ("type", "base64")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollabError::Status {
                service: "imgur",
                status,
            }
            .into());
        }

        let body: UploadResponse = response.json().await?;
        parse_link(&body)
    }
}

#[async_trait]
impl ImageHost for ImgurHost {
    #[instrument(skip_all)]
    async fn upload(&self, image: &RgbaImage) -> Option<Url> {
        // Imgur goes down for maintenance or load; not worth retrying.
        match self.try_upload(image).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Imgur upload failed: {e:#}");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadData,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    link: Option<String>,
}

fn parse_link(body: &UploadResponse) -> anyhow::Result<Url> {
    let link = body.data.link.as_deref().ok_or(CollabError::Malformed {
        service: "imgur",
        detail: "missing data.link".to_string(),
    })?;
    Ok(Url::parse(link)?)
}
