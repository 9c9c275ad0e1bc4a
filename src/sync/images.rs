//! Image downloads

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::{http, Result, SyncError};
use crate::core::catalog::Catalog;
use crate::core::config::IngestionConfig;

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Downloads card and logo images referenced by input rows
pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

/// Fetches over HTTP with the configured browser user agent; some CDNs
/// refuse requests without one
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(config: &IngestionConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.http_timeout_secs, &config.image_user_agent, None)?,
        })
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let response = http::check(self.client.get(url).send()?)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        if let Some(ct) = &content_type {
            if !ct.starts_with("image/") {
                return Err(SyncError::Decode(format!(
                    "{} returned {} instead of an image",
                    url, ct
                )));
            }
        }
        let bytes = response.bytes()?.to_vec();
        debug!(url, len = bytes.len(), "image downloaded");
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

/// Download an image and store it in the catalog; returns its content hash
pub fn download_and_store(
    catalog: &Catalog,
    fetcher: &dyn ImageFetcher,
    url: &str,
) -> Result<String> {
    let image = fetcher.fetch(url).map_err(|e| {
        warn!(url, error = %e, "image download failed");
        e
    })?;
    Ok(catalog.store_image(url, image.content_type.as_deref(), &image.bytes)?)
}
