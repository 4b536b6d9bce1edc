//! Input download: fetch the bytes behind a pointer URL.
//!
//! All outbound file transfers go through one [`Downloader`]. It owns the
//! HTTP client (connect and read timeouts from [`ServiceConfig`]) and a
//! semaphore sized by `max_concurrent_downloads`. A transfer holds a
//! [`DownloadSlot`] from before the request is sent until the body has been
//! read, so the number of transfers in flight never exceeds the cap, no
//! matter how many requests the server is handling.
//!
//! Graph downloads in [`crate::graph`] take a slot from the same downloader.

use crate::config::ServiceConfig;
use crate::error::SlidecastError;
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// A downloaded body and the content type the server declared for it.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Held for the duration of one transfer. Dropping it frees the slot.
#[derive(Debug)]
pub struct DownloadSlot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for DownloadSlot {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Rate-limited HTTP downloader shared by all requests.
#[derive(Debug)]
pub struct Downloader {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    cap: usize,
}

impl Downloader {
    /// Build the client and limiter from the service configuration.
    pub fn new(config: &ServiceConfig) -> Result<Self, SlidecastError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(|e| SlidecastError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrent_downloads)),
            counters: Arc::new(Counters::default()),
            cap: config.max_concurrent_downloads,
        })
    }

    /// Configured maximum number of concurrent transfers.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Transfers currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous transfers observed since start-up.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Wait for a free transfer slot.
    pub async fn acquire(&self) -> Result<DownloadSlot, SlidecastError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SlidecastError::Internal("download limiter closed".into()))?;

        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);

        Ok(DownloadSlot {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Download `url` into memory.
    pub async fn fetch(&self, url: &str) -> Result<Downloaded, SlidecastError> {
        let parsed = parse_http_url(url)?;

        let _slot = self.acquire().await?;
        info!("Downloading {}", parsed);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlidecastError::DownloadRejected {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(url, e))?;

        debug!(
            "Downloaded {} bytes ({}) from {}",
            bytes.len(),
            content_type.as_deref().unwrap_or("no content type"),
            url
        );

        Ok(Downloaded {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Accept only absolute `http`/`https` URLs.
pub fn parse_http_url(input: &str) -> Result<Url, SlidecastError> {
    let url = Url::parse(input.trim()).map_err(|e| {
        SlidecastError::InvalidInput(format!("file_url is not a valid URL: {}", e))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SlidecastError::InvalidInput(format!(
            "file_url must use http or https, got '{}'",
            other
        ))),
    }
}

fn classify_transport_error(url: &str, e: reqwest::Error) -> SlidecastError {
    if e.is_timeout() {
        SlidecastError::DownloadTimeout {
            url: url.to_string(),
        }
    } else {
        SlidecastError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}
