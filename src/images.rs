//! Remote image retrieval for the random image send.

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Rubber duck pictures picked from when no URLs are configured.
pub const DEFAULT_IMAGE_URLS: &[&str] = &[
    "https://upload.wikimedia.org/wikipedia/commons/d/d5/Rubber_duck_assisting_with_debugging.jpg",
    "https://upload.wikimedia.org/wikipedia/commons/thumb/d/d5/Rubber_duck_assisting_with_debugging.jpg/800px-Rubber_duck_assisting_with_debugging.jpg",
    "https://images.unsplash.com/photo-1563906267088-b029e7101114?w=400",
    "https://images.unsplash.com/photo-1544947950-fa07a98d237f?w=400",
    "https://images.unsplash.com/photo-1563906267088-b029e7101114?ixlib=rb-4.0.3&w=400",
    "https://images.unsplash.com/photo-1544947950-fa07a98d237f?ixlib=rb-4.0.3&w=400",
];

/// Sent in place of an image that couldn't be delivered.
pub const DEFAULT_FALLBACK_TEXT: &str = "🦆🦆🦆 QUACK ATTACK! 🦆🦆🦆";

/// Error type for image downloads
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Nothing to pick from
    #[error("No image URLs configured")]
    NoCandidates,

    /// Transport-level failure (DNS, TLS, timeout)
    #[error("Download failed: {0}")]
    Request(String),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Server answered with no body
    #[error("Empty response from {0}")]
    Empty(String),

    /// Writing the transient file failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Fetches a URL into a writer.
pub trait ImageFetcher {
    /// Download `url` into `dest`, returning the number of bytes written.
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64, DownloadError>;
}

/// Blocking HTTP(S) fetcher.
pub struct HttpImageFetcher {
    client: reqwest::blocking::Client,
}

impl HttpImageFetcher {
    /// Build a fetcher; `timeout` of `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self, DownloadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("spam-reply/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DownloadError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64, DownloadError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DownloadError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let written = io::copy(&mut response, dest)?;
        if written == 0 {
            return Err(DownloadError::Empty(url.to_string()));
        }

        debug!(url, bytes = written, "image_downloaded");
        Ok(written)
    }
}
