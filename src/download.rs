//! Authenticated video downloads
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::COOKIE;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::cookies::{to_header, Credential};
use crate::error::DownloadError;

/// Fetches one video to a local file
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// Download `url` into `destination`, returning the number of bytes written
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        credentials: &[Credential],
    ) -> Result<u64, DownloadError>;
}

/// Streams response bodies straight to disk.
///
/// Failed downloads are not retried and a partially written file is left in
/// place.
#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl VideoFetcher for HttpDownloader {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        credentials: &[Credential],
    ) -> Result<u64, DownloadError> {
        let mut request = self.client.get(url);
        if !credentials.is_empty() {
            request = request.header(COOKIE, to_header(credentials));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|source| DownloadError::CreateFile {
                path: destination.to_path_buf(),
                source,
            })?;

        let write_error = |source| DownloadError::WriteFile {
            path: destination.to_path_buf(),
            source,
        };

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            file.write_all(&data).await.map_err(write_error)?;
            written += data.len() as u64;
        }
        file.flush().await.map_err(write_error)?;

        debug!("Wrote {} bytes to {}", written, destination.display());
        Ok(written)
    }
}
