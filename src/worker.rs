//! Sequential download worker.
//!
//! Drains the job queue one transfer at a time: create the destination
//! directory, create/truncate the file, stream the response body to disk,
//! then pause before the next job to throttle request rate against the
//! origin server. A failed job is logged and abandoned — any partial file is
//! left in place — and the worker moves on.

use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::queue::{DownloadJob, JobConsumer};

/// Pause applied after every job, whether it succeeded or failed.
pub const PACING_DELAY: Duration = Duration::from_secs(2);

/// Per-job failures. The job is abandoned; queue processing continues.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
}

pub struct Worker {
    client: reqwest::Client,
    pacing: Duration,
}

impl Worker {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            pacing: PACING_DELAY,
        }
    }

    /// Consumes jobs until the queue is closed and drained.
    pub async fn run(self, mut jobs: JobConsumer) {
        tracing::debug!("Download task starting");
        while let Some(job) = jobs.dequeue().await {
            match self.download(&job).await {
                Ok(bytes) => {
                    tracing::info!(bytes = bytes, path = %job.dest.display(), "Episode downloaded");
                }
                Err(e) => {
                    tracing::error!(url = %job.url, path = %job.dest.display(), error = %e, "Download failed");
                }
            }
            tokio::time::sleep(self.pacing).await;
        }
        tracing::debug!("All downloads complete, download task finishing");
    }

    async fn download(&self, job: &DownloadJob) -> Result<u64, DownloadError> {
        tracing::debug!(url = %job.url, path = %job.dest.display(), "Beginning download");

        if let Some(dir) = job.dest.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::File::create(&job.dest).await?;

        let response = self.client.get(job.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus(response.status().as_u16()));
        }

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
