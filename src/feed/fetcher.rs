use futures::StreamExt;
use thiserror::Error;

use crate::feed::model::Feed;
use crate::feed::parser::{parse_feed, ParseError};

/// Cap on feed document size. Podcast feeds run to a few megabytes at most;
/// anything larger is treated as a broken or hostile endpoint.
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving one feed.
///
/// All of them are per-feed recoverable: the feed is abandoned and the run
/// continues with the next one.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// Response body exceeded the size limit
    #[error("feed document too large")]
    ResponseTooLarge,

    /// Document was retrieved but could not be decoded
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Fetches a feed URL and parses the response into a [`Feed`].
///
/// There are no retries and no timeout: a dead feed is reported once and the
/// run moves on, while a hung server blocks the feed task (matching the
/// download side, which also has no cancellation).
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Feed, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    Ok(parse_feed(&bytes)?)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
