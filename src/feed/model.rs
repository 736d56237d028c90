//! Structured representation of a podcast feed.
//!
//! The model mirrors the subset of RSS 2.0 + itunes extensions that matters
//! for archiving: channel metadata, episode items, and the enclosure that
//! carries the actual media reference. Scalar wire formats (timestamps,
//! durations, keyword lists) are decoded by the explicit parse functions in
//! this module, invoked by the parser after structural decoding.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// Publish timestamps use the feed wire format: RFC 1123 with a numeric
/// zone, a subset of RFC 2822.
pub type Timestamp = DateTime<FixedOffset>;

/// A parsed feed document. Owns exactly one channel.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub channel: Channel,
}

/// Channel metadata plus its items, in document order.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub title: String,
    pub description: String,
    pub author: String,
    pub link: String,
    pub language: String,
    pub copyright: String,
    pub subtitle: String,
    pub summary: String,
    pub explicit: String,
    pub owner: Option<Owner>,
    pub image: Option<Image>,
    pub categories: Vec<String>,
    pub last_build: Option<Timestamp>,
    pub pub_date: Option<Timestamp>,
    pub items: Vec<Item>,
}

/// A single episode entry.
///
/// Scalar fields that fail to parse are left at their zero value rather than
/// failing the document; the parser logs the offending input.
#[derive(Debug, Clone, Default)]
pub struct Item {
    pub title: String,
    pub author: String,
    pub category: String,
    pub description: String,
    pub pub_date: Option<Timestamp>,
    pub duration: Option<EpisodeDuration>,
    pub keywords: Vec<String>,
    pub guid: Option<Guid>,
    pub enclosure: Option<Enclosure>,
}

/// The media-file reference attached to an item.
#[derive(Debug, Clone, Default)]
pub struct Enclosure {
    /// URL exactly as it appeared in the document.
    pub url: String,
    pub mime_type: String,
    /// Declared byte length; 0 when absent or malformed.
    pub length: u64,
}

/// Opaque item identifier. Not necessarily a URL.
#[derive(Debug, Clone)]
pub struct Guid {
    pub value: String,
    pub is_permalink: bool,
}

impl Default for Guid {
    fn default() -> Self {
        // RSS treats guids as permalinks unless isPermaLink="false"
        Self {
            value: String::new(),
            is_permalink: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Owner {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct Image {
    pub href: String,
}

// ============================================================================
// Scalar parse functions
// ============================================================================

/// Positional weights for colon-separated durations, least-significant
/// component first: seconds, minutes, hours, days.
const DURATION_WEIGHTS: [u64; 4] = [1, 60, 3600, 86400];

/// Episode duration in whole seconds.
///
/// Feeds publish durations as `HH:MM:SS`, `MM:SS`, or bare seconds; the
/// `Display` impl renders the same colon form so extraction patterns written
/// against feed text also match the rendered value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeDuration(u64);

impl EpisodeDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EpisodeDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (h, m, s) = (self.0 / 3600, (self.0 % 3600) / 60, self.0 % 60);
        if h > 0 {
            write!(f, "{}:{:02}:{:02}", h, m, s)
        } else {
            write!(f, "{}:{:02}", m, s)
        }
    }
}

#[derive(Debug, Error)]
pub enum DurationError {
    #[error("duration '{input}' has more than {max} components")]
    TooManyComponents { input: String, max: usize },

    #[error("duration '{input}' component '{component}' is not a number")]
    NotNumeric { input: String, component: String },
}

/// Parses a colon-separated duration: 1 to 4 components, least-significant
/// first, so `"3723"` is 3723 seconds and `"1:02:03"` is 1h 2m 3s.
pub fn parse_duration(input: &str) -> Result<EpisodeDuration, DurationError> {
    let chunks: Vec<&str> = input.split(':').collect();
    if chunks.len() > DURATION_WEIGHTS.len() {
        return Err(DurationError::TooManyComponents {
            input: input.to_string(),
            max: DURATION_WEIGHTS.len(),
        });
    }
    let mut secs: u64 = 0;
    for (weight, chunk) in DURATION_WEIGHTS.iter().zip(chunks.iter().rev()) {
        let n: u64 = chunk.parse().map_err(|_| DurationError::NotNumeric {
            input: input.to_string(),
            component: chunk.to_string(),
        })?;
        secs += n * weight;
    }
    Ok(EpisodeDuration(secs))
}

/// Parses an RFC 1123 timestamp with numeric zone (e.g.
/// `"Mon, 02 Jan 2006 15:04:05 -0700"`). Invalid input is an error; the
/// caller decides whether that fails the document or just the field.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, chrono::ParseError> {
    DateTime::parse_from_rfc2822(input)
}

/// Splits a comma-separated keyword scalar into trimmed, ordered strings.
pub fn parse_keywords(input: &str) -> Vec<String> {
    input.split(',').map(|k| k.trim().to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================
