//! Per-episode destination resolution and the overwrite/staleness decision.
//!
//! For each feed item the resolver computes the destination path (default
//! last-URL-segment naming, or the configured extraction rule), stats the
//! destination, and decides whether the episode is new, an overwrite-eligible
//! rerun, or already archived.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::extract::ExtractError;
use crate::feed::model::{Enclosure, Item};
use crate::queue::DownloadJob;

/// Per-item failures. All recoverable: the episode is skipped, the feed
/// continues.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("item '{0}' has no enclosure")]
    NoEnclosure(String),

    #[error("invalid enclosure URL '{url}': {source}")]
    Url {
        url: String,
        source: url::ParseError,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("enclosure URL '{0}' has no usable filename")]
    NoFilename(String),
}

/// Outcome of the overwrite/staleness policy for one destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Destination does not exist.
    DownloadNew,
    /// Destination exists and is older than the configured maximum age —
    /// the feed is presumably rerunning the episode.
    DownloadOverwrite,
    Skip,
}

/// Applies the overwrite policy. `age` is the existing file's age (`None`
/// when the file does not exist); a zero `max_age` disables overwriting.
pub fn decide(age: Option<Duration>, max_age: Duration) -> Decision {
    match age {
        None => Decision::DownloadNew,
        Some(_) if max_age.is_zero() => Decision::Skip,
        Some(age) if age > max_age => Decision::DownloadOverwrite,
        Some(_) => Decision::Skip,
    }
}

/// Strips non-ASCII characters from a channel title and replaces spaces with
/// underscores, producing a filesystem-safe directory name.
pub fn channel_dir(title: &str) -> String {
    title
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

pub struct Resolver {
    config: Arc<Config>,
}

impl Resolver {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Resolves one item to a download job, or `None` when the policy says
    /// skip. Errors are per-item and leave the rest of the feed unaffected.
    pub fn resolve(
        &self,
        channel_dir: &str,
        item: &Item,
    ) -> Result<Option<DownloadJob>, ResolveError> {
        let enclosure = item
            .enclosure
            .as_ref()
            .ok_or_else(|| ResolveError::NoEnclosure(item.title.clone()))?;
        let resolved = Url::parse(&enclosure.url).map_err(|source| ResolveError::Url {
            url: enclosure.url.clone(),
            source,
        })?;

        let filename = self.destination_filename(item, enclosure, &resolved)?;
        let dest = self.config.dest_dir.join(channel_dir).join(&filename);

        let age = destination_age(&dest, SystemTime::now());
        match decide(age, self.config.max_age) {
            Decision::Skip => {
                if let Some(age) = age {
                    tracing::info!(
                        path = %dest.display(),
                        age_secs = age.as_secs(),
                        "Skipping, already downloaded"
                    );
                }
                Ok(None)
            }
            Decision::DownloadOverwrite => {
                tracing::info!(
                    path = %dest.display(),
                    age_secs = age.map(|a| a.as_secs()).unwrap_or(0),
                    "Existing file is stale, downloading again"
                );
                Ok(Some(DownloadJob { url: resolved, dest }))
            }
            Decision::DownloadNew => {
                tracing::debug!(path = %dest.display(), "New episode, downloading");
                Ok(Some(DownloadJob { url: resolved, dest }))
            }
        }
    }

    fn destination_filename(
        &self,
        item: &Item,
        enclosure: &Enclosure,
        resolved: &Url,
    ) -> Result<String, ResolveError> {
        match &self.config.rule {
            Some(rule) => {
                let stem = rule.filename_stem(item, enclosure, resolved)?;
                Ok(match url_extension(resolved) {
                    Some(ext) => format!("{stem}.{ext}"),
                    None => stem,
                })
            }
            None => resolved
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                .map(str::to_owned)
                .ok_or_else(|| ResolveError::NoFilename(resolved.to_string())),
        }
    }
}

/// File extension of the URL's path, without the dot.
fn url_extension(url: &Url) -> Option<&str> {
    Path::new(url.path()).extension().and_then(|e| e.to_str())
}

/// Age of the file at `path`, truncated to whole seconds. `None` when the
/// file does not exist. Stat failures other than NotFound are treated the
/// same as NotFound (the download proceeds) but logged so permission or I/O
/// problems on the destination stay diagnosable.
fn destination_age(path: &Path, now: SystemTime) -> Option<Duration> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot stat destination, treating as missing");
            return None;
        }
    };
    let mtime = match metadata.modified() {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "No modification time, treating as missing");
            return None;
        }
    };
    let age = now.duration_since(mtime).unwrap_or_default();
    Some(Duration::from_secs(age.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionRule;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn config(dir: &Path, max_age: Duration, rule: Option<ExtractionRule>) -> Arc<Config> {
        Arc::new(Config {
            dest_dir: dir.to_path_buf(),
            max_age,
            rule,
        })
    }

    fn item_with_enclosure(title: &str, url: &str) -> Item {
        Item {
            title: title.to_string(),
            enclosure: Some(Enclosure {
                url: url.to_string(),
                mime_type: "audio/mpeg".to_string(),
                length: 1000,
            }),
            ..Item::default()
        }
    }

    // Decision table

    #[test]
    fn test_missing_file_downloads_regardless_of_max_age() {
        assert_eq!(decide(None, Duration::ZERO), Decision::DownloadNew);
        assert_eq!(decide(None, DAY), Decision::DownloadNew);
    }

    #[test]
    fn test_existing_file_skipped_when_overwrite_disabled() {
        assert_eq!(decide(Some(100 * DAY), Duration::ZERO), Decision::Skip);
    }

    #[test]
    fn test_stale_file_overwritten() {
        assert_eq!(
            decide(Some(DAY + Duration::from_secs(1)), DAY),
            Decision::DownloadOverwrite
        );
    }

    #[test]
    fn test_fresh_file_skipped() {
        assert_eq!(decide(Some(DAY), DAY), Decision::Skip);
        assert_eq!(decide(Some(Duration::ZERO), DAY), Decision::Skip);
    }

    proptest! {
        #[test]
        fn prop_overwrite_iff_age_exceeds_max_age(age_secs in 0u64..10_000_000, max_secs in 1u64..10_000_000) {
            let decision = decide(
                Some(Duration::from_secs(age_secs)),
                Duration::from_secs(max_secs),
            );
            if age_secs > max_secs {
                prop_assert_eq!(decision, Decision::DownloadOverwrite);
            } else {
                prop_assert_eq!(decision, Decision::Skip);
            }
        }
    }

    // Sanitization

    #[test]
    fn test_channel_dir_replaces_spaces() {
        assert_eq!(channel_dir("This American Life"), "This_American_Life");
    }

    #[test]
    fn test_channel_dir_strips_non_ascii() {
        assert_eq!(channel_dir("Café Molté"), "Caf_Molt");
        assert_eq!(channel_dir("日本語"), "");
    }

    // Filename derivation

    #[test]
    fn test_default_filename_is_last_path_segment() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(config(dir.path(), Duration::ZERO, None));
        let item = item_with_enclosure("x", "https://cdn.example.com/shows/ep01.mp3?tok=abc");

        let job = resolver.resolve("Show", &item).unwrap().unwrap();
        assert_eq!(job.dest, dir.path().join("Show").join("ep01.mp3"));
    }

    #[test]
    fn test_extracted_filename_keeps_url_extension() {
        let dir = tempfile::tempdir().unwrap();
        let rule = ExtractionRule::compile(r"item.title episode-(\d+)").unwrap();
        let resolver = Resolver::new(config(dir.path(), Duration::ZERO, Some(rule)));
        let item = item_with_enclosure(
            "episode-42: hello",
            "https://dts.podtrac.com/redirect.mp3/cdn.example.com/default.mp3",
        );

        let job = resolver.resolve("Show", &item).unwrap().unwrap();
        assert_eq!(job.dest, dir.path().join("Show").join("42.mp3"));
    }

    #[test]
    fn test_extraction_failure_skips_episode() {
        let dir = tempfile::tempdir().unwrap();
        let rule = ExtractionRule::compile(r"item.title episode-(\d+)").unwrap();
        let resolver = Resolver::new(config(dir.path(), Duration::ZERO, Some(rule)));
        let item = item_with_enclosure("hello", "https://cdn.example.com/default.mp3");

        let err = resolver.resolve("Show", &item).unwrap_err();
        assert!(matches!(err, ResolveError::Extract(_)));
    }

    #[test]
    fn test_missing_enclosure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(config(dir.path(), Duration::ZERO, None));
        let item = Item {
            title: "no media".to_string(),
            ..Item::default()
        };

        let err = resolver.resolve("Show", &item).unwrap_err();
        assert!(matches!(err, ResolveError::NoEnclosure(_)));
    }

    #[test]
    fn test_invalid_enclosure_url_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(config(dir.path(), Duration::ZERO, None));
        let item = item_with_enclosure("x", "not a url at all");

        let err = resolver.resolve("Show", &item).unwrap_err();
        assert!(matches!(err, ResolveError::Url { .. }));
    }

    #[test]
    fn test_url_without_filename_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(config(dir.path(), Duration::ZERO, None));
        let item = item_with_enclosure("x", "https://cdn.example.com/");

        let err = resolver.resolve("Show", &item).unwrap_err();
        assert!(matches!(err, ResolveError::NoFilename(_)));
    }

    // Policy applied against the real filesystem

    #[test]
    fn test_existing_fresh_file_resolves_to_skip() {
        let dir = tempfile::tempdir().unwrap();
        let dest_dir = dir.path().join("Show");
        std::fs::create_dir_all(&dest_dir).unwrap();
        std::fs::write(dest_dir.join("ep01.mp3"), b"audio").unwrap();

        let resolver = Resolver::new(config(dir.path(), 30 * DAY, None));
        let item = item_with_enclosure("x", "https://cdn.example.com/ep01.mp3");
        assert!(resolver.resolve("Show", &item).unwrap().is_none());
    }

    #[test]
    fn test_existing_stale_file_resolves_to_download() {
        let dir = tempfile::tempdir().unwrap();
        let dest_dir = dir.path().join("Show");
        std::fs::create_dir_all(&dest_dir).unwrap();
        let path = dest_dir.join("ep01.mp3");
        std::fs::write(&path, b"audio").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - 40 * DAY).unwrap();

        let resolver = Resolver::new(config(dir.path(), 30 * DAY, None));
        let item = item_with_enclosure("x", "https://cdn.example.com/ep01.mp3");
        assert!(resolver.resolve("Show", &item).unwrap().is_some());
    }

    #[test]
    fn test_existing_file_skipped_when_rerun_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let dest_dir = dir.path().join("Show");
        std::fs::create_dir_all(&dest_dir).unwrap();
        let path = dest_dir.join("ep01.mp3");
        std::fs::write(&path, b"audio").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - 400 * DAY).unwrap();

        let resolver = Resolver::new(config(dir.path(), Duration::ZERO, None));
        let item = item_with_enclosure("x", "https://cdn.example.com/ep01.mp3");
        assert!(resolver.resolve("Show", &item).unwrap().is_none());
    }
}
