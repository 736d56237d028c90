//! Configuration: an optional TOML settings file plus the resolved,
//! immutable [`Config`] the rest of the program runs on.
//!
//! The settings file is optional — a missing file yields
//! `Settings::default()`. Command-line flags take precedence over file
//! values. `Config` is constructed once in `main` and passed to the
//! resolver and pipeline; nothing reads configuration globally.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::extract::{ExtractError, ExtractionRule};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid extraction instruction: {0}")]
    Extract(#[from] ExtractError),
}

// ============================================================================
// Settings file
// ============================================================================

/// Values loadable from a TOML settings file.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified;
/// missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Destination root for downloaded episodes.
    pub destination: Option<PathBuf>,

    /// Maximum age in days before an existing file is eligible for
    /// re-download. 0 = never overwrite.
    pub max_age_days: u64,

    /// Extraction instruction, e.g. `"item.title episode-(\d+)"`.
    pub extract: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// - Missing file → `Ok(Settings::default())`
    /// - Empty file → `Ok(Settings::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Settings file is empty, using defaults");
            return Ok(Self::default());
        }

        let settings: Settings = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Immutable run configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Destination root; episode directories are created beneath it.
    pub dest_dir: PathBuf,

    /// Staleness threshold for the overwrite policy; zero disables
    /// overwriting entirely.
    pub max_age: Duration,

    /// Compiled extraction rule, when one was configured.
    pub rule: Option<ExtractionRule>,
}

impl Config {
    /// Combines file settings and flag overrides into a `Config`, compiling
    /// the extraction rule. Rule compilation failures are fatal here, before
    /// any feed is touched.
    pub fn resolve(
        settings: Settings,
        dest_flag: Option<PathBuf>,
        max_age_days_flag: Option<u64>,
        extract_flag: Option<String>,
    ) -> Result<Self, ConfigError> {
        let dest_dir = dest_flag
            .or(settings.destination)
            .unwrap_or_else(|| PathBuf::from("."));
        let max_age_days = max_age_days_flag.unwrap_or(settings.max_age_days);
        let instruction = extract_flag.or(settings.extract);

        let rule = instruction
            .as_deref()
            .map(ExtractionRule::compile)
            .transpose()?;

        Ok(Self {
            dest_dir,
            max_age: Duration::from_secs(max_age_days * 86_400),
            rule,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
