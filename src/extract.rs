//! Filename extraction rules for feeds behind tracking redirectors.
//!
//! Some publishers route every enclosure through a redirect service, so the
//! URL path ends in the same generic filename for every episode. An
//! extraction rule — one instruction string of the form `"<field> <pattern>"`
//! — recovers a usable filename stem by running a regex over a chosen item
//! field and keeping the first non-empty capture.

use regex::Regex;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::feed::model::{Enclosure, Item};

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Instruction names a field outside the supported set. Startup-fatal.
    #[error("unknown extraction field '{0}'")]
    UnknownField(String),

    /// Instruction has no pattern part. Startup-fatal.
    #[error("extraction instruction needs the form \"<field> <pattern>\"")]
    MissingPattern,

    /// Pattern failed to compile. Startup-fatal.
    #[error("invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A pattern without capturing groups can never yield a stem. Startup-fatal.
    #[error("extraction pattern has no capturing group")]
    NoCaptureGroup,

    /// The pattern found nothing in this episode's field. Per-episode.
    #[error("no filename match in field '{field}' for {url}")]
    NoMatch { field: String, url: String },
}

/// The item fields an extraction rule may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector {
    ItemAuthor,
    ItemCategory,
    ItemDescription,
    ItemDuration,
    ItemGuid,
    ItemPubDate,
    ItemTitle,
    EnclosureUrl,
    /// The fully resolved enclosure URL as a string.
    Url,
}

impl FieldSelector {
    fn as_str(&self) -> &'static str {
        match self {
            Self::ItemAuthor => "item.author",
            Self::ItemCategory => "item.category",
            Self::ItemDescription => "item.description",
            Self::ItemDuration => "item.duration",
            Self::ItemGuid => "item.guid",
            Self::ItemPubDate => "item.pubDate",
            Self::ItemTitle => "item.title",
            Self::EnclosureUrl => "enclosure.url",
            Self::Url => "url",
        }
    }
}

impl FromStr for FieldSelector {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item.author" => Ok(Self::ItemAuthor),
            "item.category" => Ok(Self::ItemCategory),
            "item.description" => Ok(Self::ItemDescription),
            "item.duration" => Ok(Self::ItemDuration),
            "item.guid" => Ok(Self::ItemGuid),
            "item.pubDate" => Ok(Self::ItemPubDate),
            "item.title" => Ok(Self::ItemTitle),
            "enclosure.url" => Ok(Self::EnclosureUrl),
            "url" => Ok(Self::Url),
            other => Err(ExtractError::UnknownField(other.to_string())),
        }
    }
}

impl std::fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled extraction rule. Built once at startup, immutable thereafter.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    field: FieldSelector,
    pattern: Regex,
}

impl ExtractionRule {
    /// Compiles an instruction string of the form `"<field> <pattern>"`.
    ///
    /// The pattern part is trimmed of surrounding whitespace and `/`
    /// delimiters before compiling. All failures here are configuration
    /// errors the caller should treat as fatal.
    pub fn compile(instruction: &str) -> Result<Self, ExtractError> {
        let (field, raw_pattern) = instruction
            .trim()
            .split_once(' ')
            .ok_or(ExtractError::MissingPattern)?;
        let field: FieldSelector = field.trim().parse()?;
        let raw_pattern = raw_pattern.trim_matches(|c: char| c.is_whitespace() || c == '/');
        if raw_pattern.is_empty() {
            return Err(ExtractError::MissingPattern);
        }
        tracing::debug!(field = %field, pattern = raw_pattern, "Compiling extraction rule");
        let pattern = Regex::new(raw_pattern)?;
        // captures_len counts the implicit whole-match group 0
        if pattern.captures_len() < 2 {
            return Err(ExtractError::NoCaptureGroup);
        }
        Ok(Self { field, pattern })
    }

    /// Applies the rule to one episode, returning the filename stem: the
    /// first non-empty capturing group of the first match against the
    /// selected field.
    pub fn filename_stem(
        &self,
        item: &Item,
        enclosure: &Enclosure,
        resolved: &Url,
    ) -> Result<String, ExtractError> {
        let haystack = self.select(item, enclosure, resolved);
        let no_match = || ExtractError::NoMatch {
            field: self.field.to_string(),
            url: resolved.to_string(),
        };

        let captures = self.pattern.captures(&haystack).ok_or_else(&no_match)?;
        captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .find(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(no_match)
    }

    fn select(&self, item: &Item, enclosure: &Enclosure, resolved: &Url) -> String {
        match self.field {
            FieldSelector::ItemAuthor => item.author.clone(),
            FieldSelector::ItemCategory => item.category.clone(),
            FieldSelector::ItemDescription => item.description.clone(),
            FieldSelector::ItemDuration => {
                item.duration.map(|d| d.to_string()).unwrap_or_default()
            }
            FieldSelector::ItemGuid => item
                .guid
                .as_ref()
                .map(|g| g.value.clone())
                .unwrap_or_default(),
            FieldSelector::ItemPubDate => item
                .pub_date
                .map(|ts| ts.to_rfc2822())
                .unwrap_or_default(),
            FieldSelector::ItemTitle => item.title.clone(),
            FieldSelector::EnclosureUrl => enclosure.url.clone(),
            FieldSelector::Url => resolved.to_string(),
        }
    }
}
