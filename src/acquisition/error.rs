//! Errors surfaced by [`AcquisitionService`](super::AcquisitionService).

use thiserror::Error;

use crate::content::ContentError;
use crate::decode::DecodeError;
use crate::fetch::FetchError;
use crate::scraper::ScrapeError;

/// Hard failure of a scrape or download call.
///
/// "No scraper applies" and "no decoder applies" are not errors; they lead
/// to the raw fetch fallback and the identity fallback respectively.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The requested URL could not be parsed.
    #[error("invalid URL '{url}': {reason}\n  Suggestion: Pass an absolute http(s) URL")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// An applicable scraper failed. Later scrapers and the raw fetch were
    /// not attempted.
    #[error("scraper '{scraper}' failed: {source}")]
    Scraper {
        /// Name of the failing scraper.
        scraper: String,
        /// The scraper's error, with upstream diagnostic text.
        #[source]
        source: ScrapeError,
    },

    /// The raw fetch fallback failed.
    #[error(transparent)]
    Fetch(FetchError),

    /// A selected decoder failed on the retrieved bytes.
    #[error(transparent)]
    Decode(DecodeError),

    /// The retrieved bytes could not form a content unit.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// The caller cancelled the operation.
    #[error("acquisition of '{url}' cancelled")]
    Cancelled {
        /// URL being acquired.
        url: String,
    },
}

impl AcquisitionError {
    pub(crate) fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    pub(crate) fn from_fetch(url: &str, error: FetchError) -> Self {
        match error {
            FetchError::Cancelled { .. } => Self::cancelled(url),
            FetchError::Content(content) => Self::Content(content),
            other => Self::Fetch(other),
        }
    }

    pub(crate) fn from_decode(url: &str, error: DecodeError) -> Self {
        match error {
            DecodeError::Cancelled { .. } => Self::cancelled(url),
            DecodeError::Content(content) => Self::Content(content),
            other => Self::Decode(other),
        }
    }

    /// Returns true if the caller cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
