//! Error types for scrapers and the scraper resolution loop.

use thiserror::Error;

use crate::auth::AuthError;
use crate::content::ContentError;
use crate::fetch::FetchError;

/// Hard failure raised by an applicable scraper.
///
/// "Not applicable" is never an error; scrapers return
/// [`ScrapeOutcome::NotApplicable`](super::ScrapeOutcome::NotApplicable) instead.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The host rejected the delegated token.
    #[error(
        "[AUTH] {host} rejected delegated credentials (HTTP {status}): {body}\n  Suggestion: Check the scopes granted for this host in the tenant configuration"
    )]
    AuthRejected {
        /// Host that rejected the request.
        host: String,
        /// HTTP status code (401/403/407).
        status: u16,
        /// Upstream diagnostic text.
        body: String,
    },

    /// No token could be obtained for the host.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The scraper's HTTP call failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The provider answered with something the scraper cannot interpret.
    #[error("unexpected response from {url}: {reason}")]
    InvalidResponse {
        /// URL that produced the response.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The retrieved bytes could not form a content unit.
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl ScrapeError {
    /// Maps a fetch error, promoting auth statuses to [`ScrapeError::AuthRejected`].
    pub(crate) fn from_fetch(host: &str, error: FetchError) -> Self {
        match error {
            FetchError::HttpStatus { status, body, .. } if matches!(status, 401 | 403 | 407) => {
                Self::AuthRejected {
                    host: host.to_string(),
                    status,
                    body,
                }
            }
            other => Self::Fetch(other),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the failure was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError::Cancelled { .. }) | Self::Auth(AuthError::Cancelled { .. })
        )
    }
}

/// Error from the ordered scraper attempt loop.
#[derive(Debug, Error)]
pub enum ScrapeAttemptError {
    /// Cancellation fired before the next scraper could start.
    #[error("scraping cancelled before '{next}' started")]
    Cancelled {
        /// Scraper that would have run next.
        next: String,
    },

    /// An applicable scraper failed; iteration stopped there.
    #[error("scraper '{scraper}' failed: {source}")]
    Failed {
        /// Name of the failing scraper.
        scraper: String,
        /// The scraper's error.
        #[source]
        source: ScrapeError,
    },
}
