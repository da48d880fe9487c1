//! Error types for raw retrieval.

use thiserror::Error;

use crate::content::ContentError;

/// Errors raised by the raw fetcher and by scrapers' HTTP calls.
///
/// `HttpStatus` keeps the upstream response body so callers can show the
/// real diagnostic instead of a generic message.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection refused, TLS).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}: {body}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Response body (truncated) as diagnostic text.
        body: String,
    },

    /// The URL is malformed or uses an unsupported scheme.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// The response body exceeded the configured size cap.
    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge {
        /// The URL whose body was too large.
        url: String,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// An HTML login page came back where a binary document was expected.
    #[error(
        "[AUTH] login redirect for {domain} fetching {url}\n  Suggestion: The resource requires sign-in; configure delegated access for this host"
    )]
    LoginRedirect {
        /// The requested URL.
        url: String,
        /// Domain of the login page.
        domain: String,
    },

    /// The caller cancelled the request.
    #[error("fetch of {url} cancelled")]
    Cancelled {
        /// The URL being fetched.
        url: String,
    },

    /// HTTP client could not be constructed.
    #[error("HTTP client for {component} unavailable: {reason}")]
    ClientBuild {
        /// Component that tried to build the client.
        component: String,
        /// Why construction failed.
        reason: String,
    },

    /// The response could not form a valid content unit.
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl FetchError {
    /// Creates a network error from a reqwest error, classifying timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error carrying the response body.
    pub fn http_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    pub(crate) fn client_build(component: &str, reason: &str) -> Self {
        Self::ClientBuild {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns the HTTP status when this error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for authentication/authorization rejections.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::LoginRedirect { .. })
            || self.status().is_some_and(|s| matches!(s, 401 | 403 | 407))
    }

    /// Returns true for failures worth trying against another destination.
    ///
    /// Used by the upload chain; the acquisition pipeline never retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => {
                matches!(*status, 404 | 408 | 409 | 423 | 429) || *status >= 500
            }
            _ => false,
        }
    }
}
