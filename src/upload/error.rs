//! Error types for the upload chain.

use thiserror::Error;

use crate::auth::AuthError;
use crate::fetch::FetchError;

/// Failure writing to a storage root.
///
/// [`UploadError::is_recoverable`] decides whether the upload chain moves on
/// to the next candidate root or stops.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The filename cannot be written anywhere.
    #[error("invalid upload filename '{filename}'\n  Suggestion: Provide a non-empty file name")]
    InvalidFilename {
        /// The rejected name.
        filename: String,
    },

    /// The root URI cannot be addressed by the writer.
    #[error("storage root '{root}' cannot be used: {reason}")]
    InvalidRoot {
        /// Root URI.
        root: String,
        /// Why the writer rejected it.
        reason: String,
    },

    /// No delegated token could be obtained for the root's host.
    #[error("no credentials for storage root '{root}': {source}")]
    Auth {
        /// Root URI.
        root: String,
        /// Token provider error.
        #[source]
        source: AuthError,
    },

    /// The destination rejected the credentials.
    #[error(
        "[AUTH] storage root '{root}' rejected the upload: {reason}\n  Suggestion: Check the write scopes granted for this host in the tenant configuration"
    )]
    Rejected {
        /// Root URI.
        root: String,
        /// Upstream diagnostic text.
        reason: String,
    },

    /// The write request failed.
    #[error("upload to '{root}' failed: {source}")]
    Fetch {
        /// Root URI.
        root: String,
        /// Underlying HTTP failure.
        #[source]
        source: FetchError,
    },

    /// The destination accepted the write but answered unexpectedly.
    #[error("unexpected upload response from '{root}': {reason}")]
    InvalidResponse {
        /// Root URI.
        root: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The caller cancelled.
    #[error("upload to '{root}' cancelled")]
    Cancelled {
        /// Root URI being written when cancellation fired.
        root: String,
    },
}

impl UploadError {
    /// Maps an HTTP failure against `root`.
    pub(crate) fn from_fetch(root: &str, error: FetchError) -> Self {
        if matches!(error, FetchError::Cancelled { .. }) {
            return Self::Cancelled {
                root: root.to_string(),
            };
        }
        if error.is_auth_rejection() {
            return Self::Rejected {
                root: root.to_string(),
                reason: error.to_string(),
            };
        }
        Self::Fetch {
            root: root.to_string(),
            source: error,
        }
    }

    /// Maps a token provider failure against `root`.
    pub(crate) fn from_auth(root: &str, error: AuthError) -> Self {
        if matches!(error, AuthError::Cancelled { .. }) {
            return Self::Cancelled {
                root: root.to_string(),
            };
        }
        Self::Auth {
            root: root.to_string(),
            source: error,
        }
    }

    /// Returns true when another root may still succeed.
    ///
    /// Recoverable: unusable roots, hosts with no granted scopes, transient
    /// HTTP statuses (404, 408, 409, 423, 429, 5xx) and network failures.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidRoot { .. } => true,
            Self::Auth { source, .. } => matches!(source, AuthError::NoScopes { .. }),
            Self::Fetch { source, .. } => source.is_transient(),
            Self::InvalidFilename { .. }
            | Self::Rejected { .. }
            | Self::InvalidResponse { .. }
            | Self::Cancelled { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://contoso.sharepoint.com/sites/Team/Shared Documents";

    #[test]
    fn test_transient_statuses_are_recoverable() {
        for status in [404, 409, 423, 429, 500, 503] {
            let err = UploadError::from_fetch(ROOT, FetchError::http_status(ROOT, status, "x"));
            assert!(err.is_recoverable(), "status {status} should be recoverable");
        }
        let err = UploadError::from_fetch(ROOT, FetchError::http_status(ROOT, 400, "bad"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_auth_rejection_is_fatal() {
        let err = UploadError::from_fetch(ROOT, FetchError::http_status(ROOT, 403, "denied"));
        assert!(matches!(err, UploadError::Rejected { .. }));
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_cancellation_is_fatal() {
        let err = UploadError::from_fetch(ROOT, FetchError::cancelled(ROOT));
        assert!(matches!(err, UploadError::Cancelled { .. }));
        assert!(!err.is_recoverable());

        let err = UploadError::from_auth(
            ROOT,
            AuthError::Cancelled {
                host: "contoso.sharepoint.com".to_string(),
            },
        );
        assert!(matches!(err, UploadError::Cancelled { .. }));
    }

    #[test]
    fn test_missing_scopes_is_recoverable() {
        let err = UploadError::from_auth(
            ROOT,
            AuthError::NoScopes {
                tenant_id: "t".to_string(),
                host: "contoso.sharepoint.com".to_string(),
            },
        );
        assert!(err.is_recoverable());
        let err = UploadError::from_auth(
            ROOT,
            AuthError::Rejected {
                host: "contoso.sharepoint.com".to_string(),
                reason: "expired".to_string(),
            },
        );
        assert!(!err.is_recoverable());
    }
}
