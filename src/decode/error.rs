//! Error types for decoders.

use thiserror::Error;

use crate::content::ContentError;

/// Errors raised while decoding a content unit.
///
/// Declining to decode is not an error; decoders return `Ok(None)` and the
/// unit passes through unchanged.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload claimed a supported type but could not be parsed.
    #[error("{decoder} decoder could not read content from '{source_uri}': {reason}")]
    Malformed {
        /// Decoder that failed.
        decoder: String,
        /// Origin of the payload.
        source_uri: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// Cancellation fired before or during decoding.
    #[error("decoding of '{source_uri}' cancelled")]
    Cancelled {
        /// Origin of the payload.
        source_uri: String,
    },

    /// Decoded output could not form a content unit.
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl DecodeError {
    /// Creates a malformed-payload error.
    pub fn malformed(
        decoder: impl Into<String>,
        source_uri: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Malformed {
            decoder: decoder.into(),
            source_uri: source_uri.into(),
            reason: reason.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(source_uri: impl Into<String>) -> Self {
        Self::Cancelled {
            source_uri: source_uri.into(),
        }
    }
}
