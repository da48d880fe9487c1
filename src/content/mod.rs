//! The normalized content unit produced by every retrieval and decoding step.
//!
//! A [`ContentUnit`] always carries a non-empty payload together with a MIME
//! type. Construction enforces that invariant, so downstream code never has
//! to check for half-built units.

pub mod filename;
pub mod mime;

use bytes::Bytes;
use thiserror::Error;

use self::filename::derive_filename;
use self::mime::{is_textual, normalize_mime};

/// Errors raised when a content unit would violate its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// The retrieved payload was empty.
    #[error(
        "empty payload received from '{source_uri}'\n  Suggestion: Check that the resource exists and is not a zero-length file"
    )]
    EmptyPayload {
        /// Origin of the empty payload.
        source_uri: String,
    },

    /// No MIME type could be associated with the payload.
    #[error("missing MIME type for content from '{source_uri}'")]
    MissingMimeType {
        /// Origin of the untyped payload.
        source_uri: String,
    },
}

/// One retrieved or decoded resource.
///
/// Immutable after construction. Cloning is cheap: the payload is a
/// reference-counted [`Bytes`] buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUnit {
    payload: Bytes,
    mime_type: String,
    filename: Option<String>,
    source_uri: String,
}

impl ContentUnit {
    /// Creates a content unit, normalizing the MIME type to its essence.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::EmptyPayload`] for a zero-length payload and
    /// [`ContentError::MissingMimeType`] for a blank MIME type.
    pub fn new(
        payload: impl Into<Bytes>,
        mime_type: &str,
        source_uri: impl Into<String>,
    ) -> Result<Self, ContentError> {
        let payload = payload.into();
        let source_uri = source_uri.into();
        if payload.is_empty() {
            return Err(ContentError::EmptyPayload { source_uri });
        }
        let mime_type = normalize_mime(mime_type);
        if mime_type.is_empty() {
            return Err(ContentError::MissingMimeType { source_uri });
        }
        Ok(Self {
            payload,
            mime_type,
            filename: None,
            source_uri,
        })
    }

    /// Attaches a display/storage filename. Blank names are ignored.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let trimmed = filename.trim();
        self.filename = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Returns the raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the normalized MIME type.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Returns the explicit filename, if one was attached.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Returns the origin URL of this content.
    #[must_use]
    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    /// Returns the explicit filename or one derived from the source and MIME type.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.filename
            .clone()
            .unwrap_or_else(|| derive_filename(&self.source_uri, &self.mime_type))
    }

    /// Returns the payload length in bytes (always non-zero).
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Returns the payload as UTF-8 text when it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Returns true if the MIME type denotes human-readable text.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        is_textual(&self.mime_type)
    }

    /// Consumes the unit and returns its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Renders a short preview for diagnostics.
    ///
    /// Textual payloads are decoded lossily and cut to `max_chars`
    /// characters; binary payloads are summarized by size.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        if !self.is_textual() {
            return format!("<binary: {} bytes>", self.payload.len());
        }
        let text = String::from_utf8_lossy(&self.payload);
        let mut preview: String = text.chars().take(max_chars).collect();
        if text.chars().count() > max_chars {
            preview.push('…');
        }
        preview
    }
}
