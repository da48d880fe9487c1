//! MIME-driven decoding of raw payloads into normalized text.
//!
//! Decoders turn provider-specific or binary formats (HTML, OOXML packages,
//! SharePoint page JSON) into markdown. The [`DecoderRegistry`] picks one
//! decoder per unit, preferring [`DecoderOrigin::Bundled`] decoders over
//! externally contributed ones, and falls back to returning the unit
//! untouched when nothing applies.

mod error;
mod html;
mod office;
mod registry;
mod sharepoint_page;

pub use error::DecodeError;
pub use html::HtmlDecoder;
pub use office::OfficeDecoder;
pub use registry::DecoderRegistry;
pub use sharepoint_page::SharePointPageDecoder;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// Markdown output MIME type.
pub const MARKDOWN: &str = "text/markdown";

/// Plain text output MIME type.
pub const PLAIN_TEXT: &str = "text/plain";

/// Builds the decoder registry shipped with the gateway.
#[must_use]
pub fn build_default_decoder_registry() -> DecoderRegistry {
    let mut registry = DecoderRegistry::new();
    registry.register(Box::new(SharePointPageDecoder::new()));
    registry.register(Box::new(OfficeDecoder::new()));
    registry.register(Box::new(HtmlDecoder::new()));
    registry
}

/// Where a decoder comes from; bundled decoders win ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecoderOrigin {
    /// Shipped with the acquisition subsystem.
    Bundled,
    /// Contributed by another component of the host.
    External,
}

/// Normalized output of a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedContent {
    /// Decoded text.
    pub text: String,
    /// MIME type of `text`.
    pub mime_type: String,
}

impl DecodedContent {
    /// Wraps markdown output.
    #[must_use]
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mime_type: MARKDOWN.to_string(),
        }
    }

    /// Wraps plain text output.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mime_type: PLAIN_TEXT.to_string(),
        }
    }

    /// File extension matching the output type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        if self.mime_type == MARKDOWN {
            ".md"
        } else {
            ".txt"
        }
    }
}

/// Trait implemented by every payload decoder.
///
/// `accepts` receives a normalized MIME type and must be cheap. `decode`
/// returns `Ok(None)` to decline, which leaves the unit unchanged.
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Returns the decoder's name (e.g. "html", "office").
    fn name(&self) -> &str;

    /// Returns where the decoder comes from. Defaults to external.
    fn origin(&self) -> DecoderOrigin {
        DecoderOrigin::External
    }

    /// Returns true if this decoder handles `mime`.
    fn accepts(&self, mime: &str) -> bool;

    /// Decodes `bytes` fetched from `source_uri`.
    async fn decode(
        &self,
        bytes: &Bytes,
        source_uri: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DecodedContent>, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_content_extension() {
        assert_eq!(DecodedContent::markdown("x").extension(), ".md");
        assert_eq!(DecodedContent::plain("x").extension(), ".txt");
    }

    #[test]
    fn test_default_registry_prefers_bundled_order() {
        let registry = build_default_decoder_registry();
        assert_eq!(registry.names(), vec!["sharepoint-page", "office", "html"]);
    }
}
