//! SharePoint site page JSON to markdown.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::content::mime::SHAREPOINT_PAGE_JSON;

use super::{DecodeError, DecodedContent, Decoder, DecoderOrigin, HtmlDecoder};

#[derive(Debug, Deserialize)]
struct PageFields {
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "CanvasContent1")]
    canvas: Option<String>,
}

/// `odata=verbose` responses wrap the fields in a `d` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageEnvelope {
    Verbose { d: PageFields },
    Plain(PageFields),
}

/// Decoder for [`SHAREPOINT_PAGE_JSON`] produced by the SharePoint scraper.
///
/// The page title becomes the leading heading and the canvas HTML is
/// rendered through [`HtmlDecoder`].
#[derive(Debug, Clone, Default)]
pub struct SharePointPageDecoder {
    html: HtmlDecoder,
}

impl SharePointPageDecoder {
    /// Creates the decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            html: HtmlDecoder::new(),
        }
    }
}

#[async_trait]
impl Decoder for SharePointPageDecoder {
    fn name(&self) -> &str {
        "sharepoint-page"
    }

    fn origin(&self) -> DecoderOrigin {
        DecoderOrigin::Bundled
    }

    fn accepts(&self, mime: &str) -> bool {
        mime == SHAREPOINT_PAGE_JSON
    }

    async fn decode(
        &self,
        bytes: &Bytes,
        source_uri: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DecodedContent>, DecodeError> {
        if cancel.is_cancelled() {
            return Err(DecodeError::cancelled(source_uri));
        }
        let envelope: PageEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| DecodeError::malformed(self.name(), source_uri, e.to_string()))?;
        let fields = match envelope {
            PageEnvelope::Verbose { d } => d,
            PageEnvelope::Plain(fields) => fields,
        };

        let title = fields
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let body = match fields.canvas.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(canvas) => self.html.html_to_markdown(canvas, source_uri)?,
            None => String::new(),
        };
        let body = body.trim();

        let markdown = match (title, body.is_empty()) {
            (None, true) => return Ok(None),
            (Some(title), true) => format!("# {title}\n"),
            (None, false) => format!("{body}\n"),
            (Some(title), false) => format!("# {title}\n\n{body}\n"),
        };
        Ok(Some(DecodedContent::markdown(markdown)))
    }
}
