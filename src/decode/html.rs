//! HTML to markdown using `html2text`.

use std::io::Cursor;
use std::sync::LazyLock;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::{DecodeError, DecodedContent, Decoder, DecoderOrigin};

/// Wrap width passed to `html2text`.
const DEFAULT_LINE_WIDTH: usize = 120;

/// Elements removed before conversion; they never carry document content.
#[allow(clippy::expect_used)]
static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["script", "style", "noscript", "nav", "footer", "template", "title"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("noise pattern is valid") // Static pattern, safe to panic
        })
        .collect()
});

#[allow(clippy::expect_used)]
static TITLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("title pattern is valid")
});

#[allow(clippy::expect_used)]
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank-run pattern is valid"));

/// Decoder for `text/html` and `application/xhtml+xml`.
#[derive(Debug, Clone)]
pub struct HtmlDecoder {
    line_width: usize,
}

impl Default for HtmlDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlDecoder {
    /// Creates a decoder with the default wrap width.
    #[must_use]
    pub fn new() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
        }
    }

    /// Overrides the wrap width.
    #[must_use]
    pub fn with_line_width(mut self, line_width: usize) -> Self {
        self.line_width = line_width.max(20);
        self
    }

    /// Converts an HTML document or fragment to markdown.
    ///
    /// The `<title>`, when present, becomes a leading `#` heading. Returns an
    /// empty string when the document has no visible text.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if `html2text` rejects the input.
    pub fn html_to_markdown(&self, html: &str, source_uri: &str) -> Result<String, DecodeError> {
        let title = extract_title(html);
        let mut cleaned = html.to_string();
        for pattern in NOISE_PATTERNS.iter() {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }

        let body = html2text::from_read(Cursor::new(cleaned.as_bytes()), self.line_width)
            .map_err(|e| DecodeError::malformed("html", source_uri, e.to_string()))?;
        let body = tidy(&body);

        Ok(match title {
            Some(title) if !body.starts_with(&format!("# {title}")) => {
                if body.is_empty() {
                    format!("# {title}\n")
                } else {
                    format!("# {title}\n\n{body}")
                }
            }
            _ => body,
        })
    }
}

fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_PATTERN.captures(html)?.get(1)?.as_str();
    let title = html_escape::decode_html_entities(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

fn tidy(markdown: &str) -> String {
    let trimmed_lines: Vec<&str> = markdown.lines().map(str::trim_end).collect();
    let joined = trimmed_lines.join("\n");
    let collapsed = BLANK_RUNS.replace_all(joined.trim(), "\n\n");
    if collapsed.is_empty() {
        String::new()
    } else {
        format!("{collapsed}\n")
    }
}

#[async_trait]
impl Decoder for HtmlDecoder {
    fn name(&self) -> &str {
        "html"
    }

    fn origin(&self) -> DecoderOrigin {
        DecoderOrigin::Bundled
    }

    fn accepts(&self, mime: &str) -> bool {
        matches!(mime, "text/html" | "application/xhtml+xml")
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
        let html = String::from_utf8_lossy(bytes);
        if html.trim().is_empty() {
            return Ok(None);
        }
        let markdown = self.html_to_markdown(&html, source_uri)?;
        Ok((!markdown.trim().is_empty()).then(|| DecodedContent::markdown(markdown)))
    }
}
