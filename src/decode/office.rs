//! Text extraction from OOXML packages (`.docx`, `.pptx`, `.xlsx`).
//!
//! Only the text runs are read; layout, images and formulas are ignored.
//! Slides and sheets become `##` headings, spreadsheet rows become markdown
//! table rows.

use std::borrow::Cow;
use std::io::{Cursor, Read};
use std::sync::LazyLock;

use async_trait::async_trait;
use bytes::Bytes;
use html_escape::decode_html_entities;
use regex::{Captures, Regex};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zip::ZipArchive;

use crate::content::mime::{DOCX, PPTX, XLSX};

use super::{DecodeError, DecodedContent, Decoder, DecoderOrigin};

/// Largest single package part read into memory (32 MiB).
const MAX_PART_BYTES: u64 = 32 * 1024 * 1024;

/// Text runs, run-level tabs and line breaks. Tab stops inside `<w:tabs>`
/// carry attributes and are not matched.
#[allow(clippy::expect_used)]
static WORD_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:(tab)\s*/>|<w:(br|cr)\b[^>]*/>")
        .expect("valid pattern")
});

#[allow(clippy::expect_used)]
static WORD_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<w:pStyle\s+w:val="([^"]+)""#).expect("valid pattern")
});

#[allow(clippy::expect_used)]
static DRAWING_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<a:t(?:\s[^>]*)?>([^<]*)</a:t>|<a:(tab)\s*/>|<a:(br)\b").expect("valid pattern")
});

#[allow(clippy::expect_used)]
static SHARED_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<si>(.*?)</si>").expect("valid pattern"));

#[allow(clippy::expect_used)]
static SHEET_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<t(?:\s[^>]*)?>([^<]*)</t>").expect("valid pattern"));

#[allow(clippy::expect_used)]
static SHEET_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<row\b[^>]*>(.*?)</row>").expect("valid pattern"));

#[allow(clippy::expect_used)]
static SHEET_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").expect("valid pattern")
});

#[allow(clippy::expect_used)]
static CELL_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<v>([^<]*)</v>").expect("valid pattern"));

#[allow(clippy::expect_used)]
static SHEET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<sheet\b[^>]*\bname="([^"]*)""#).expect("valid pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageKind {
    Word,
    Presentation,
    Spreadsheet,
}

impl PackageKind {
    fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            DOCX => Some(Self::Word),
            PPTX => Some(Self::Presentation),
            XLSX => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

/// Decoder for Word, PowerPoint and Excel OOXML packages.
#[derive(Debug, Clone, Default)]
pub struct OfficeDecoder;

impl OfficeDecoder {
    /// Creates the decoder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Decoder for OfficeDecoder {
    fn name(&self) -> &str {
        "office"
    }

    fn origin(&self) -> DecoderOrigin {
        DecoderOrigin::Bundled
    }

    fn accepts(&self, mime: &str) -> bool {
        PackageKind::from_mime(mime).is_some()
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
        let payload = bytes.clone();
        let source = source_uri.to_string();
        let markdown = tokio::task::spawn_blocking(move || extract_markdown(&payload, &source))
            .await
            .map_err(|e| DecodeError::malformed("office", source_uri, e.to_string()))??;
        Ok(markdown.map(DecodedContent::markdown))
    }
}

/// Opens the package, sniffs its kind from the parts present and extracts text.
fn extract_markdown(bytes: &[u8], source_uri: &str) -> Result<Option<String>, DecodeError> {
    let malformed = |reason: String| DecodeError::malformed("office", source_uri, reason);
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| malformed(format!("not an OOXML package: {e}")))?;

    let names: Vec<String> = archive.file_names().map(ToString::to_string).collect();
    let kind = if names.iter().any(|n| n == "word/document.xml") {
        PackageKind::Word
    } else if names.iter().any(|n| n.starts_with("ppt/slides/slide")) {
        PackageKind::Presentation
    } else if names.iter().any(|n| n.starts_with("xl/worksheets/sheet")) {
        PackageKind::Spreadsheet
    } else {
        debug!(source = %source_uri, "Package has no recognised document part");
        return Ok(None);
    };

    let markdown = match kind {
        PackageKind::Word => {
            let xml = read_part(&mut archive, "word/document.xml").map_err(malformed)?;
            word_to_markdown(&xml)
        }
        PackageKind::Presentation => {
            let mut sections = Vec::new();
            for (index, name) in numbered_parts(&names, "ppt/slides/slide").iter().enumerate() {
                let xml = read_part(&mut archive, name).map_err(malformed)?;
                let body = drawing_paragraphs(&xml).join("\n\n");
                if !body.is_empty() {
                    sections.push(format!("## Slide {}\n\n{body}", index + 1));
                }
            }
            sections.join("\n\n")
        }
        PackageKind::Spreadsheet => {
            let shared = if names.iter().any(|n| n == "xl/sharedStrings.xml") {
                shared_strings(&read_part(&mut archive, "xl/sharedStrings.xml").map_err(malformed)?)
            } else {
                Vec::new()
            };
            let sheet_names = if names.iter().any(|n| n == "xl/workbook.xml") {
                workbook_sheet_names(&read_part(&mut archive, "xl/workbook.xml").map_err(malformed)?)
            } else {
                Vec::new()
            };
            let mut sections = Vec::new();
            for (index, name) in numbered_parts(&names, "xl/worksheets/sheet").iter().enumerate() {
                let xml = read_part(&mut archive, name).map_err(malformed)?;
                let table = sheet_to_table(&xml, &shared);
                if !table.is_empty() {
                    let title = sheet_names
                        .get(index)
                        .cloned()
                        .unwrap_or_else(|| format!("Sheet {}", index + 1));
                    sections.push(format!("## {title}\n\n{table}"));
                }
            }
            sections.join("\n\n")
        }
    };

    let markdown = markdown.trim();
    Ok((!markdown.is_empty()).then(|| format!("{markdown}\n")))
}

fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String, String> {
    let part = archive
        .by_name(name)
        .map_err(|e| format!("missing part {name}: {e}"))?;
    let mut xml = String::new();
    part.take(MAX_PART_BYTES)
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable part {name}: {e}"))?;
    Ok(xml)
}

/// Returns `{prefix}N.xml` parts ordered by N.
fn numbered_parts(names: &[String], prefix: &str) -> Vec<String> {
    let mut parts: Vec<(u32, String)> = names
        .iter()
        .filter_map(|name| {
            let number = name.strip_prefix(prefix)?.strip_suffix(".xml")?.parse().ok()?;
            Some((number, name.clone()))
        })
        .collect();
    parts.sort_by_key(|(number, _)| *number);
    parts.into_iter().map(|(_, name)| name).collect()
}

fn word_to_markdown(xml: &str) -> String {
    let mut blocks = Vec::new();
    for paragraph in xml.split("</w:p>") {
        let text: String = WORD_RUN.captures_iter(paragraph).map(|c| run_text(&c)).collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let prefix = WORD_STYLE
            .captures(paragraph)
            .and_then(|c| c.get(1))
            .and_then(|style| heading_prefix(style.as_str()));
        blocks.push(match prefix {
            Some(prefix) => format!("{prefix} {text}"),
            None => text.to_string(),
        });
    }
    blocks.join("\n\n")
}

/// Text of one run match: decoded characters, a tab as a space, or a break.
fn run_text<'h>(caps: &Captures<'h>) -> Cow<'h, str> {
    if let Some(text) = caps.get(1) {
        decode_html_entities(text.as_str())
    } else if caps.get(2).is_some() {
        Cow::Borrowed(" ")
    } else {
        Cow::Borrowed("\n")
    }
}

fn heading_prefix(style: &str) -> Option<&'static str> {
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        return Some("#");
    }
    match lower.strip_prefix("heading")?.trim() {
        "1" => Some("#"),
        "2" => Some("##"),
        "3" => Some("###"),
        _ => Some("####"),
    }
}

fn drawing_paragraphs(xml: &str) -> Vec<String> {
    xml.split("</a:p>")
        .filter_map(|paragraph| {
            let text: String = DRAWING_RUN
                .captures_iter(paragraph)
                .map(|c| run_text(&c))
                .collect();
            let text = text.trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

fn shared_strings(xml: &str) -> Vec<String> {
    SHARED_STRING
        .captures_iter(xml)
        .map(|item| {
            let inner = item.get(1).map_or("", |m| m.as_str());
            SHEET_TEXT
                .captures_iter(inner)
                .filter_map(|c| c.get(1))
                .map(|m| decode_html_entities(m.as_str()))
                .collect()
        })
        .collect()
}

fn workbook_sheet_names(xml: &str) -> Vec<String> {
    SHEET_NAME
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| decode_html_entities(m.as_str()).into_owned())
        .collect()
}

fn sheet_to_table(xml: &str, shared: &[String]) -> String {
    let rows: Vec<Vec<String>> = SHEET_ROW
        .captures_iter(xml)
        .filter_map(|row| {
            let inner = row.get(1)?.as_str();
            let cells: Vec<String> = SHEET_CELL
                .captures_iter(inner)
                .map(|cell| {
                    let attrs = cell.get(1).map_or("", |m| m.as_str());
                    let body = cell.get(2).map_or("", |m| m.as_str());
                    cell_text(attrs, body, shared)
                })
                .collect();
            cells.iter().any(|c| !c.is_empty()).then_some(cells)
        })
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (index, row) in rows.iter().enumerate() {
        let mut cells: Vec<String> = row.iter().map(|c| c.replace('|', "\\|")).collect();
        cells.resize(width, String::new());
        lines.push(format!("| {} |", cells.join(" | ")));
        if index == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    lines.join("\n")
}

fn cell_text(attrs: &str, body: &str, shared: &[String]) -> String {
    let cell_type = attribute(attrs, "t");
    let text = match cell_type.as_deref() {
        Some("s") => CELL_VALUE
            .captures(body)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().trim().parse::<usize>().ok())
            .and_then(|index| shared.get(index).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => SHEET_TEXT
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| decode_html_entities(m.as_str()))
            .collect(),
        _ => CELL_VALUE
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| decode_html_entities(m.as_str()).into_owned())
            .unwrap_or_default(),
    };
    text.trim().to_string()
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    attrs
        .split_whitespace()
        .find_map(|pair| pair.strip_prefix(&needle))
        .and_then(|rest| rest.split('"').next())
        .map(ToString::to_string)
}
