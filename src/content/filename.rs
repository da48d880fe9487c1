//! Filename extraction and sanitization for acquired content.
//!
//! Names come from the `Content-Disposition` header when a server sends one,
//! then from the last URL path segment, then from the MIME type.

use tracing::debug;
use url::Url;

use super::mime::extension_from_mime;

/// Extracts the filename from a `Content-Disposition` header value.
///
/// An RFC 5987 `filename*` parameter wins over a plain `filename`, wherever
/// each appears. Parameter names are case-insensitive and quoted values may
/// contain `;`. Any directory part is dropped and the result is sanitized.
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for param in split_unquoted(header, ';') {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        let value = unquote(value.trim());
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                if let Some(name) = decode_extended_value(value).and_then(|v| leaf_name(&v)) {
                    return Some(name);
                }
            }
            "filename" if plain.is_none() => plain = leaf_name(value),
            _ => {}
        }
    }
    plain
}

fn split_unquoted(raw: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (index, c) in raw.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            parts.push(&raw[start..index]);
            start = index + c.len_utf8();
        }
    }
    parts.push(&raw[start..]);
    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Decodes `charset'language'percent-encoded` into text.
fn decode_extended_value(value: &str) -> Option<String> {
    let encoded = value.splitn(3, '\'').nth(2)?;
    urlencoding::decode(encoded.trim())
        .ok()
        .map(std::borrow::Cow::into_owned)
}

fn leaf_name(value: &str) -> Option<String> {
    let leaf = value.rsplit(['/', '\\']).next()?.trim();
    (!leaf.is_empty()).then(|| sanitize_filename(leaf))
}

/// Returns the percent-decoded, sanitized last path segment of `url`.
#[must_use]
pub fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
        debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
        last.into()
    });
    Some(sanitize_filename(&decoded))
}

/// Derives a display filename for content with no server-supplied name.
///
/// Uses the URL's last path segment when present, otherwise `download`
/// with an extension guessed from `mime_type`.
#[must_use]
pub fn derive_filename(source_uri: &str, mime_type: &str) -> String {
    Url::parse(source_uri)
        .ok()
        .as_ref()
        .and_then(filename_from_url)
        .unwrap_or_else(|| format!("download{}", extension_from_mime(mime_type)))
}

/// Replaces the extension of `filename` (or appends one) with `extension`.
///
/// `extension` must include its leading dot.
#[must_use]
pub fn replace_extension(filename: &str, extension: &str) -> String {
    let stem = match filename.rfind('.') {
        Some(0) | None => filename,
        Some(pos) => &filename[..pos],
    };
    format!("{stem}{extension}")
}

/// Characters rejected by at least one common filesystem.
const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Makes `name` usable as a single path segment.
///
/// Reserved and control characters become `_`. Names made only of dots
/// (`.`, `..`) have each dot replaced, and an empty name becomes `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else if cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len())
    } else {
        cleaned
    }
}
