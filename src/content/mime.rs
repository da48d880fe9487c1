//! MIME type normalization and extension mapping.

/// Fallback MIME type for payloads whose type cannot be determined.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Reserved MIME type for HTML widgets rendered by the host (never decoded).
pub const SKYBRIDGE_HTML: &str = "text/html+skybridge";

/// MIME type produced by the SharePoint pages API scrape path.
pub const SHAREPOINT_PAGE_JSON: &str = "application/vnd.sharepoint.page+json";

pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const EXTENSION_TABLE: &[(&str, &str)] = &[
    (".html", "text/html"),
    (".htm", "text/html"),
    (".txt", "text/plain"),
    (".md", "text/markdown"),
    (".csv", "text/csv"),
    (".json", "application/json"),
    (".xml", "application/xml"),
    (".pdf", "application/pdf"),
    (".docx", DOCX),
    (".pptx", PPTX),
    (".xlsx", XLSX),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".svg", "image/svg+xml"),
    (".webp", "image/webp"),
    (".zip", "application/zip"),
    (".gz", "application/gzip"),
    (".css", "text/css"),
    (".js", "text/javascript"),
    (".mp4", "video/mp4"),
    (".mp3", "audio/mpeg"),
    (".wav", "audio/wav"),
];

/// Normalizes a `Content-Type` value to its lowercase essence (`type/subtype`).
///
/// Parameters such as `charset` are dropped. Returns an empty string for
/// blank input.
#[must_use]
pub fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Guesses a MIME type from a filename or URL path extension.
#[must_use]
pub fn mime_from_extension(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    let dot = lower.rfind('.')?;
    let ext = &lower[dot..];
    EXTENSION_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, mime)| *mime)
}

/// Guesses a file extension (with leading dot) from a MIME type.
pub(crate) fn extension_from_mime(content_type: &str) -> &'static str {
    let mime = normalize_mime(content_type);
    match mime.as_str() {
        "text/html" | SKYBRIDGE_HTML => ".html",
        "application/xml" | "text/xml" => ".xml",
        "text/javascript" | "application/javascript" => ".js",
        "image/jpeg" => ".jpg",
        SHAREPOINT_PAGE_JSON => ".json",
        other => EXTENSION_TABLE
            .iter()
            .find(|(_, candidate)| *candidate == other)
            .map_or(".bin", |(ext, _)| *ext),
    }
}

/// Picks the most specific MIME type from a server-declared value and a filename.
///
/// Servers frequently answer with `application/octet-stream` or nothing at
/// all; in that case the filename extension wins.
#[must_use]
pub fn refine_mime(declared: Option<&str>, filename: Option<&str>) -> String {
    let declared = declared.map(normalize_mime).filter(|m| !m.is_empty());
    match declared {
        Some(mime) if mime != OCTET_STREAM => mime,
        _ => filename
            .and_then(mime_from_extension)
            .map_or_else(|| OCTET_STREAM.to_string(), ToString::to_string),
    }
}

/// Returns true if payloads of this MIME type are human-readable text.
#[must_use]
pub fn is_textual(mime: &str) -> bool {
    let mime = normalize_mime(mime);
    mime.starts_with("text/")
        || matches!(
            mime.as_str(),
            "application/json"
                | "application/xml"
                | "application/xhtml+xml"
                | "application/javascript"
                | SHAREPOINT_PAGE_JSON
        )
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
}
