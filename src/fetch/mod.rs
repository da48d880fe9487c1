//! Generic, capability-free HTTP retrieval.
//!
//! [`HttpFetcher`] is the strategy of last resort: an unauthenticated GET that
//! returns the body, its (refined) content type, a filename and the final URL
//! after redirects. Scrapers reuse [`send_request`] and [`read_resource`] so
//! every strategy reports HTTP failures the same way.

pub mod error;
mod http_client;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use crate::content::filename::{derive_filename, filename_from_url, parse_content_disposition};
use crate::content::mime::refine_mime;
use crate::content::{ContentError, ContentUnit};

pub use error::FetchError;
pub use http_client::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpTimeouts, build_http_client,
};

/// Default cap on a single response body (256 MiB).
pub const DEFAULT_MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

/// Maximum characters of an error response body kept as diagnostic text.
const ERROR_BODY_MAX_CHARS: usize = 2048;

/// Bytes of an error response body read before giving up on the rest.
const ERROR_BODY_MAX_BYTES: usize = ERROR_BODY_MAX_CHARS * 4;

/// Bytes and metadata returned by a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    /// Response body.
    pub bytes: Bytes,
    /// Normalized content type, refined from the filename when the server
    /// sent none or `application/octet-stream`.
    pub content_type: String,
    /// Filename from Content-Disposition or the final URL, when available.
    pub filename: Option<String>,
    /// URL after redirects.
    pub final_url: String,
}

impl FetchedResource {
    /// Converts the fetched bytes into a content unit sourced at the final URL.
    ///
    /// A filename is derived from the URL and MIME type when the response
    /// did not provide one.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError`] when the body is empty.
    pub fn into_content_unit(self) -> Result<ContentUnit, ContentError> {
        let filename = self
            .filename
            .unwrap_or_else(|| derive_filename(&self.final_url, &self.content_type));
        Ok(ContentUnit::new(self.bytes, &self.content_type, self.final_url)?.with_filename(filename))
    }
}

/// Generic retrieval used when no scraper claims a URL.
#[async_trait]
pub trait RawFetcher: Send + Sync {
    /// Performs an unauthenticated GET of `url`.
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedResource, FetchError>;
}

/// `reqwest`-backed [`RawFetcher`].
///
/// Create once and share; the inner client pools connections.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl HttpFetcher {
    /// Creates a fetcher with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeouts(HttpTimeouts::default())
    }

    /// Creates a fetcher with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    pub fn with_timeouts(timeouts: HttpTimeouts) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client("raw-fetch", timeouts)?,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Overrides the response size cap.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

#[async_trait]
impl RawFetcher for HttpFetcher {
    #[instrument(skip(self, cancel), fields(url = %url))]
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedResource, FetchError> {
        let parsed = parse_http_url(url)?;
        let response = send_request(self.client.get(parsed), url, cancel).await?;

        if let Some(error) = detect_login_redirect(url, &response) {
            return Err(error);
        }

        let resource = read_resource(response, url, self.max_body_bytes, cancel).await?;
        info!(
            bytes = resource.bytes.len(),
            content_type = %resource.content_type,
            final_url = %resource.final_url,
            "raw fetch complete"
        );
        Ok(resource)
    }
}

/// Parses `url` and rejects anything other than http(s).
pub(crate) fn parse_http_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
    if matches!(parsed.scheme(), "http" | "https") {
        Ok(parsed)
    } else {
        Err(FetchError::invalid_url(url))
    }
}

/// Sends `request`, racing it against `cancel`.
///
/// Non-success responses become [`FetchError::HttpStatus`] carrying the
/// response body as diagnostic text.
pub(crate) async fn send_request(
    request: RequestBuilder,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Response, FetchError> {
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(FetchError::cancelled(url)),
        result = request.send() => result.map_err(|e| FetchError::network(url, e))?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = status.canonical_reason().unwrap_or("request failed");
    let body = read_error_body(response, url, cancel).await?;
    let diagnostic = if body.is_empty() {
        reason.to_string()
    } else {
        body
    };
    debug!(url = %url, status = status.as_u16(), "upstream returned error status");
    Err(FetchError::http_status(url, status.as_u16(), diagnostic))
}

/// Reads the head of an error response body as diagnostic text.
///
/// Stops after [`ERROR_BODY_MAX_BYTES`]; a body that breaks off mid-stream
/// keeps whatever arrived.
async fn read_error_body(
    response: Response,
    url: &str,
    cancel: &CancellationToken,
) -> Result<String, FetchError> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();
    while body.len() < ERROR_BODY_MAX_BYTES {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::cancelled(url)),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => body.extend_from_slice(&chunk),
            Some(Err(_)) | None => break,
        }
    }
    body.truncate(ERROR_BODY_MAX_BYTES);
    let text = String::from_utf8_lossy(&body);
    Ok(text.trim().chars().take(ERROR_BODY_MAX_CHARS).collect())
}

/// Streams a successful response body into memory.
pub(crate) async fn read_resource(
    response: Response,
    url: &str,
    max_body_bytes: u64,
    cancel: &CancellationToken,
) -> Result<FetchedResource, FetchError> {
    let too_large = || FetchError::TooLarge {
        url: url.to_string(),
        limit: max_body_bytes,
    };
    if response
        .content_length()
        .is_some_and(|len| len > max_body_bytes)
    {
        return Err(too_large());
    }

    let final_url = response.url().clone();
    let declared = header_str(&response, CONTENT_TYPE);
    let filename = header_str(&response, CONTENT_DISPOSITION)
        .as_deref()
        .and_then(parse_content_disposition)
        .or_else(|| filename_from_url(&final_url));

    let mut stream = response.bytes_stream();
    let mut body = BytesMut::new();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::cancelled(url)),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| FetchError::network(url, e))?;
        if (body.len() + chunk.len()) as u64 > max_body_bytes {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(FetchedResource {
        bytes: body.freeze(),
        content_type: refine_mime(declared.as_deref(), filename.as_deref()),
        filename,
        final_url: final_url.to_string(),
    })
}

fn header_str(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Extensions of documents that should never come back as an HTML page.
const BINARY_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".csv", ".odt", ".rtf",
];

/// URL fragments typical of a login or SSO page.
const LOGIN_PATTERNS: &[&str] = &[
    "/login",
    "/signin",
    "/sign-in",
    "/auth/",
    "/sso",
    "/saml",
    "/oauth",
    "/adfs/",
];

fn is_expected_binary(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    BINARY_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Flags an HTML login page served in place of a binary document.
fn detect_login_redirect(requested_url: &str, response: &Response) -> Option<FetchError> {
    if !is_expected_binary(requested_url) {
        return None;
    }
    let is_html = header_str(response, CONTENT_TYPE)
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
    if !is_html {
        return None;
    }
    let final_url = response.url().as_str().to_ascii_lowercase();
    if !LOGIN_PATTERNS.iter().any(|p| final_url.contains(p)) {
        debug!(url = %requested_url, "HTML for a binary URL without login pattern");
        return None;
    }
    let domain = response
        .url()
        .host_str()
        .unwrap_or("unknown")
        .to_string();
    debug!(url = %requested_url, domain = %domain, "login redirect detected");
    Some(FetchError::LoginRedirect {
        url: requested_url.to_string(),
        domain,
    })
}
