//! GitHub blob URLs fetched from the raw content host.

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::content::ContentUnit;
use crate::content::mime::mime_from_extension;
use crate::fetch::{
    DEFAULT_MAX_BODY_BYTES, FetchError, HttpTimeouts, build_http_client, read_resource,
    send_request,
};
use crate::tenant::TenantConfig;

use super::{ScrapeContext, ScrapeError, ScrapeOutcome, Scraper};

const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com/";

/// Tenant feature flag that enables [`GitHubScraper`].
pub const GITHUB_FEATURE: &str = "github";

/// Scraper for `github.com/{owner}/{repo}/blob/{ref}/{path}` URLs.
///
/// Applies only to tenants declaring the [`GITHUB_FEATURE`] flag. The HTML
/// blob view is skipped entirely; the file is read from the raw content
/// host. Tenant header overrides for `github.com` (typically an
/// `Authorization` token for private repositories) are forwarded.
#[derive(Debug, Clone)]
pub struct GitHubScraper {
    client: Client,
    raw_base: Url,
}

impl GitHubScraper {
    /// Creates a scraper pointed at `raw.githubusercontent.com`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(timeouts: HttpTimeouts) -> Result<Self, FetchError> {
        let raw_base =
            Url::parse(DEFAULT_RAW_BASE).map_err(|_| FetchError::invalid_url(DEFAULT_RAW_BASE))?;
        Ok(Self {
            client: build_http_client("github", timeouts)?,
            raw_base,
        })
    }

    /// Overrides the raw content base URL (for tests).
    #[must_use]
    pub fn with_raw_base(mut self, base: Url) -> Self {
        self.raw_base = base;
        self
    }

    fn raw_url(&self, blob: &BlobPath) -> Option<Url> {
        let mut raw = self.raw_base.clone();
        raw.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend([&blob.owner, &blob.repo, &blob.reference])
            .extend(&blob.path);
        Some(raw)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct BlobPath {
    owner: String,
    repo: String,
    reference: String,
    path: Vec<String>,
}

fn parse_blob_path(url: &Url) -> Option<BlobPath> {
    let segments: Vec<String> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();
    match segments.as_slice() {
        [owner, repo, kind, reference, path @ ..] if kind == "blob" && !path.is_empty() => {
            Some(BlobPath {
                owner: owner.clone(),
                repo: repo.clone(),
                reference: reference.clone(),
                path: path.to_vec(),
            })
        }
        _ => None,
    }
}

#[async_trait]
impl Scraper for GitHubScraper {
    fn name(&self) -> &str {
        "github"
    }

    fn supports_host(&self, tenant: &TenantConfig, url: &Url) -> bool {
        tenant.has_feature(GITHUB_FEATURE)
            && url.host_str().is_some_and(|h| {
                h.eq_ignore_ascii_case("github.com") || h.eq_ignore_ascii_case("www.github.com")
            })
    }

    #[instrument(skip(self, ctx, cancel), fields(url = %url))]
    async fn try_fetch(
        &self,
        ctx: &ScrapeContext<'_>,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let Some(blob) = parse_blob_path(url) else {
            debug!("Not a GitHub blob URL");
            return Ok(ScrapeOutcome::NotApplicable);
        };
        let Some(mut raw_url) = self.raw_url(&blob) else {
            return Err(ScrapeError::invalid_response(
                self.raw_base.as_str(),
                "raw content base cannot take path segments",
            ));
        };

        let policy = ctx.tenant.policy_for_url(url);
        if let Some(policy) = policy {
            policy.apply_query(&mut raw_url);
        }
        let mut request = self.client.get(raw_url.clone());
        if let Some(policy) = policy {
            request = policy.apply_headers(request);
        }
        debug!(raw_url = %raw_url, "Fetching GitHub raw content");

        let response = send_request(request, raw_url.as_str(), cancel)
            .await
            .map_err(|e| ScrapeError::from_fetch("github.com", e))?;
        let resource = read_resource(response, raw_url.as_str(), DEFAULT_MAX_BODY_BYTES, cancel)
            .await
            .map_err(|e| ScrapeError::from_fetch("github.com", e))?;

        let filename = blob.path.last().cloned().unwrap_or_default();
        // The raw host labels every text file text/plain.
        let mime_type = mime_from_extension(&filename)
            .map_or_else(|| resource.content_type.clone(), ToString::to_string);
        let unit = ContentUnit::new(resource.bytes, &mime_type, url.as_str())?.with_filename(filename);
        Ok(ScrapeOutcome::Acquired(vec![unit]))
    }
}
