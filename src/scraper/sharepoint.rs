//! SharePoint Online scraper using tenant-scoped delegated tokens.
//!
//! Handles two shapes of URL under `*.sharepoint.com`:
//! - site pages (`.../SitePages/Name.aspx`), fetched as page JSON through the
//!   list item REST endpoint;
//! - documents (any other path ending in a file extension), fetched through
//!   `GetFileByServerRelativeUrl(..)/$value`.
//!
//! Everything else (folders, list views, anonymous share tokens) is left to
//! the next strategy.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::TokenProvider;
use crate::content::ContentUnit;
use crate::content::mime::{SHAREPOINT_PAGE_JSON, refine_mime};
use crate::fetch::{
    DEFAULT_MAX_BODY_BYTES, FetchError, HttpTimeouts, build_http_client, read_resource,
    send_request,
};
use crate::tenant::{HostPolicy, TenantConfig};

use super::{ScrapeContext, ScrapeError, ScrapeOutcome, Scraper};

/// Host suffix matched by default.
pub const SHAREPOINT_HOST_SUFFIX: &str = ".sharepoint.com";

const ODATA_JSON: &str = "application/json;odata=nometadata";
const PAGE_FIELDS: &str = "Title,CanvasContent1";

/// Scraper for SharePoint Online documents and site pages.
pub struct SharePointScraper {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    host_suffix: String,
    required_scopes: Vec<String>,
    api_base: Option<Url>,
}

impl SharePointScraper {
    /// Creates a scraper that requests tokens from `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(tokens: Arc<dyn TokenProvider>, timeouts: HttpTimeouts) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client("sharepoint", timeouts)?,
            tokens,
            host_suffix: SHAREPOINT_HOST_SUFFIX.to_string(),
            required_scopes: Vec::new(),
            api_base: None,
        })
    }

    /// Applies only when the tenant grants one of `scopes` for the host.
    ///
    /// With no required scopes, any delegated scope is enough.
    #[must_use]
    pub fn with_required_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    fn policy_applies(&self, policy: &HostPolicy) -> bool {
        if self.required_scopes.is_empty() {
            policy.has_delegated_scopes()
        } else {
            self.required_scopes.iter().any(|scope| policy.grants(scope))
        }
    }

    /// Overrides the host suffix this scraper claims (e.g. a sovereign cloud).
    #[must_use]
    pub fn with_host_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix: String = suffix.into();
        let suffix = suffix.trim().trim_start_matches('*').to_ascii_lowercase();
        self.host_suffix = if suffix.starts_with('.') {
            suffix
        } else {
            format!(".{suffix}")
        };
        self
    }

    /// Sends REST calls to `base` instead of the URL's own origin.
    ///
    /// Intended for tests against a local mock server.
    #[must_use]
    pub fn with_api_base(mut self, base: Url) -> Self {
        self.api_base = Some(base);
        self
    }

    fn api_origin(&self, url: &Url) -> String {
        match &self.api_base {
            Some(base) => base.as_str().trim_end_matches('/').to_string(),
            None => url.origin().ascii_serialization(),
        }
    }

    fn build_api_url(
        &self,
        page_url: &Url,
        target: &Target,
        policy: Option<&HostPolicy>,
    ) -> Result<Url, ScrapeError> {
        let escaped = urlencoding::encode(&target.server_relative.replace('\'', "''")).into_owned();
        let raw = match target.kind {
            TargetKind::File => format!(
                "{}{}/_api/web/GetFileByServerRelativeUrl('{escaped}')/$value",
                self.api_origin(page_url),
                target.site
            ),
            TargetKind::Page => format!(
                "{}{}/_api/web/GetFileByServerRelativeUrl('{escaped}')/ListItemAllFields",
                self.api_origin(page_url),
                target.site
            ),
        };
        let mut api_url = Url::parse(&raw).map_err(|_| FetchError::invalid_url(&raw))?;
        if matches!(target.kind, TargetKind::Page) {
            api_url.query_pairs_mut().append_pair("$select", PAGE_FIELDS);
        }
        if let Some(policy) = policy {
            policy.apply_query(&mut api_url);
        }
        Ok(api_url)
    }
}

impl std::fmt::Debug for SharePointScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharePointScraper")
            .field("host_suffix", &self.host_suffix)
            .field("required_scopes", &self.required_scopes)
            .field("api_base", &self.api_base.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    File,
    Page,
}

/// A SharePoint URL split into site and server-relative file path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    kind: TargetKind,
    /// Site prefix such as `/sites/Team`, empty for the root site.
    site: String,
    /// Decoded server-relative path of the file.
    server_relative: String,
    /// Decoded last path segment.
    name: String,
}

fn classify(url: &Url) -> Option<Target> {
    let mut segments: Vec<String> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();

    // Sharing links: "/:w:/r/sites/..." carry the real path after ":x:/r".
    if segments.first().is_some_and(|s| s.starts_with(':')) {
        if segments.get(1).map(String::as_str) != Some("r") {
            return None;
        }
        segments = segments.split_off(2);
    }

    let (site, rest) = match segments.as_slice() {
        [scope, name, rest @ ..]
            if scope.eq_ignore_ascii_case("sites") || scope.eq_ignore_ascii_case("teams") =>
        {
            (format!("/{scope}/{name}"), rest)
        }
        rest => (String::new(), rest),
    };

    let name = rest.last()?.clone();
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }

    let is_aspx = name.to_ascii_lowercase().ends_with(".aspx");
    let kind = match (is_aspx, rest.first()) {
        (true, Some(library)) if library.eq_ignore_ascii_case("SitePages") && rest.len() >= 2 => {
            TargetKind::Page
        }
        (true, _) => return None,
        (false, _) => TargetKind::File,
    };

    Some(Target {
        kind,
        server_relative: format!("/{}", segments.join("/")),
        site,
        name,
    })
}

#[derive(Debug, Deserialize)]
struct PageFields {
    #[serde(rename = "Title")]
    title: Option<String>,
}

#[async_trait]
impl Scraper for SharePointScraper {
    fn name(&self) -> &str {
        "sharepoint"
    }

    fn supports_host(&self, tenant: &TenantConfig, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let under_suffix = host
            .strip_suffix(self.host_suffix.as_str())
            .is_some_and(|label| !label.is_empty());
        under_suffix
            && tenant
                .host_policy(&host)
                .is_some_and(|policy| self.policy_applies(policy))
    }

    #[instrument(skip(self, ctx, cancel), fields(url = %url))]
    async fn try_fetch(
        &self,
        ctx: &ScrapeContext<'_>,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let Some(target) = classify(url) else {
            debug!("URL is not a SharePoint document or site page");
            return Ok(ScrapeOutcome::NotApplicable);
        };
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let policy = ctx.tenant.host_policy(&host);
        let scopes = ctx.tenant.scopes_for_url(url);

        let token = self
            .tokens
            .access_token(ctx.tenant, &host, scopes, cancel)
            .await?;

        let api_url = self.build_api_url(url, &target, policy)?;
        debug!(api_url = %api_url, kind = ?target.kind, "Calling SharePoint REST API");

        let mut request = self.client.get(api_url.clone()).bearer_auth(token);
        if target.kind == TargetKind::Page {
            request = request.header(ACCEPT, ODATA_JSON);
        }
        if let Some(policy) = policy {
            request = policy.apply_headers(request);
        }

        let response = send_request(request, api_url.as_str(), cancel)
            .await
            .map_err(|e| ScrapeError::from_fetch(&host, e))?;
        let resource = read_resource(response, api_url.as_str(), DEFAULT_MAX_BODY_BYTES, cancel)
            .await
            .map_err(|e| ScrapeError::from_fetch(&host, e))?;

        let unit = match target.kind {
            TargetKind::File => {
                let content_type =
                    refine_mime(Some(&resource.content_type), Some(&target.name));
                ContentUnit::new(resource.bytes, &content_type, url.as_str())?
            }
            TargetKind::Page => {
                let fields: PageFields = serde_json::from_slice(&resource.bytes).map_err(|e| {
                    ScrapeError::invalid_response(api_url.as_str(), format!("page JSON: {e}"))
                })?;
                debug!(title = ?fields.title, "Fetched SharePoint site page");
                ContentUnit::new(resource.bytes, SHAREPOINT_PAGE_JSON, url.as_str())?
            }
        };

        Ok(ScrapeOutcome::Acquired(vec![unit.with_filename(target.name)]))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::content::mime::DOCX;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{header, method, path_regex, query_param};
    use wiremock::{Mock, ResponseTemplate};

    const HOST: &str = "contoso.sharepoint.com";

    fn tenant() -> TenantConfig {
        let mut policy = HostPolicy {
            scopes: vec!["Sites.Read.All".to_string()],
            ..HostPolicy::default()
        };
        policy
            .headers
            .insert("X-Tenant-Route".to_string(), "eu".to_string());
        TenantConfig::new("contoso").with_host("*.sharepoint.com", policy)
    }

    fn scraper(base: Option<&str>) -> SharePointScraper {
        let tokens = Arc::new(StaticTokenProvider::new().with_token(HOST, "tok-123"));
        let scraper = SharePointScraper::new(tokens, HttpTimeouts::default()).unwrap();
        match base {
            Some(base) => scraper.with_api_base(Url::parse(base).unwrap()),
            None => scraper,
        }
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_classify_document_in_site() {
        let target = classify(&url(
            "https://contoso.sharepoint.com/sites/Team/Shared%20Documents/Plan.docx?web=1",
        ))
        .unwrap();
        assert_eq!(target.kind, TargetKind::File);
        assert_eq!(target.site, "/sites/Team");
        assert_eq!(target.server_relative, "/sites/Team/Shared Documents/Plan.docx");
        assert_eq!(target.name, "Plan.docx");
    }

    #[test]
    fn test_classify_site_page_and_sharing_link() {
        let page = classify(&url("https://contoso.sharepoint.com/SitePages/Home.aspx")).unwrap();
        assert_eq!(page.kind, TargetKind::Page);
        assert_eq!(page.site, "");

        let shared = classify(&url(
            "https://contoso.sharepoint.com/:w:/r/teams/Ops/Docs/Runbook.docx",
        ))
        .unwrap();
        assert_eq!(shared.site, "/teams/Ops");
        assert_eq!(shared.server_relative, "/teams/Ops/Docs/Runbook.docx");
    }

    #[test]
    fn test_classify_rejects_folders_views_and_share_tokens() {
        assert!(classify(&url("https://contoso.sharepoint.com/sites/Team/Shared%20Documents")).is_none());
        assert!(
            classify(&url(
                "https://contoso.sharepoint.com/sites/Team/Shared%20Documents/Forms/AllItems.aspx"
            ))
            .is_none()
        );
        assert!(classify(&url("https://contoso.sharepoint.com/:w:/s/Team/EaBcD")).is_none());
    }

    #[test]
    fn test_supports_host_requires_suffix_and_scopes() {
        let scraper = scraper(None);
        let tenant = tenant();
        assert!(scraper.supports_host(&tenant, &url("https://contoso.sharepoint.com/a.docx")));
        assert!(!scraper.supports_host(&tenant, &url("https://sharepoint.com/a.docx")));
        assert!(!scraper.supports_host(&tenant, &url("https://example.com/a.docx")));
        assert!(!scraper.supports_host(
            &TenantConfig::new("no-scopes"),
            &url("https://contoso.sharepoint.com/a.docx")
        ));
    }

    #[test]
    fn test_supports_host_checks_required_scopes() {
        let target = url("https://contoso.sharepoint.com/sites/Team/Shared%20Documents/Plan.docx");
        let strict = scraper(None).with_required_scopes(["Sites.ReadWrite.All", "sites.read.all"]);
        assert!(strict.supports_host(&tenant(), &target));

        let narrow = TenantConfig::new("contoso").with_host(
            HOST,
            HostPolicy {
                scopes: vec!["Files.Read".to_string()],
                ..HostPolicy::default()
            },
        );
        assert!(!strict.supports_host(&narrow, &target));
        assert!(scraper(None).supports_host(&narrow, &target));
    }

    #[test]
    fn test_with_host_suffix_normalizes() {
        let scraper = scraper(None).with_host_suffix("*.SharePoint.us");
        assert_eq!(scraper.host_suffix, ".sharepoint.us");
    }

    #[tokio::test]
    async fn test_try_fetch_document_uses_bearer_token_and_tenant_headers() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path_regex(r"^/sites/Team/_api/web/GetFileByServerRelativeUrl\(.*\)/\$value$"))
            .and(header("Authorization", "Bearer tok-123"))
            .and(header("X-Tenant-Route", "eu"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/octet-stream")
                    .set_body_bytes(b"PK\x03\x04docx".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let page_url = url("https://contoso.sharepoint.com/sites/Team/Shared%20Documents/Plan.docx");
        let tenant = tenant();
        let outcome = scraper(Some(&server.uri()))
            .try_fetch(&ScrapeContext::new(&tenant), &page_url, &CancellationToken::new())
            .await
            .unwrap();

        let ScrapeOutcome::Acquired(units) = outcome else {
            panic!("expected Acquired");
        };
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].mime_type(), DOCX);
        assert_eq!(units[0].filename(), Some("Plan.docx"));
        assert_eq!(units[0].source_uri(), page_url.as_str());
        assert_eq!(units[0].payload().as_ref(), b"PK\x03\x04docx");
    }

    #[tokio::test]
    async fn test_try_fetch_site_page_returns_page_json() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let body = r#"{"Title":"Welcome","CanvasContent1":"<div><p>Hello team</p></div>"}"#;
        Mock::given(method("GET"))
            .and(path_regex(r"ListItemAllFields$"))
            .and(query_param("$select", PAGE_FIELDS))
            .and(header("Accept", ODATA_JSON))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/json")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let tenant = tenant();
        let outcome = scraper(Some(&server.uri()))
            .try_fetch(
                &ScrapeContext::new(&tenant),
                &url("https://contoso.sharepoint.com/sites/Team/SitePages/Welcome.aspx"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let ScrapeOutcome::Acquired(units) = outcome else {
            panic!("expected Acquired");
        };
        assert_eq!(units[0].mime_type(), SHAREPOINT_PAGE_JSON);
        assert_eq!(units[0].as_text(), Some(body));
        assert_eq!(units[0].filename(), Some("Welcome.aspx"));
    }

    #[tokio::test]
    async fn test_try_fetch_folder_is_not_applicable() {
        let tenant = tenant();
        let outcome = scraper(Some("http://127.0.0.1:9"))
            .try_fetch(
                &ScrapeContext::new(&tenant),
                &url("https://contoso.sharepoint.com/sites/Team/Shared%20Documents"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ScrapeOutcome::NotApplicable);
    }

    #[tokio::test]
    async fn test_try_fetch_forbidden_is_auth_rejected() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access denied. Before opening files in this location, you must first browse to the web site"))
            .mount(&server)
            .await;

        let tenant = tenant();
        let err = scraper(Some(&server.uri()))
            .try_fetch(
                &ScrapeContext::new(&tenant),
                &url("https://contoso.sharepoint.com/sites/Team/Docs/Budget.xlsx"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            ScrapeError::AuthRejected { host, status, body } => {
                assert_eq!(host, HOST);
                assert_eq!(status, 403);
                assert!(body.starts_with("Access denied"));
            }
            other => panic!("expected AuthRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_try_fetch_invalid_page_json_is_hard_failure() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let tenant = tenant();
        let err = scraper(Some(&server.uri()))
            .try_fetch(
                &ScrapeContext::new(&tenant),
                &url("https://contoso.sharepoint.com/SitePages/Home.aspx"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidResponse { .. }), "{err:?}");
    }
}
