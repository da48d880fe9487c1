//! Acquisition orchestrator: scraper resolution, raw fetch fallback, decoding.
//!
//! [`AcquisitionService::scrape`] returns normalized (decoded) units for
//! reading; [`AcquisitionService::download`] returns the bytes exactly as
//! retrieved. Both share one resolution path:
//!
//! 1. Notify the session that the URL is being fetched.
//! 2. Try every applicable scraper in registration order.
//! 3. If none acquired anything, fall back to a single raw fetch.
//!
//! There are no retries at this layer and no timeout beyond the HTTP
//! clients' own.

mod error;

pub use error::AcquisitionError;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::content::ContentUnit;
use crate::decode::DecoderRegistry;
use crate::fetch::RawFetcher;
use crate::notify::{NoopSink, NotificationLevel, NotificationSink, notify_best_effort};
use crate::scraper::{ScrapeAttemptError, ScrapeContext, ScrapeOutcome, ScraperRegistry};
use crate::tenant::TenantConfig;

/// Default number of characters shown in verbose payload previews.
pub const DEFAULT_PREVIEW_CHARS: usize = 500;

/// Per-service behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionOptions {
    /// Emit raw and decoded payload previews as debug notifications.
    pub verbose_diagnostics: bool,
    /// Maximum characters per preview.
    pub preview_chars: usize,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            verbose_diagnostics: false,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

/// Entry point for content acquisition.
///
/// Registries are immutable after construction and shared by `Arc`, so one
/// service can serve concurrent calls.
pub struct AcquisitionService {
    scrapers: Arc<ScraperRegistry>,
    decoders: Arc<DecoderRegistry>,
    fetcher: Arc<dyn RawFetcher>,
    sink: Arc<dyn NotificationSink>,
    options: AcquisitionOptions,
}

impl AcquisitionService {
    /// Creates a service with a no-op notification sink and default options.
    #[must_use]
    pub fn new(
        scrapers: Arc<ScraperRegistry>,
        decoders: Arc<DecoderRegistry>,
        fetcher: Arc<dyn RawFetcher>,
    ) -> Self {
        Self {
            scrapers,
            decoders,
            fetcher,
            sink: Arc::new(NoopSink),
            options: AcquisitionOptions::default(),
        }
    }

    /// Routes session notifications to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the service options.
    #[must_use]
    pub fn with_options(mut self, options: AcquisitionOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the active options.
    #[must_use]
    pub fn options(&self) -> AcquisitionOptions {
        self.options
    }

    /// Retrieves `url` and decodes every unit for reading.
    ///
    /// Units whose MIME type has no decoder (or is passthrough) come back
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError`] when the URL is invalid, an applicable
    /// scraper fails, the raw fetch fails, a decoder fails, or `cancel` fires.
    #[tracing::instrument(skip(self, tenant, cancel), fields(tenant = %tenant.tenant_id))]
    pub async fn scrape(
        &self,
        tenant: &TenantConfig,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentUnit>, AcquisitionError> {
        let units = self.resolve(tenant, url, cancel).await?;

        let mut decoded = Vec::with_capacity(units.len());
        for unit in units {
            let unit = self
                .decoders
                .decode(unit, cancel)
                .await
                .map_err(|e| AcquisitionError::from_decode(url, e))?;
            if self.options.verbose_diagnostics {
                self.preview("Decoded", &unit).await;
            }
            decoded.push(unit);
        }
        info!(units = decoded.len(), "Scrape complete");
        Ok(decoded)
    }

    /// Retrieves `url` without decoding.
    ///
    /// # Errors
    ///
    /// Same as [`scrape`](Self::scrape), minus decoder failures.
    #[tracing::instrument(skip(self, tenant, cancel), fields(tenant = %tenant.tenant_id))]
    pub async fn download(
        &self,
        tenant: &TenantConfig,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentUnit>, AcquisitionError> {
        let units = self.resolve(tenant, url, cancel).await?;
        info!(units = units.len(), "Download complete");
        Ok(units)
    }

    async fn resolve(
        &self,
        tenant: &TenantConfig,
        raw_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentUnit>, AcquisitionError> {
        let url = Url::parse(raw_url.trim()).map_err(|e| AcquisitionError::InvalidUrl {
            url: raw_url.to_string(),
            reason: e.to_string(),
        })?;
        let domain = url.host_str().unwrap_or_default();

        notify_best_effort(
            self.sink.as_ref(),
            NotificationLevel::Info,
            &format!("Fetching {domain}: {url}"),
        )
        .await;

        if cancel.is_cancelled() {
            return Err(AcquisitionError::cancelled(raw_url));
        }

        let ctx = ScrapeContext::new(tenant);
        let units = match self.scrapers.acquire(&ctx, &url, cancel).await {
            Ok(ScrapeOutcome::Acquired(units)) => units,
            Ok(ScrapeOutcome::NotApplicable) => {
                debug!(url = %url, "No scraper acquired content, using raw fetch");
                let resource = self
                    .fetcher
                    .fetch(url.as_str(), cancel)
                    .await
                    .map_err(|e| AcquisitionError::from_fetch(raw_url, e))?;
                vec![resource.into_content_unit()?]
            }
            Err(ScrapeAttemptError::Cancelled { .. }) => {
                return Err(AcquisitionError::cancelled(raw_url));
            }
            Err(ScrapeAttemptError::Failed { scraper, source }) => {
                if source.is_cancelled() || cancel.is_cancelled() {
                    return Err(AcquisitionError::cancelled(raw_url));
                }
                return Err(AcquisitionError::Scraper { scraper, source });
            }
        };

        if self.options.verbose_diagnostics {
            for unit in &units {
                self.preview("Raw", unit).await;
            }
        }
        Ok(units)
    }

    async fn preview(&self, stage: &str, unit: &ContentUnit) {
        let message = format!(
            "{stage} {} ({}, {} bytes): {}",
            unit.display_name(),
            unit.mime_type(),
            unit.payload_len(),
            unit.preview(self.options.preview_chars)
        );
        notify_best_effort(self.sink.as_ref(), NotificationLevel::Debug, &message).await;
    }
}

impl std::fmt::Debug for AcquisitionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionService")
            .field("scrapers", &self.scrapers)
            .field("decoders", &self.decoders)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::decode::{DecodeError, DecodedContent, Decoder, DecoderOrigin};
    use crate::fetch::{FetchError, FetchedResource};
    use crate::notify::NotifyError;
    use crate::scraper::{ScrapeError, Scraper};

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<(NotificationLevel, String)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, level: NotificationLevel, message: &str) -> Result<(), NotifyError> {
            self.messages.lock().unwrap().push((level, message.to_string()));
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _: NotificationLevel, _: &str) -> Result<(), NotifyError> {
            Err(NotifyError::new("session gone"))
        }
    }

    struct StubFetcher {
        calls: Arc<AtomicUsize>,
        result: fn() -> Result<FetchedResource, FetchError>,
    }

    #[async_trait]
    impl RawFetcher for StubFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _cancel: &CancellationToken,
        ) -> Result<FetchedResource, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn html_page() -> Result<FetchedResource, FetchError> {
        Ok(FetchedResource {
            bytes: Bytes::from_static(b"<p>hello</p>"),
            content_type: "text/html".to_string(),
            filename: Some("page.html".to_string()),
            final_url: "https://example.com/page.html".to_string(),
        })
    }

    fn bad_gateway() -> Result<FetchedResource, FetchError> {
        Err(FetchError::http_status(
            "https://example.com/page.html",
            502,
            "gateway says no",
        ))
    }

    struct FailingScraper;

    #[async_trait]
    impl Scraper for FailingScraper {
        fn name(&self) -> &str {
            "failing"
        }

        fn supports_host(&self, _tenant: &TenantConfig, _url: &Url) -> bool {
            true
        }

        async fn try_fetch(
            &self,
            _ctx: &ScrapeContext<'_>,
            url: &Url,
            _cancel: &CancellationToken,
        ) -> Result<ScrapeOutcome, ScrapeError> {
            Err(ScrapeError::invalid_response(url.as_str(), "bad payload"))
        }
    }

    struct UpperDecoder;

    #[async_trait]
    impl Decoder for UpperDecoder {
        fn name(&self) -> &str {
            "upper"
        }

        fn origin(&self) -> DecoderOrigin {
            DecoderOrigin::Bundled
        }

        fn accepts(&self, mime: &str) -> bool {
            mime == "text/html"
        }

        async fn decode(
            &self,
            bytes: &Bytes,
            _source_uri: &str,
            _cancel: &CancellationToken,
        ) -> Result<Option<DecodedContent>, DecodeError> {
            Ok(Some(DecodedContent::markdown(
                String::from_utf8_lossy(bytes).to_uppercase(),
            )))
        }
    }

    fn service(
        scrapers: ScraperRegistry,
        result: fn() -> Result<FetchedResource, FetchError>,
    ) -> (AcquisitionService, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut decoders = DecoderRegistry::new();
        decoders.register(Box::new(UpperDecoder));
        let fetcher = StubFetcher {
            calls: Arc::clone(&calls),
            result,
        };
        let service = AcquisitionService::new(
            Arc::new(scrapers),
            Arc::new(decoders),
            Arc::new(fetcher),
        );
        (service, calls)
    }

    #[tokio::test]
    async fn test_scrape_falls_back_to_raw_fetch_and_decodes() {
        let (service, calls) = service(ScraperRegistry::new(), html_page);
        let units = service
            .scrape(
                &TenantConfig::new("t"),
                "https://example.com/page.html",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_text(), Some("<P>HELLO</P>"));
        assert_eq!(units[0].filename(), Some("page.md"));
    }

    #[tokio::test]
    async fn test_download_skips_decoding() {
        let (service, _) = service(ScraperRegistry::new(), html_page);
        let units = service
            .download(
                &TenantConfig::new("t"),
                "https://example.com/page.html",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(units[0].mime_type(), "text/html");
        assert_eq!(units[0].as_text(), Some("<p>hello</p>"));
    }

    #[tokio::test]
    async fn test_failing_scraper_is_fatal_and_skips_fetch() {
        let mut scrapers = ScraperRegistry::new();
        scrapers.register(Box::new(FailingScraper));
        let (service, calls) = service(scrapers, html_page);
        let err = service
            .scrape(
                &TenantConfig::new("t"),
                "https://example.com/page.html",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(&err, AcquisitionError::Scraper { scraper, .. } if scraper == "failing"));
        assert!(err.to_string().contains("bad payload"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_carries_body() {
        let (service, _) = service(ScraperRegistry::new(), bad_gateway);
        let err = service
            .download(
                &TenantConfig::new("t"),
                "https://example.com/page.html",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gateway says no"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_any_io() {
        let (service, calls) = service(ScraperRegistry::new(), html_page);
        let err = service
            .scrape(&TenantConfig::new("t"), "not a url", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::InvalidUrl { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (service, calls) = service(ScraperRegistry::new(), html_page);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = service
            .scrape(&TenantConfig::new("t"), "https://example.com/page.html", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_notifications_announce_fetch_and_previews() {
        let sink = Arc::new(RecordingSink::default());
        let (service, _) = service(ScraperRegistry::new(), html_page);
        let service = service
            .with_sink(Arc::clone(&sink) as Arc<dyn NotificationSink>)
            .with_options(AcquisitionOptions {
                verbose_diagnostics: true,
                preview_chars: 5,
            });
        service
            .scrape(
                &TenantConfig::new("t"),
                "https://example.com/page.html",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let messages = sink.messages.lock().unwrap();
        assert_eq!(
            messages[0],
            (
                NotificationLevel::Info,
                "Fetching example.com: https://example.com/page.html".to_string()
            )
        );
        assert_eq!(messages.len(), 3);
        assert!(messages[1].1.starts_with("Raw page.html"));
        assert!(messages[1].1.ends_with("<p>he…"));
        assert!(messages[2].1.starts_with("Decoded page.md"));
        assert!(messages.iter().skip(1).all(|(l, _)| *l == NotificationLevel::Debug));
    }

    #[tokio::test]
    async fn test_failing_sink_never_fails_acquisition() {
        let (service, _) = service(ScraperRegistry::new(), html_page);
        let service = service.with_sink(Arc::new(FailingSink));
        let units = service
            .download(
                &TenantConfig::new("t"),
                "https://example.com/page.html",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(units.len(), 1);
    }
}
