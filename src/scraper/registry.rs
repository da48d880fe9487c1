//! Scraper registry with the ordered attempt loop.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::tenant::TenantConfig;

use super::{ScrapeAttemptError, ScrapeContext, ScrapeOutcome, Scraper};

/// An ordered collection of scrapers.
///
/// Registration order is significant: it is the order in which applicable
/// scrapers are tried. The registry is built once and then shared read-only.
pub struct ScraperRegistry {
    scrapers: Vec<Box<dyn Scraper>>,
}

impl ScraperRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scrapers: Vec::new(),
        }
    }

    /// Appends a scraper after all previously registered ones.
    #[tracing::instrument(skip(self, scraper), fields(scraper_name))]
    pub fn register(&mut self, scraper: Box<dyn Scraper>) {
        tracing::Span::current().record("scraper_name", scraper.name());
        debug!(name = scraper.name(), "Registering scraper");
        self.scrapers.push(scraper);
    }

    /// Returns the number of registered scrapers.
    #[must_use]
    pub fn scraper_count(&self) -> usize {
        self.scrapers.len()
    }

    /// Returns true if no scrapers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }

    /// Returns scraper names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.scrapers.iter().map(|s| s.name()).collect()
    }

    /// Returns the scrapers whose `supports_host` accepts `(tenant, url)`.
    ///
    /// Pure filter: relative registration order is preserved.
    #[must_use]
    #[tracing::instrument(skip(self, tenant), fields(url = %url))]
    pub fn resolve_applicable(&self, tenant: &TenantConfig, url: &Url) -> Vec<&dyn Scraper> {
        self.scrapers
            .iter()
            .filter(|s| s.supports_host(tenant, url))
            .map(AsRef::as_ref)
            .collect()
    }

    /// Filters to applicable scrapers and runs the attempt loop over them.
    ///
    /// # Errors
    ///
    /// See [`try_acquire`].
    pub async fn acquire(
        &self,
        ctx: &ScrapeContext<'_>,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, ScrapeAttemptError> {
        let applicable = self.resolve_applicable(ctx.tenant, url);
        try_acquire(&applicable, ctx, url, cancel).await
    }
}

/// Tries `scrapers` in order until one acquires content.
///
/// - `Acquired` with at least one unit stops iteration and is returned.
/// - `NotApplicable` (or an empty `Acquired`) moves on to the next scraper.
/// - An error stops iteration immediately; later scrapers are never tried.
///
/// Returns `NotApplicable` when every scraper declined.
///
/// # Errors
///
/// Returns [`ScrapeAttemptError::Cancelled`] if `cancel` fires before an
/// attempt begins and [`ScrapeAttemptError::Failed`] when a scraper errors.
#[tracing::instrument(skip(scrapers, ctx, cancel), fields(url = %url, candidates = scrapers.len()))]
pub async fn try_acquire(
    scrapers: &[&dyn Scraper],
    ctx: &ScrapeContext<'_>,
    url: &Url,
    cancel: &CancellationToken,
) -> Result<ScrapeOutcome, ScrapeAttemptError> {
    for scraper in scrapers {
        if cancel.is_cancelled() {
            return Err(ScrapeAttemptError::Cancelled {
                next: scraper.name().to_string(),
            });
        }

        debug!(scraper = scraper.name(), "Trying scraper");
        match scraper.try_fetch(ctx, url, cancel).await {
            Ok(ScrapeOutcome::Acquired(units)) if !units.is_empty() => {
                info!(
                    scraper = scraper.name(),
                    units = units.len(),
                    "Scraper acquired content"
                );
                return Ok(ScrapeOutcome::Acquired(units));
            }
            Ok(ScrapeOutcome::Acquired(_)) => {
                debug!(
                    scraper = scraper.name(),
                    "Scraper returned no units, trying next"
                );
            }
            Ok(ScrapeOutcome::NotApplicable) => {
                debug!(scraper = scraper.name(), "Scraper not applicable, trying next");
            }
            Err(source) => {
                warn!(scraper = scraper.name(), error = %source, "Scraper failed");
                return Err(ScrapeAttemptError::Failed {
                    scraper: scraper.name().to_string(),
                    source,
                });
            }
        }
    }
    Ok(ScrapeOutcome::NotApplicable)
}

impl std::fmt::Debug for ScraperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperRegistry")
            .field("scraper_count", &self.scrapers.len())
            .field("scrapers", &self.names())
            .finish()
    }
}

impl Default for ScraperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::content::ContentUnit;
    use crate::scraper::ScrapeError;

    #[derive(Clone)]
    enum Behaviour {
        Acquire(&'static str),
        AcquireNothing,
        Decline,
        Fail,
    }

    struct MockScraper {
        mock_name: &'static str,
        host: &'static str,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl MockScraper {
        fn new(mock_name: &'static str, host: &'static str, behaviour: Behaviour) -> Self {
            Self {
                mock_name,
                host,
                behaviour,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Scraper for MockScraper {
        fn name(&self) -> &str {
            self.mock_name
        }

        fn supports_host(&self, _tenant: &TenantConfig, url: &Url) -> bool {
            url.host_str() == Some(self.host)
        }

        async fn try_fetch(
            &self,
            _ctx: &ScrapeContext<'_>,
            url: &Url,
            _cancel: &CancellationToken,
        ) -> Result<ScrapeOutcome, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Acquire(body) => Ok(ScrapeOutcome::Acquired(vec![
                    ContentUnit::new(body, "text/plain", url.as_str()).unwrap(),
                ])),
                Behaviour::AcquireNothing => Ok(ScrapeOutcome::Acquired(Vec::new())),
                Behaviour::Decline => Ok(ScrapeOutcome::NotApplicable),
                Behaviour::Fail => Err(ScrapeError::invalid_response(url.as_str(), "mock failure")),
            }
        }
    }

    fn url() -> Url {
        Url::parse("https://docs.example.com/file.txt").unwrap()
    }

    fn payload(outcome: &ScrapeOutcome) -> &[u8] {
        match outcome {
            ScrapeOutcome::Acquired(units) => units[0].payload(),
            ScrapeOutcome::NotApplicable => panic!("expected Acquired"),
        }
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ScraperRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.scraper_count(), 0);
    }

    #[test]
    fn test_registry_debug_shows_scrapers() {
        let mut registry = ScraperRegistry::new();
        registry.register(Box::new(MockScraper::new(
            "mock-a",
            "docs.example.com",
            Behaviour::Decline,
        )));
        let debug_str = format!("{registry:?}");
        assert!(debug_str.contains("mock-a"));
        assert!(debug_str.contains("scraper_count: 1"));
    }

    #[test]
    fn test_resolve_applicable_preserves_registration_order() {
        let mut registry = ScraperRegistry::new();
        registry.register(Box::new(MockScraper::new(
            "second-host",
            "other.example.com",
            Behaviour::Decline,
        )));
        registry.register(Box::new(MockScraper::new(
            "z-first",
            "docs.example.com",
            Behaviour::Decline,
        )));
        registry.register(Box::new(MockScraper::new(
            "a-second",
            "docs.example.com",
            Behaviour::Decline,
        )));

        let tenant = TenantConfig::new("t");
        let names: Vec<&str> = registry
            .resolve_applicable(&tenant, &url())
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["z-first", "a-second"]);
    }

    #[tokio::test]
    async fn test_try_acquire_first_success_wins() {
        let first = MockScraper::new("first", "docs.example.com", Behaviour::Acquire("one"));
        let second = MockScraper::new("second", "docs.example.com", Behaviour::Acquire("two"));
        let second_calls = Arc::clone(&second.calls);
        let tenant = TenantConfig::new("t");

        let outcome = try_acquire(
            &[&first as &dyn Scraper, &second],
            &ScrapeContext::new(&tenant),
            &url(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(payload(&outcome), b"one");
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_try_acquire_skips_not_applicable_and_empty() {
        let declines = MockScraper::new("declines", "docs.example.com", Behaviour::Decline);
        let empty = MockScraper::new("empty", "docs.example.com", Behaviour::AcquireNothing);
        let acquires = MockScraper::new("acquires", "docs.example.com", Behaviour::Acquire("ok"));
        let tenant = TenantConfig::new("t");

        let outcome = try_acquire(
            &[&declines as &dyn Scraper, &empty, &acquires],
            &ScrapeContext::new(&tenant),
            &url(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(payload(&outcome), b"ok");
    }

    #[tokio::test]
    async fn test_try_acquire_error_stops_iteration() {
        let fails = MockScraper::new("fails", "docs.example.com", Behaviour::Fail);
        let never = MockScraper::new("never", "docs.example.com", Behaviour::Acquire("x"));
        let never_calls = Arc::clone(&never.calls);
        let tenant = TenantConfig::new("t");

        let err = try_acquire(
            &[&fails as &dyn Scraper, &never],
            &ScrapeContext::new(&tenant),
            &url(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        match err {
            ScrapeAttemptError::Failed { scraper, source } => {
                assert_eq!(scraper, "fails");
                assert!(source.to_string().contains("mock failure"));
            }
            other @ ScrapeAttemptError::Cancelled { .. } => panic!("unexpected {other:?}"),
        }
        assert_eq!(never_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_try_acquire_all_decline_is_not_applicable() {
        let declines = MockScraper::new("declines", "docs.example.com", Behaviour::Decline);
        let tenant = TenantConfig::new("t");
        let outcome = try_acquire(
            &[&declines as &dyn Scraper],
            &ScrapeContext::new(&tenant),
            &url(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, ScrapeOutcome::NotApplicable);
    }

    #[tokio::test]
    async fn test_try_acquire_checks_cancellation_before_attempt() {
        let scraper = MockScraper::new("s", "docs.example.com", Behaviour::Acquire("x"));
        let calls = Arc::clone(&scraper.calls);
        let tenant = TenantConfig::new("t");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = try_acquire(&[&scraper as &dyn Scraper], &ScrapeContext::new(&tenant), &url(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeAttemptError::Cancelled { next } if next == "s"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_registry_acquire_filters_then_tries() {
        let mut registry = ScraperRegistry::new();
        registry.register(Box::new(MockScraper::new(
            "elsewhere",
            "other.example.com",
            Behaviour::Fail,
        )));
        registry.register(Box::new(MockScraper::new(
            "here",
            "docs.example.com",
            Behaviour::Acquire("here"),
        )));
        let tenant = TenantConfig::new("t");
        let outcome = registry
            .acquire(&ScrapeContext::new(&tenant), &url(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(payload(&outcome), b"here");
    }
}
