//! Host-specific retrieval strategies.
//!
//! A [`Scraper`] declares whether it applies to a (tenant configuration, URL)
//! pair and, when it does, retrieves one or more content units. Scrapers are
//! held in a [`ScraperRegistry`] whose registration order is the order in
//! which they are tried.
//!
//! # Architecture
//!
//! - [`Scraper`] - Async trait each strategy implements
//! - [`ScraperRegistry`] - Ordered collection plus the attempt loop
//! - [`ScrapeOutcome`] - `Acquired` units or `NotApplicable`
//! - [`SharePointScraper`] - Delegated-auth SharePoint files and site pages
//! - [`GitHubScraper`] - GitHub blob URLs via the raw content host, enabled
//!   per tenant by the [`GITHUB_FEATURE`] flag
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use content_gateway::auth::StaticTokenProvider;
//! use content_gateway::fetch::HttpTimeouts;
//! use content_gateway::scraper::{GITHUB_FEATURE, ScrapeContext, build_default_scraper_registry};
//! use content_gateway::tenant::TenantConfig;
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tokens = Arc::new(StaticTokenProvider::new());
//! let registry = build_default_scraper_registry(tokens, HttpTimeouts::default())?;
//! let tenant = TenantConfig::new("contoso").with_feature(GITHUB_FEATURE);
//! let url = Url::parse("https://github.com/rust-lang/rust/blob/master/README.md")?;
//! let outcome = registry
//!     .acquire(&ScrapeContext::new(&tenant), &url, &CancellationToken::new())
//!     .await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

mod error;
mod github;
mod registry;
mod sharepoint;

pub use error::{ScrapeAttemptError, ScrapeError};
pub use github::{GITHUB_FEATURE, GitHubScraper};
pub use registry::{ScraperRegistry, try_acquire};
pub use sharepoint::{SHAREPOINT_HOST_SUFFIX, SharePointScraper};

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::TokenProvider;
use crate::content::ContentUnit;
use crate::fetch::{FetchError, HttpTimeouts};
use crate::tenant::TenantConfig;

/// Builds the registry used by the gateway binary.
///
/// Order: SharePoint (delegated auth) before GitHub.
///
/// # Errors
///
/// Returns [`FetchError::ClientBuild`] if a scraper's HTTP client cannot be built.
pub fn build_default_scraper_registry(
    tokens: Arc<dyn TokenProvider>,
    timeouts: HttpTimeouts,
) -> Result<ScraperRegistry, FetchError> {
    let mut registry = ScraperRegistry::new();
    registry.register(Box::new(SharePointScraper::new(tokens, timeouts)?));
    registry.register(Box::new(GitHubScraper::new(timeouts)?));
    Ok(registry)
}

/// Per-call context handed to scrapers.
#[derive(Debug, Clone, Copy)]
pub struct ScrapeContext<'a> {
    /// Tenant configuration for the calling session.
    pub tenant: &'a TenantConfig,
}

impl<'a> ScrapeContext<'a> {
    /// Creates a context for `tenant`.
    #[must_use]
    pub fn new(tenant: &'a TenantConfig) -> Self {
        Self { tenant }
    }
}

/// Result of a scraper attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    /// The scraper retrieved the resource.
    Acquired(Vec<ContentUnit>),
    /// The scraper does not handle this particular URL; try the next one.
    NotApplicable,
}

impl ScrapeOutcome {
    /// Returns true for [`ScrapeOutcome::Acquired`] with at least one unit.
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(units) if !units.is_empty())
    }
}

/// Trait implemented by every host-specific retrieval strategy.
///
/// `supports_host` must be pure and cheap; it runs for every registered
/// scraper on every request. Anything needing I/O belongs in `try_fetch`,
/// which may still answer [`ScrapeOutcome::NotApplicable`].
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Returns the scraper's name (e.g. "sharepoint", "github").
    fn name(&self) -> &str;

    /// Returns true if this scraper may handle `url` for `tenant`.
    fn supports_host(&self, tenant: &TenantConfig, url: &Url) -> bool;

    /// Attempts to retrieve `url`.
    async fn try_fetch(
        &self,
        ctx: &ScrapeContext<'_>,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, ScrapeError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;

    #[test]
    fn test_scrape_outcome_is_acquired() {
        let unit = ContentUnit::new("x", "text/plain", "https://example.com/x.txt").unwrap();
        assert!(ScrapeOutcome::Acquired(vec![unit]).is_acquired());
        assert!(!ScrapeOutcome::Acquired(Vec::new()).is_acquired());
        assert!(!ScrapeOutcome::NotApplicable.is_acquired());
    }

    #[test]
    fn test_default_registry_order() {
        let registry = build_default_scraper_registry(
            Arc::new(StaticTokenProvider::new()),
            HttpTimeouts::default(),
        )
        .unwrap();
        assert_eq!(registry.names(), vec!["sharepoint", "github"]);
    }

    #[test]
    fn test_default_registry_applicability_follows_tenant_features() {
        let registry = build_default_scraper_registry(
            Arc::new(StaticTokenProvider::new()),
            HttpTimeouts::default(),
        )
        .unwrap();
        let url = Url::parse("https://github.com/o/r/blob/main/README.md").unwrap();

        let plain = TenantConfig::new("t");
        assert!(registry.resolve_applicable(&plain, &url).is_empty());

        let enabled = TenantConfig::new("t").with_feature(GITHUB_FEATURE);
        let names: Vec<&str> = registry
            .resolve_applicable(&enabled, &url)
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["github"]);
    }
}
