//! Content Gateway Library
//!
//! Multi-tenant content acquisition and normalization. Given a URL and a
//! tenant's server configuration, the gateway retrieves the resource through
//! the most specific strategy available (delegated-auth scrapers first, a
//! generic HTTP fetch last) and normalizes the bytes into [`ContentUnit`]s
//! with a reliable MIME type, filename and source URI.
//!
//! # Architecture
//!
//! - [`content`] - Content units, MIME normalization, filename derivation
//! - [`tenant`] - Read-only per-tenant host policies
//! - [`auth`] - Delegated token boundary
//! - [`fetch`] - Raw HTTP fetcher and shared client builder
//! - [`scraper`] - Host-specific retrieval strategies and their registry
//! - [`decode`] - MIME-driven decoders and their registry
//! - [`notify`] - Session notification sinks
//! - [`acquisition`] - The scrape/download orchestrator
//! - [`upload`] - Writing content back to session storage roots

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acquisition;
pub mod auth;
pub mod content;
pub mod decode;
pub mod fetch;
pub mod notify;
pub mod scraper;
pub mod tenant;
pub mod upload;

#[cfg(test)]
pub mod test_support;

pub(crate) mod user_agent;

// Re-export commonly used types
pub use acquisition::{AcquisitionError, AcquisitionOptions, AcquisitionService};
pub use auth::{AuthError, StaticTokenProvider, TokenProvider};
pub use content::{ContentError, ContentUnit};
pub use decode::{
    DecodeError, DecodedContent, Decoder, DecoderOrigin, DecoderRegistry,
    build_default_decoder_registry,
};
pub use fetch::{FetchError, FetchedResource, HttpFetcher, HttpTimeouts, RawFetcher};
pub use notify::{NoopSink, NotificationLevel, NotificationSink, NotifyError, TracingSink};
pub use scraper::{
    GITHUB_FEATURE, ScrapeContext, ScrapeError, ScrapeOutcome, Scraper, ScraperRegistry,
    build_default_scraper_registry,
};
pub use tenant::{HostPolicy, TenantConfig, TenantConfigError};
pub use upload::{
    RootCapabilities, RootWriter, RootWriterFactory, StorageRoot, UploadError, UploadService,
    UploadedReference, build_default_upload_service,
};
