//! Shared User-Agent string for every outbound HTTP client.

/// Project URL advertised in the User-Agent (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/content-gateway";

/// Default User-Agent for fetcher, scraper and upload traffic.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("content-gateway/{version} (+{PROJECT_UA_URL})")
}
