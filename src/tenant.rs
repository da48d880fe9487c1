//! Per-tenant server configuration consulted when choosing a retrieval strategy.
//!
//! The configuration is read-only input to the pipeline: it maps hosts to the
//! delegated-auth scopes a tenant has granted, carries static header and query
//! overrides per host, and lists declared feature flags.
//!
//! Host keys are either exact hosts (`contoso.sharepoint.com`) or wildcard
//! suffixes (`*.sharepoint.com`). An exact entry always wins over a wildcard.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use reqwest::RequestBuilder;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Errors loading a tenant configuration.
#[derive(Debug, Error)]
pub enum TenantConfigError {
    /// The configuration file could not be read.
    #[error("failed to read tenant config '{path}': {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for this schema.
    #[error(
        "invalid tenant config: {source}\n  Suggestion: Expected {{\"tenant_id\": ..., \"hosts\": {{...}}, \"features\": [...]}}"
    )]
    Parse {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A host key is malformed.
    #[error("invalid host pattern '{pattern}' in tenant config: {reason}")]
    InvalidHostPattern {
        /// The offending key.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Per-host settings granted by a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPolicy {
    /// Delegated-auth scopes the tenant grants for this host.
    pub scopes: Vec<String>,
    /// Static headers added to every request against this host.
    pub headers: BTreeMap<String, String>,
    /// Static query parameters added to every request against this host.
    pub query: BTreeMap<String, String>,
}

impl HostPolicy {
    /// Returns true if at least one delegated scope is granted.
    #[must_use]
    pub fn has_delegated_scopes(&self) -> bool {
        self.scopes.iter().any(|s| !s.trim().is_empty())
    }

    /// Returns true if `scope` is granted (case-insensitive).
    #[must_use]
    pub fn grants(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s.eq_ignore_ascii_case(scope))
    }

    /// Adds this policy's static header overrides to `request`.
    ///
    /// Invalid header names or values are skipped with a warning.
    pub fn apply_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!(header = %name, "Skipping invalid tenant header override"),
            }
        }
        request
    }

    /// Appends this policy's query overrides to `url`.
    pub fn apply_query(&self, url: &mut Url) {
        if self.query.is_empty() {
            return;
        }
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &self.query {
            pairs.append_pair(key, value);
        }
    }
}

/// Read-only configuration for a single tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Stable tenant identifier used in logs and token requests.
    pub tenant_id: String,
    /// Host (or `*.suffix` wildcard) to policy map.
    pub hosts: HashMap<String, HostPolicy>,
    /// Declared feature flags. Scrapers consult these to decide whether
    /// they apply (e.g. `github` enables the GitHub scraper).
    pub features: BTreeSet<String>,
}

impl TenantConfig {
    /// Creates an empty configuration for `tenant_id`.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }

    /// Adds (or replaces) the policy for a host pattern.
    #[must_use]
    pub fn with_host(mut self, pattern: impl Into<String>, policy: HostPolicy) -> Self {
        let pattern: String = pattern.into();
        self.hosts.insert(pattern.trim().to_ascii_lowercase(), policy);
        self
    }

    /// Declares a feature flag.
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TenantConfigError::Parse`] for malformed JSON and
    /// [`TenantConfigError::InvalidHostPattern`] for bad host keys.
    pub fn from_json_str(raw: &str) -> Result<Self, TenantConfigError> {
        let parsed: Self =
            serde_json::from_str(raw).map_err(|source| TenantConfigError::Parse { source })?;
        parsed.normalized()
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`TenantConfigError::Io`] when the file cannot be read, plus
    /// the errors of [`TenantConfig::from_json_str`].
    pub fn from_path(path: &Path) -> Result<Self, TenantConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TenantConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    fn normalized(self) -> Result<Self, TenantConfigError> {
        let mut hosts = HashMap::with_capacity(self.hosts.len());
        for (pattern, policy) in self.hosts {
            let key = pattern.trim().to_ascii_lowercase();
            validate_host_pattern(&key)?;
            hosts.insert(key, policy);
        }
        Ok(Self { hosts, ..self })
    }

    /// Returns true if the tenant declared `feature`.
    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Looks up the policy for `host`.
    ///
    /// Exact host entries win; otherwise the longest matching `*.suffix`
    /// wildcard is used.
    #[must_use]
    pub fn host_policy(&self, host: &str) -> Option<&HostPolicy> {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        if let Some(policy) = self.hosts.get(&host) {
            return Some(policy);
        }
        self.hosts
            .iter()
            .filter_map(|(pattern, policy)| {
                let suffix = pattern.strip_prefix("*.")?;
                let matches = host
                    .strip_suffix(suffix)
                    .is_some_and(|rest| rest.ends_with('.') && rest.len() > 1);
                matches.then_some((suffix.len(), policy))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, policy)| policy)
    }

    /// Looks up the policy for the host of `url`.
    #[must_use]
    pub fn policy_for_url(&self, url: &Url) -> Option<&HostPolicy> {
        url.host_str().and_then(|host| self.host_policy(host))
    }

    /// Returns the delegated scopes granted for the host of `url`.
    #[must_use]
    pub fn scopes_for_url(&self, url: &Url) -> &[String] {
        self.policy_for_url(url)
            .map(|policy| policy.scopes.as_slice())
            .unwrap_or_default()
    }
}

fn validate_host_pattern(pattern: &str) -> Result<(), TenantConfigError> {
    let invalid = |reason: &str| TenantConfigError::InvalidHostPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };
    if pattern.is_empty() {
        return Err(invalid("host pattern is empty"));
    }
    if pattern.contains("://") || pattern.contains('/') {
        return Err(invalid("expected a bare host, not a URL"));
    }
    let body = pattern.strip_prefix("*.").unwrap_or(pattern);
    if body.is_empty() || body.contains('*') {
        return Err(invalid("wildcards are only allowed as a leading '*.'"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scoped(scopes: &[&str]) -> HostPolicy {
        HostPolicy {
            scopes: scopes.iter().map(ToString::to_string).collect(),
            ..HostPolicy::default()
        }
    }

    #[test]
    fn test_host_policy_exact_wins_over_wildcard() {
        let config = TenantConfig::new("t1")
            .with_host("*.sharepoint.com", scoped(&["Sites.Read.All"]))
            .with_host("contoso.sharepoint.com", scoped(&["AllSites.Write"]));

        let policy = config.host_policy("contoso.sharepoint.com").unwrap();
        assert!(policy.grants("allsites.write"));

        let other = config.host_policy("fabrikam.sharepoint.com").unwrap();
        assert!(other.grants("Sites.Read.All"));
    }

    #[test]
    fn test_host_policy_wildcard_does_not_match_bare_suffix() {
        let config = TenantConfig::new("t1").with_host("*.sharepoint.com", scoped(&["s"]));
        assert!(config.host_policy("sharepoint.com").is_none());
        assert!(config.host_policy("evilsharepoint.com").is_none());
        assert!(config.host_policy("CONTOSO.SharePoint.com.").is_some());
    }

    #[test]
    fn test_host_policy_longest_wildcard_wins() {
        let config = TenantConfig::new("t1")
            .with_host("*.com", scoped(&["broad"]))
            .with_host("*.sharepoint.com", scoped(&["narrow"]));
        let policy = config.host_policy("contoso.sharepoint.com").unwrap();
        assert!(policy.grants("narrow"));
    }

    #[test]
    fn test_from_json_str_parses_hosts_and_features() {
        let raw = r#"{
            "tenant_id": "contoso",
            "hosts": {
                "*.SharePoint.com": { "scopes": ["Sites.Read.All"] },
                "github.com": { "headers": { "Authorization": "token abc" } }
            },
            "features": ["github"]
        }"#;
        let config = TenantConfig::from_json_str(raw).unwrap();
        assert_eq!(config.tenant_id, "contoso");
        assert!(config.has_feature("github"));
        assert!(!config.has_feature("GitHub"));
        let url = Url::parse("https://contoso.sharepoint.com/sites/x/doc.docx").unwrap();
        assert_eq!(config.scopes_for_url(&url), ["Sites.Read.All".to_string()]);
        let gh = config.host_policy("github.com").unwrap();
        assert_eq!(gh.headers.get("Authorization").unwrap(), "token abc");
        assert!(!gh.has_delegated_scopes());
    }

    #[test]
    fn test_from_json_str_rejects_url_host_key() {
        let raw = r#"{ "hosts": { "https://contoso.sharepoint.com": {} } }"#;
        let err = TenantConfig::from_json_str(raw).unwrap_err();
        assert!(matches!(err, TenantConfigError::InvalidHostPattern { .. }));
    }

    #[test]
    fn test_from_json_str_rejects_malformed_json() {
        let err = TenantConfig::from_json_str("{not json").unwrap_err();
        assert!(err.to_string().contains("invalid tenant config"));
    }

    #[test]
    fn test_apply_query_appends_pairs() {
        let mut policy = HostPolicy::default();
        policy.query.insert("api-version".to_string(), "2".to_string());
        let mut url = Url::parse("https://example.com/a?x=1").unwrap();
        policy.apply_query(&mut url);
        assert_eq!(url.as_str(), "https://example.com/a?x=1&api-version=2");
    }

    #[test]
    fn test_scopes_for_url_without_policy_is_empty() {
        let config = TenantConfig::new("t1");
        let url = Url::parse("https://example.com/report.csv").unwrap();
        assert!(config.scopes_for_url(&url).is_empty());
    }
}
