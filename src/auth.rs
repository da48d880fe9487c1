//! Delegated-auth token boundary.
//!
//! Token exchange itself belongs to the host process. Scrapers and upload
//! writers that need tenant-scoped credentials ask a [`TokenProvider`] for a
//! bearer token for a host and a set of scopes.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::tenant::TenantConfig;

/// Errors obtaining a delegated token.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The tenant has not granted any scope usable for this host.
    #[error(
        "no delegated scopes granted for '{host}' (tenant '{tenant_id}')\n  Suggestion: Add the host and its scopes to the tenant configuration"
    )]
    NoScopes {
        /// Tenant identifier.
        tenant_id: String,
        /// Host that was requested.
        host: String,
    },

    /// The token issuer rejected the request.
    #[error("token request for '{host}' rejected: {reason}")]
    Rejected {
        /// Host that was requested.
        host: String,
        /// Upstream diagnostic text.
        reason: String,
    },

    /// The caller cancelled while waiting for a token.
    #[error("token request for '{host}' cancelled")]
    Cancelled {
        /// Host that was requested.
        host: String,
    },
}

/// Host-supplied source of tenant-scoped bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a bearer token for `host` covering `scopes`.
    async fn access_token(
        &self,
        tenant: &TenantConfig,
        host: &str,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, AuthError>;
}

/// Token provider backed by a fixed host → token table.
///
/// Useful for hosts that pre-exchange tokens per request, and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, String>,
}

impl StaticTokenProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for a host.
    #[must_use]
    pub fn with_token(mut self, host: impl Into<String>, token: impl Into<String>) -> Self {
        let host: String = host.into();
        self.tokens.insert(host.to_ascii_lowercase(), token.into());
        self
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(
        &self,
        tenant: &TenantConfig,
        host: &str,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled {
                host: host.to_string(),
            });
        }
        if scopes.is_empty() {
            return Err(AuthError::NoScopes {
                tenant_id: tenant.tenant_id.clone(),
                host: host.to_string(),
            });
        }
        self.tokens
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| AuthError::Rejected {
                host: host.to_string(),
                reason: "no token registered for host".to_string(),
            })
    }
}
