//! Writing content back to session-declared storage roots.
//!
//! A session may declare storage roots (a URI plus capability metadata).
//! [`UploadService::upload`] keeps the writable roots some registered
//! [`RootWriterFactory`] recognizes, then tries them in declaration order.
//! A recoverable failure moves on to the next root; anything else stops the
//! chain. When every candidate failed recoverably the result is `Ok(None)`.

mod error;
mod sharepoint;

pub use error::UploadError;
pub use sharepoint::SharePointRootWriterFactory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::TokenProvider;
use crate::content::filename::sanitize_filename;
use crate::fetch::{FetchError, HttpTimeouts};
use crate::tenant::TenantConfig;

/// What a session allows the gateway to do with a root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootCapabilities {
    /// Files may be created or overwritten under the root.
    pub writable: bool,
}

/// A storage location declared by the calling session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRoot {
    /// Root URI, e.g. a SharePoint document library folder.
    pub uri: String,
    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: RootCapabilities,
}

impl StorageRoot {
    /// Creates a read-only root.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            capabilities: RootCapabilities::default(),
        }
    }

    /// Marks the root writable.
    #[must_use]
    pub fn writable(mut self) -> Self {
        self.capabilities.writable = true;
        self
    }
}

/// Where an upload landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedReference {
    /// Absolute URI of the written file.
    pub uri: String,
    /// Root the file was written under.
    pub root_uri: String,
    /// Name the file was stored as.
    pub filename: String,
}

/// Client able to write files under one storage root.
#[async_trait]
pub trait RootWriter: Send + Sync {
    /// Writes `bytes` as `filename` under the root, overwriting any existing file.
    async fn write(
        &self,
        filename: &str,
        bytes: Bytes,
        cancel: &CancellationToken,
    ) -> Result<UploadedReference, UploadError>;
}

/// Produces [`RootWriter`]s for the roots it recognizes.
#[async_trait]
pub trait RootWriterFactory: Send + Sync {
    /// Returns the factory's name (e.g. "sharepoint").
    fn name(&self) -> &str;

    /// Returns true if this factory can address `root`. Must be cheap.
    fn recognizes(&self, root: &StorageRoot) -> bool;

    /// Resolves a write client for `root` on behalf of `tenant`.
    async fn writer(
        &self,
        tenant: &TenantConfig,
        root: &StorageRoot,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RootWriter>, UploadError>;
}

/// Builds the upload service shipped with the gateway.
///
/// # Errors
///
/// Returns [`FetchError::ClientBuild`] if a writer's HTTP client cannot be built.
pub fn build_default_upload_service(
    tokens: Arc<dyn TokenProvider>,
    timeouts: HttpTimeouts,
) -> Result<UploadService, FetchError> {
    let mut service = UploadService::new();
    service.register(Box::new(SharePointRootWriterFactory::new(tokens, timeouts)?));
    Ok(service)
}

/// Ordered set of writer factories plus the root fallback chain.
pub struct UploadService {
    factories: Vec<Box<dyn RootWriterFactory>>,
}

impl UploadService {
    /// Creates a service with no factories.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Appends a factory. Earlier factories win when several recognize a root.
    #[tracing::instrument(skip(self, factory), fields(factory_name))]
    pub fn register(&mut self, factory: Box<dyn RootWriterFactory>) {
        tracing::Span::current().record("factory_name", factory.name());
        debug!(name = factory.name(), "Registering root writer factory");
        self.factories.push(factory);
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }

    /// Returns the writable roots a factory recognizes, in declaration
    /// order, each paired with the factory that will handle it.
    #[must_use]
    pub fn candidates<'a>(
        &'a self,
        roots: &'a [StorageRoot],
    ) -> Vec<(&'a StorageRoot, &'a dyn RootWriterFactory)> {
        roots
            .iter()
            .filter(|root| root.capabilities.writable)
            .filter_map(|root| {
                self.factories
                    .iter()
                    .find(|f| f.recognizes(root))
                    .map(|f| (root, f.as_ref()))
            })
            .collect()
    }

    /// Uploads `bytes` as `filename` to the first root that accepts it.
    ///
    /// Returns `Ok(None)` when no roots were declared, none is usable, or
    /// every candidate failed recoverably.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable [`UploadError`] (auth rejection,
    /// cancellation, invalid filename).
    #[tracing::instrument(skip(self, tenant, roots, bytes, cancel), fields(tenant = %tenant.tenant_id, roots = roots.len()))]
    pub async fn upload(
        &self,
        tenant: &TenantConfig,
        roots: &[StorageRoot],
        filename: &str,
        bytes: Bytes,
        cancel: &CancellationToken,
    ) -> Result<Option<UploadedReference>, UploadError> {
        let trimmed = filename.trim();
        if trimmed.is_empty() {
            return Err(UploadError::InvalidFilename {
                filename: filename.to_string(),
            });
        }
        let filename = sanitize_filename(trimmed);

        let candidates = self.candidates(roots);
        if candidates.is_empty() {
            debug!("No writable root recognized, skipping upload");
            return Ok(None);
        }

        for (root, factory) in candidates {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled {
                    root: root.uri.clone(),
                });
            }
            match Self::write_to(factory, tenant, root, &filename, bytes.clone(), cancel).await {
                Ok(reference) => {
                    info!(root = %root.uri, uri = %reference.uri, "Upload complete");
                    return Ok(Some(reference));
                }
                Err(error) if error.is_recoverable() => {
                    warn!(root = %root.uri, error = %error, "Upload to root failed, trying next");
                }
                Err(error) => return Err(error),
            }
        }
        warn!("Every candidate root failed");
        Ok(None)
    }

    async fn write_to(
        factory: &dyn RootWriterFactory,
        tenant: &TenantConfig,
        root: &StorageRoot,
        filename: &str,
        bytes: Bytes,
        cancel: &CancellationToken,
    ) -> Result<UploadedReference, UploadError> {
        let writer = factory.writer(tenant, root, cancel).await?;
        writer.write(filename, bytes, cancel).await
    }
}

impl std::fmt::Debug for UploadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.factories.iter().map(|f| f.name()).collect();
        f.debug_struct("UploadService")
            .field("factory_count", &self.factories.len())
            .field("factories", &names)
            .finish()
    }
}

impl Default for UploadService {
    fn default() -> Self {
        Self::new()
    }
}
