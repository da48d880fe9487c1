//! SharePoint document library writer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::TokenProvider;
use crate::content::mime::OCTET_STREAM;
use crate::fetch::{FetchError, HttpTimeouts, build_http_client, read_resource, send_request};
use crate::scraper::SHAREPOINT_HOST_SUFFIX;
use crate::tenant::{HostPolicy, TenantConfig};

use super::{RootWriter, RootWriterFactory, StorageRoot, UploadError, UploadedReference};

const ODATA_JSON: &str = "application/json;odata=nometadata";

/// Upper bound on the metadata response read after a write.
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Recognizes SharePoint Online folder roots and writes through the REST API.
pub struct SharePointRootWriterFactory {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    host_suffix: String,
    api_base: Option<Url>,
}

impl SharePointRootWriterFactory {
    /// Creates a factory that requests tokens from `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(tokens: Arc<dyn TokenProvider>, timeouts: HttpTimeouts) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client("sharepoint-upload", timeouts)?,
            tokens,
            host_suffix: SHAREPOINT_HOST_SUFFIX.to_string(),
            api_base: None,
        })
    }

    /// Sends REST calls to `base` instead of the root's own origin.
    #[must_use]
    pub fn with_api_base(mut self, base: Url) -> Self {
        self.api_base = Some(base);
        self
    }
}

impl std::fmt::Debug for SharePointRootWriterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharePointRootWriterFactory")
            .field("host_suffix", &self.host_suffix)
            .field("api_base", &self.api_base.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

/// A root URI split into site prefix and server-relative folder.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FolderTarget {
    origin: String,
    host: String,
    site: String,
    folder: String,
}

fn parse_root(root: &StorageRoot) -> Result<FolderTarget, UploadError> {
    let invalid = |reason: &str| UploadError::InvalidRoot {
        root: root.uri.clone(),
        reason: reason.to_string(),
    };
    let url = Url::parse(&root.uri).map_err(|_| invalid("not an absolute URL"))?;
    let host = url
        .host_str()
        .ok_or_else(|| invalid("missing host"))?
        .to_ascii_lowercase();
    let segments: Vec<String> = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();

    let (site, folder_len) = match segments.as_slice() {
        [scope, name, rest @ ..]
            if scope.eq_ignore_ascii_case("sites") || scope.eq_ignore_ascii_case("teams") =>
        {
            (format!("/{scope}/{name}"), rest.len())
        }
        rest => (String::new(), rest.len()),
    };
    if folder_len == 0 {
        return Err(invalid("root must name a document library folder"));
    }

    Ok(FolderTarget {
        origin: url.origin().ascii_serialization(),
        host,
        site,
        folder: format!("/{}", segments.join("/")),
    })
}

fn quote(path: &str) -> String {
    urlencoding::encode(&path.replace('\'', "''")).into_owned()
}

#[async_trait]
impl RootWriterFactory for SharePointRootWriterFactory {
    fn name(&self) -> &str {
        "sharepoint"
    }

    fn recognizes(&self, root: &StorageRoot) -> bool {
        Url::parse(&root.uri).ok().is_some_and(|url| {
            url.scheme() == "https"
                && url.host_str().is_some_and(|host| {
                    host.to_ascii_lowercase()
                        .strip_suffix(self.host_suffix.as_str())
                        .is_some_and(|label| !label.is_empty())
                })
        })
    }

    #[instrument(skip(self, tenant, cancel), fields(root = %root.uri))]
    async fn writer(
        &self,
        tenant: &TenantConfig,
        root: &StorageRoot,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RootWriter>, UploadError> {
        let target = parse_root(root)?;
        let policy = tenant.host_policy(&target.host).cloned();
        let scopes = policy.as_ref().map(|p| p.scopes.clone()).unwrap_or_default();
        let token = self
            .tokens
            .access_token(tenant, &target.host, &scopes, cancel)
            .await
            .map_err(|e| UploadError::from_auth(&root.uri, e))?;

        let api_origin = match &self.api_base {
            Some(base) => base.as_str().trim_end_matches('/').to_string(),
            None => target.origin.clone(),
        };
        Ok(Box::new(SharePointRootWriter {
            client: self.client.clone(),
            token,
            root_uri: root.uri.clone(),
            api_origin,
            target,
            policy,
        }))
    }
}

struct SharePointRootWriter {
    client: Client,
    token: String,
    root_uri: String,
    api_origin: String,
    target: FolderTarget,
    policy: Option<HostPolicy>,
}

#[derive(Debug, Deserialize)]
struct AddedFile {
    #[serde(rename = "ServerRelativeUrl")]
    server_relative_url: Option<String>,
}

#[async_trait]
impl RootWriter for SharePointRootWriter {
    #[instrument(skip(self, bytes, cancel), fields(bytes = bytes.len()))]
    async fn write(
        &self,
        filename: &str,
        bytes: Bytes,
        cancel: &CancellationToken,
    ) -> Result<UploadedReference, UploadError> {
        let raw = format!(
            "{}{}/_api/web/GetFolderByServerRelativeUrl('{}')/Files/add(url='{}',overwrite=true)",
            self.api_origin,
            self.target.site,
            quote(&self.target.folder),
            quote(filename),
        );
        let mut api_url = Url::parse(&raw).map_err(|_| UploadError::InvalidRoot {
            root: self.root_uri.clone(),
            reason: format!("cannot build upload URL for '{filename}'"),
        })?;
        if let Some(policy) = &self.policy {
            policy.apply_query(&mut api_url);
        }
        debug!(root = %self.root_uri, api_url = %api_url, "Uploading to SharePoint folder");

        let mut request = self
            .client
            .post(api_url.clone())
            .bearer_auth(&self.token)
            .header(ACCEPT, ODATA_JSON)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(bytes);
        if let Some(policy) = &self.policy {
            request = policy.apply_headers(request);
        }

        let response = send_request(request, api_url.as_str(), cancel)
            .await
            .map_err(|e| UploadError::from_fetch(&self.root_uri, e))?;
        let resource = read_resource(response, api_url.as_str(), MAX_RESPONSE_BYTES, cancel)
            .await
            .map_err(|e| UploadError::from_fetch(&self.root_uri, e))?;

        let server_relative = if resource.bytes.is_empty() {
            None
        } else {
            let added: AddedFile = serde_json::from_slice(&resource.bytes).map_err(|e| {
                UploadError::InvalidResponse {
                    root: self.root_uri.clone(),
                    reason: e.to_string(),
                }
            })?;
            added.server_relative_url
        };
        let server_relative = server_relative
            .unwrap_or_else(|| format!("{}/{filename}", self.target.folder.trim_end_matches('/')));
        let uri = format!(
            "{}{}",
            self.target.origin,
            urlencoding::encode(&server_relative).replace("%2F", "/")
        );

        Ok(UploadedReference {
            uri,
            root_uri: self.root_uri.clone(),
            filename: filename.to_string(),
        })
    }
}
