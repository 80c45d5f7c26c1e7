//! HTTP registry client for Open VSX and the Visual Studio Marketplace
//!
//! Open VSX is queried through its REST API (`/api/{namespace}/{name}`);
//! the Marketplace through the gallery `extensionquery` endpoint. Packages
//! are written to the download directory as `<id>-<version>.vsix`.
//!
//! Transport and HTTP failures are mapped onto [`ErrorKind`]s here so the
//! retry chain never has to look at reqwest errors.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use extsync_core::types::{EngineConfig, RegistrySource};
use extsync_core::{compare_versions, ErrorKind, OperationError, ParsedVersion};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::collaborators::RegistryClient;

/// Marketplace query flags: include versions, version properties,
/// exclude non-validated
const GALLERY_QUERY_FLAGS: u32 = 0x1 | 0x10 | 0x20;

/// Gallery filter type for "extension name"
const GALLERY_FILTER_EXTENSION_NAME: u32 = 7;

const GALLERY_ACCEPT: &str = "application/json;api-version=3.0-preview.1";

const PRERELEASE_PROPERTY: &str = "Microsoft.VisualStudio.Code.PreRelease";

/// Registry client speaking HTTP to both registries
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    open_vsx_url: String,
    marketplace_url: String,
    download_dir: PathBuf,
}

impl HttpRegistryClient {
    /// Build a client from the engine configuration
    pub fn new(config: &EngineConfig, download_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.network.user_agent)
            .timeout(Duration::from_secs(config.network.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            open_vsx_url: trim_base(&config.sources.open_vsx_url),
            marketplace_url: trim_base(&config.sources.marketplace_url),
            download_dir: download_dir.into(),
        })
    }

    /// Point both registries at other base URLs
    pub fn with_base_urls(mut self, open_vsx: &str, marketplace: &str) -> Self {
        self.open_vsx_url = trim_base(open_vsx);
        self.marketplace_url = trim_base(marketplace);
        self
    }

    pub fn download_dir(&self) -> &std::path::Path {
        &self.download_dir
    }

    fn download_url(
        &self,
        id: &str,
        version: &str,
        source: RegistrySource,
    ) -> Result<String, OperationError> {
        let (publisher, name) = split_id(id)?;
        Ok(match source {
            RegistrySource::OpenVsx => format!(
                "{}/api/{}/{}/{}/file/{}.{}-{}.vsix",
                self.open_vsx_url, publisher, name, version, publisher, name, version
            ),
            RegistrySource::Marketplace => format!(
                "{}/_apis/public/gallery/publishers/{}/vsextensions/{}/{}/vspackage",
                self.marketplace_url, publisher, name, version
            ),
        })
    }

    async fn latest_open_vsx(
        &self,
        id: &str,
        prefer_prerelease: bool,
    ) -> Result<String, OperationError> {
        let (publisher, name) = split_id(id)?;
        let url = format!("{}/api/{}/{}", self.open_vsx_url, publisher, name);

        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        let response = check_status(response, id)?;
        let body: OpenVsxExtension = response.json().await.map_err(|e| {
            OperationError::validation(format!("invalid Open VSX response for {}: {}", id, e))
        })?;

        if let Some(error) = body.error {
            return Err(OperationError::not_found(format!("{}: {}", id, error)));
        }

        let version = body
            .version
            .ok_or_else(|| OperationError::not_found(format!("{} has no published version", id)))?;

        if body.pre_release && !prefer_prerelease {
            if let Some(stable) = newest_stable(body.all_versions.keys().map(String::as_str)) {
                return Ok(stable);
            }
        }
        Ok(version)
    }

    async fn latest_marketplace(
        &self,
        id: &str,
        prefer_prerelease: bool,
    ) -> Result<String, OperationError> {
        split_id(id)?;
        let url = format!("{}/_apis/public/gallery/extensionquery", self.marketplace_url);
        let query = json!({
            "filters": [{
                "criteria": [{ "filterType": GALLERY_FILTER_EXTENSION_NAME, "value": id }],
                "pageNumber": 1,
                "pageSize": 1
            }],
            "flags": GALLERY_QUERY_FLAGS
        });

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, GALLERY_ACCEPT)
            .json(&query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, id)?;
        let body: GalleryResponse = response.json().await.map_err(|e| {
            OperationError::validation(format!("invalid Marketplace response for {}: {}", id, e))
        })?;

        let versions = body
            .results
            .into_iter()
            .flat_map(|r| r.extensions)
            .next()
            .map(|ext| ext.versions)
            .unwrap_or_default();

        // The gallery lists versions newest first
        versions
            .iter()
            .find(|v| prefer_prerelease || !v.is_prerelease())
            .or_else(|| versions.first())
            .map(|v| v.version.clone())
            .ok_or_else(|| {
                OperationError::not_found(format!("{} not found on the Marketplace", id))
            })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn resolve_latest_version(
        &self,
        id: &str,
        prefer_prerelease: bool,
        source: RegistrySource,
    ) -> Result<String, OperationError> {
        let version = match source {
            RegistrySource::OpenVsx => self.latest_open_vsx(id, prefer_prerelease).await?,
            RegistrySource::Marketplace => self.latest_marketplace(id, prefer_prerelease).await?,
        };
        debug!(id = %id, %source, version = %version, "resolved latest version");
        Ok(version)
    }

    async fn fetch(
        &self,
        id: &str,
        version: &str,
        source: RegistrySource,
    ) -> Result<PathBuf, OperationError> {
        let url = self.download_url(id, version, source)?;
        debug!(id = %id, %source, url = %url, "downloading package");

        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        let response = check_status(response, id)?;
        let bytes = response.bytes().await.map_err(transport_error)?;

        // The Marketplace may serve the package gzip-encoded
        let payload = if bytes.starts_with(&[0x1f, 0x8b]) {
            let mut decoded = Vec::new();
            flate2::read::GzDecoder::new(&bytes[..])
                .read_to_end(&mut decoded)
                .map_err(|e| {
                    OperationError::validation(format!("corrupt package for {}: {}", id, e))
                })?;
            decoded
        } else {
            bytes.to_vec()
        };
        if payload.is_empty() {
            return Err(OperationError::validation(format!(
                "empty package for {}@{}",
                id, version
            )));
        }

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| OperationError::classify(e.to_string()))?;
        let target = self
            .download_dir
            .join(format!("{}-{}.vsix", id.to_lowercase(), version));
        let partial = target.with_extension("vsix.partial");

        tokio::fs::write(&partial, &payload)
            .await
            .map_err(|e| OperationError::classify(e.to_string()))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| OperationError::classify(e.to_string()))?;

        debug!(id = %id, bytes = payload.len(), path = %target.display(), "package saved");
        Ok(target)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenVsxExtension {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    pre_release: bool,
    #[serde(default)]
    all_versions: std::collections::BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GalleryResponse {
    #[serde(default)]
    results: Vec<GalleryResult>,
}

#[derive(Debug, Deserialize)]
struct GalleryResult {
    #[serde(default)]
    extensions: Vec<GalleryExtension>,
}

#[derive(Debug, Deserialize)]
struct GalleryExtension {
    #[serde(default)]
    versions: Vec<GalleryVersion>,
}

#[derive(Debug, Deserialize)]
struct GalleryVersion {
    version: String,
    #[serde(default)]
    properties: Vec<GalleryProperty>,
}

#[derive(Debug, Deserialize)]
struct GalleryProperty {
    key: String,
    value: String,
}

impl GalleryVersion {
    fn is_prerelease(&self) -> bool {
        self.properties
            .iter()
            .any(|p| p.key == PRERELEASE_PROPERTY && p.value.eq_ignore_ascii_case("true"))
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn split_id(id: &str) -> Result<(&str, &str), OperationError> {
    match id.split_once('.') {
        Some((publisher, name)) if !publisher.is_empty() && !name.is_empty() => {
            Ok((publisher, name))
        }
        _ => Err(OperationError::validation(format!(
            "invalid extension id: {} (expected publisher.name)",
            id
        ))),
    }
}

/// Highest version without a prerelease tag
fn newest_stable<'a>(versions: impl Iterator<Item = &'a str>) -> Option<String> {
    versions
        .filter_map(|v| ParsedVersion::parse(v).filter(|p| p.prerelease.is_none()).map(|_| v))
        .max_by(|a, b| compare_versions(a, b).unwrap_or(std::cmp::Ordering::Equal))
        .map(str::to_string)
}

/// Map an HTTP status to a failure kind
fn check_status(
    response: reqwest::Response,
    id: &str,
) -> Result<reqwest::Response, OperationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let kind = match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => ErrorKind::Network,
        s if s.is_server_error() => ErrorKind::Network,
        _ => ErrorKind::Other,
    };
    Err(OperationError::new(
        kind,
        format!("registry returned {} for {}", status, id),
    ))
}

/// Transport failures are network failures, including client-side timeouts
fn transport_error(e: reqwest::Error) -> OperationError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        OperationError::network(e.to_string())
    } else if e.is_decode() {
        OperationError::validation(e.to_string())
    } else {
        OperationError::classify_or(e.to_string(), ErrorKind::Network)
    }
}
