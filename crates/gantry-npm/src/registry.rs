//! npm registry client
//!
//! Dist-tags are read over HTTP from `<registry>/-/package/<name>/dist-tags`.
//! Publishing goes through `npm publish` so the user's npm authentication
//! and lifecycle (`prepublishOnly`, `prepack`, ...) apply unchanged.
//!
//! ## Authentication
//!
//! Dist-tag requests send a bearer token when one is found, checked in
//! this order:
//! 1. `NPM_TOKEN` environment variable
//! 2. `_authToken` for the registry host in `~/.npmrc`

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use gantry_core::error::{RegistryError, Result};
use gantry_core::monorepo::manifest::PackageManifest;
use gantry_core::{PublishRequest, Registry};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::client::NpmClient;

/// Default public registry
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// npm registry adapter
pub struct NpmRegistry {
    registry: Url,
    token: Option<String>,
    client: Client,
    npm: NpmClient,
}

impl NpmRegistry {
    /// Create a client for `registry`, or the public registry when unset
    pub fn new(registry: Option<&str>, npm: NpmClient) -> Result<Self> {
        let registry = parse_registry(registry.unwrap_or(DEFAULT_REGISTRY))?;
        let token = load_token(&registry);

        Ok(Self {
            registry,
            token,
            client: Client::new(),
            npm,
        })
    }

    /// Registry address in use
    pub fn registry(&self) -> &Url {
        &self.registry
    }

    fn tags_endpoint(&self, registry: &Url, package: &str) -> Result<Url> {
        dist_tags_url(registry, package).map_err(|e| {
            RegistryError::QueryFailed {
                package: package.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// Parse and normalize a registry address to end with `/`
pub fn parse_registry(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    let url = Url::parse(&with_slash).map_err(|_| RegistryError::InvalidRegistry(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RegistryError::InvalidRegistry(raw.to_string()).into());
    }
    Ok(url)
}

/// Dist-tags endpoint; the `/` of a scoped name is percent-encoded
fn dist_tags_url(registry: &Url, package: &str) -> std::result::Result<Url, url::ParseError> {
    let encoded = package.replace('/', "%2f");
    registry.join(&format!("-/package/{}/dist-tags", encoded))
}

fn load_token(registry: &Url) -> Option<String> {
    if let Ok(token) = std::env::var("NPM_TOKEN") {
        if !token.is_empty() {
            debug!("loaded npm token from NPM_TOKEN");
            return Some(token);
        }
    }

    let npmrc = dirs::home_dir()?.join(".npmrc");
    let content = std::fs::read_to_string(npmrc).ok()?;
    let token = token_from_npmrc(&content, registry);
    if token.is_some() {
        debug!("loaded npm token from ~/.npmrc");
    }
    token
}

/// `//host/path/:_authToken=...` entry for the registry
fn token_from_npmrc(content: &str, registry: &Url) -> Option<String> {
    let prefix = format!("//{}{}:_authToken=", registry.host_str()?, registry.path());
    content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(&prefix))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl Registry for NpmRegistry {
    #[instrument(skip(self))]
    async fn dist_tags(
        &self,
        package: &str,
        registry: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        let base = match registry {
            Some(raw) => parse_registry(raw)?,
            None => self.registry.clone(),
        };
        let url = self.tags_endpoint(&base, package)?;
        debug!(url = %url, "fetching dist-tags");

        let query_failed = |message: String| RegistryError::QueryFailed {
            package: package.to_string(),
            message,
        };

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| query_failed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("package not on the registry");
            return Ok(BTreeMap::new());
        }
        if !status.is_success() {
            return Err(query_failed(format!("{} returned {}", url, status)).into());
        }

        let tags: BTreeMap<String, String> = response
            .json()
            .await
            .map_err(|e| query_failed(e.to_string()))?;
        debug!(count = tags.len(), "dist-tags fetched");
        Ok(tags)
    }

    async fn publish(
        &self,
        manifest: &PackageManifest,
        directory: &Path,
        request: &PublishRequest,
    ) -> Result<()> {
        if let Some(registry) = &request.registry {
            parse_registry(registry)?;
        }
        self.npm.publish(manifest, directory, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::monorepo::versioning::current_published_version;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response on a local port, returning the registry URL
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn registry(url: &str) -> NpmRegistry {
        NpmRegistry::new(Some(url), NpmClient::with_program("npm")).unwrap()
    }

    #[test]
    fn test_parse_registry() {
        let url = parse_registry("https://npm.example.com/api").unwrap();
        assert_eq!(url.as_str(), "https://npm.example.com/api/");
        assert_eq!(
            parse_registry("not a url").unwrap_err().code(),
            "EREGISTRY"
        );
        assert!(parse_registry("ftp://npm.example.com").is_err());
    }

    #[test]
    fn test_dist_tags_url() {
        let base = parse_registry(DEFAULT_REGISTRY).unwrap();
        assert_eq!(
            dist_tags_url(&base, "@scope/pkg").unwrap().as_str(),
            "https://registry.npmjs.org/-/package/@scope%2fpkg/dist-tags"
        );
    }

    #[test]
    fn test_token_from_npmrc() {
        let base = parse_registry("https://npm.example.com/").unwrap();
        let npmrc = "registry=https://npm.example.com/\n//npm.example.com/:_authToken=secret\n";
        assert_eq!(token_from_npmrc(npmrc, &base), Some("secret".to_string()));
        let other = parse_registry(DEFAULT_REGISTRY).unwrap();
        assert_eq!(token_from_npmrc(npmrc, &other), None);
    }

    #[tokio::test]
    async fn test_dist_tags_found_and_missing_tag() {
        let url = serve_once("200 OK", r#"{"latest":"1.4.0","next":"2.0.0-beta.1"}"#).await;
        let registry = registry(&url);

        let tags = registry.dist_tags("pkg", None).await.unwrap();
        assert_eq!(tags.get("latest").map(String::as_str), Some("1.4.0"));

        let url = serve_once("200 OK", r#"{"latest":"1.4.0"}"#).await;
        let registry = self::registry(&url);
        let err = current_published_version(&registry, "pkg", "canary", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENODISTTAG");
    }

    #[tokio::test]
    async fn test_unpublished_package_has_no_tags() {
        let url = serve_once("404 Not Found", r#"{"error":"not found"}"#).await;
        let tags = registry(&url).dist_tags("new-pkg", None).await.unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_query_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let err = registry(&url).dist_tags("pkg", None).await.unwrap_err();
        assert_eq!(err.code(), "ENPMVIEW");
    }

    #[tokio::test]
    async fn test_server_error_is_query_failure() {
        let url = serve_once("500 Internal Server Error", "{}").await;
        let err = registry(&url).dist_tags("pkg", None).await.unwrap_err();
        assert_eq!(err.code(), "ENPMVIEW");
    }
}
