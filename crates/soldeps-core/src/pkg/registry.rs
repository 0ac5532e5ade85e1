//! npm registry client.

use super::error::PkgError;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Source of package metadata ("packuments").
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Fetch the packument for a package.
    async fn fetch_packument(&self, name: &str) -> Result<Arc<serde_json::Value>, PkgError>;
}

/// Cached packument data.
type PackumentCache = Arc<RwLock<HashMap<String, Arc<serde_json::Value>>>>;

/// Registry client for fetching package metadata over HTTP.
///
/// Packuments are memoised for the lifetime of the client.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
    packuments: PackumentCache,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(crate::version::user_agent())
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            packuments: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn fetch_uncached(&self, name: &str) -> Result<serde_json::Value, PkgError> {
        // Scoped names keep their @ but encode the slash.
        let encoded_name = if name.starts_with('@') {
            name.replace('/', "%2F")
        } else {
            name.to_string()
        };

        let url = self
            .base_url
            .join(&encoded_name)
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))?;

        debug!(package = name, url = %url, "Fetching packument");
        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PackageRegistry for RegistryClient {
    async fn fetch_packument(&self, name: &str) -> Result<Arc<serde_json::Value>, PkgError> {
        if let Some(cached) = self.packuments.read().await.get(name) {
            return Ok(Arc::clone(cached));
        }

        let packument = Arc::new(self.fetch_uncached(name).await?);
        self.packuments
            .write()
            .await
            .insert(name.to_string(), Arc::clone(&packument));
        Ok(packument)
    }
}

/// Extract the latest version from a packument.
#[must_use]
pub fn get_latest_version(packument: &serde_json::Value) -> Option<&str> {
    packument.get("dist-tags")?.get("latest")?.as_str()
}

/// Get all available version strings from a packument.
#[must_use]
pub fn get_versions(packument: &serde_json::Value) -> Vec<&str> {
    packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_latest_version() {
        let packument = serde_json::json!({
            "name": "@openzeppelin/contracts",
            "dist-tags": { "latest": "5.0.2" }
        });

        assert_eq!(get_latest_version(&packument), Some("5.0.2"));
    }

    #[test]
    fn test_get_versions() {
        let packument = serde_json::json!({
            "name": "solmate",
            "versions": { "6.1.0": {}, "6.2.0": {} }
        });

        let versions = get_versions(&packument);
        assert_eq!(versions.len(), 2);
        assert!(versions.contains(&"6.2.0"));
    }

    #[test]
    fn test_client_creation_appends_slash() {
        let client = RegistryClient::new("http://127.0.0.1:4873").unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:4873/");
    }

    #[test]
    fn test_client_invalid_url() {
        assert!(RegistryClient::new("not-a-url").is_err());
    }
}
