//! Remote content fetch over HTTP.

use super::FetchError;
use crate::config::ResolverSettings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Fetches remote source text by URL.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// `reqwest`-backed fetcher. `ipfs://` and `bzz-raw://` go through HTTP gateways.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    ipfs_gateway: String,
    swarm_gateway: String,
}

impl HttpFetcher {
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(settings: &ResolverSettings) -> Result<Self, FetchError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .user_agent(crate::version::user_agent())
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            ipfs_gateway: with_trailing_slash(&settings.ipfs_gateway),
            swarm_gateway: with_trailing_slash(&settings.swarm_gateway),
        })
    }

    /// The HTTP URL actually requested for `url`.
    #[must_use]
    pub fn gateway_url(&self, url: &str) -> String {
        if let Some(rest) = url.strip_prefix("ipfs://") {
            let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
            return format!("{}{rest}", self.ipfs_gateway);
        }
        if let Some(rest) = url.strip_prefix("bzz-raw://") {
            return format!("{}{rest}", self.swarm_gateway);
        }
        url.to_string()
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[async_trait]
impl RemoteFetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let request_url = self.gateway_url(url);
        debug!(url, request_url = %request_url, "Fetching remote content");

        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.http.get(&request_url).send().await.map_err(transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound {
                target: url.to_string(),
            }),
            status if !status.is_success() => Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
            _ => response.text().await.map_err(transport),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpFetcher {
        let settings = ResolverSettings {
            ipfs_gateway: "https://gateway.example/ipfs".to_string(),
            ..ResolverSettings::default()
        };
        HttpFetcher::new(&settings).unwrap()
    }

    #[test]
    fn test_gateway_urls() {
        let fetcher = fetcher();
        assert_eq!(
            fetcher.gateway_url("ipfs://QmHash/Lib.sol"),
            "https://gateway.example/ipfs/QmHash/Lib.sol"
        );
        assert_eq!(
            fetcher.gateway_url("ipfs://ipfs/QmHash/Lib.sol"),
            "https://gateway.example/ipfs/QmHash/Lib.sol"
        );
        assert_eq!(
            fetcher.gateway_url("bzz-raw://abcdef/Lib.sol"),
            "https://api.gateway.ethswarm.org/bzz/abcdef/Lib.sol"
        );
        assert_eq!(
            fetcher.gateway_url("https://example.com/A.sol"),
            "https://example.com/A.sol"
        );
    }
}
