//! Network access for the synchronizer.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::{CacheMode, Request, Response};

/// Performs network requests.
///
/// An `Err` means the network could not produce a response at all. Any
/// response that arrives, whatever its status, is an `Ok`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Sends `request` and returns the full response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for std::sync::Arc<T> {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        (**self).fetch(request).await
    }
}

/// [`Fetcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher using the given client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher with a pooled client suitable for asset downloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn with_defaults() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| Error::Network {
                url: request.url.clone(),
                reason: e.to_string(),
            })?;
        let mut builder = self.client.request(method, &request.url);
        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .header(reqwest::header::PRAGMA, "no-cache");
        }

        let network_error = |e: reqwest::Error| Error::Network {
            url: request.url.clone(),
            reason: e.to_string(),
        };
        let resp = builder.send().await.map_err(network_error)?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await.map_err(network_error)?;

        log::debug!("{} {} -> {status}", request.method, request.url);
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_fetcher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpFetcher>();
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let fetcher = HttpFetcher::with_defaults().unwrap();
        // Port 9 on loopback is the discard service and is closed on test hosts.
        let err = fetcher
            .fetch(&Request::get("http://127.0.0.1:9/index.html"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
    }
}
