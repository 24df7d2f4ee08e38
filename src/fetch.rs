use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Ways a sheet download can fail, kept distinguishable for per-sheet
/// reporting.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot connect; check internet / URL")]
    ConnectionFailed,
    #[error("HTTP {0}; sheet may not be published")]
    HttpStatus(u16),
    #[error("timed out; the sheet service may be slow")]
    Timeout,
    #[error("invalid sheet URL: {0}")]
    InvalidUrl(String),
}

/// Download collaborator, abstracted so the sync engine can be exercised
/// without a network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Real fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?;
        resp.text().await.map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = err.status() {
        FetchError::HttpStatus(status.as_u16())
    } else {
        FetchError::ConnectionFailed
    }
}
