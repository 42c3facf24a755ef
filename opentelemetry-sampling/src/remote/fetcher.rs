//! The fetch collaborator: how strategy responses reach the poller.

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, StatusCode, Uri};
use opentelemetry_http::HttpClient;
use thiserror::Error;
use url::Url;

use super::strategy::SamplingStrategyResponse;

/// Failures while fetching a strategy response.
///
/// These are consumed by the poll loop only: one failed tick is logged and
/// the previously installed policy stays authoritative.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The request could not be built or sent.
    #[error("strategy request failed: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The endpoint answered with a non-OK status.
    #[error("strategy endpoint returned status {0}")]
    Status(StatusCode),

    /// The response body was not a valid strategy document.
    #[error("malformed strategy response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request did not complete within the configured timeout.
    #[error("strategy request timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetches the sampling strategy for a service.
///
/// The poller is agnostic to the transport; anything able to produce a
/// [`SamplingStrategyResponse`] can drive it.
#[async_trait]
pub trait StrategyFetcher: Send + Sync + Debug {
    /// Fetch the current strategy for `service_name`.
    async fn fetch(&self, service_name: &str) -> Result<SamplingStrategyResponse, FetchError>;
}

/// [`StrategyFetcher`] over HTTP, speaking the Jaeger remote-sampling
/// protocol: `GET <endpoint>?service=<name>` returning a JSON strategy
/// document.
#[derive(Debug)]
pub struct HttpStrategyFetcher<C> {
    client: C,
    endpoint: Url,
    request_timeout: Duration,
}

impl<C: HttpClient> HttpStrategyFetcher<C> {
    /// Fetch strategies from `endpoint` with the given per-request timeout.
    pub fn new(client: C, endpoint: Url, request_timeout: Duration) -> Self {
        HttpStrategyFetcher {
            client,
            endpoint,
            request_timeout,
        }
    }

    fn request_uri(&self, service_name: &str) -> Result<Uri, FetchError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("service", service_name);
        Uri::from_str(url.as_str()).map_err(|err| FetchError::Http(Box::new(err)))
    }
}

#[async_trait]
impl<C: HttpClient + 'static> StrategyFetcher for HttpStrategyFetcher<C> {
    async fn fetch(&self, service_name: &str) -> Result<SamplingStrategyResponse, FetchError> {
        let request = Request::get(self.request_uri(service_name)?)
            .header("Content-Type", "application/json")
            .body(Bytes::new())
            .map_err(|err| FetchError::Http(Box::new(err)))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.send_bytes(request))
            .await
            .map_err(|_| FetchError::Timeout(self.request_timeout))?
            .map_err(FetchError::Http)?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status(response.status()));
        }
        Ok(serde_json::from_slice(&response.body()[..])?)
    }
}
