use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc;
use futures_util::{stream, StreamExt as _};
use opentelemetry::{
    otel_debug, otel_warn,
    trace::{Link, SamplingResult, SpanKind, TraceId},
    Context, KeyValue,
};
use opentelemetry_http::HttpClient;
use opentelemetry_sdk::trace::ShouldSample;
use tokio_stream::wrappers::IntervalStream;
use url::Url;

use super::fetcher::{HttpStrategyFetcher, StrategyFetcher};
use super::sampling_strategy::SamplingStrategy;
use crate::error::ConfigError;

const DEFAULT_ENDPOINT: &str = "http://localhost:5778/sampling";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configures an [`AdaptiveSampler`].
///
/// Created via [`AdaptiveSampler::builder`]. All configuration is validated
/// in [`build`](AdaptiveSamplerBuilder::build), before any traffic is
/// processed.
#[derive(Debug)]
pub struct AdaptiveSamplerBuilder<C, S>
where
    C: HttpClient + 'static,
    S: ShouldSample + 'static,
{
    client: C,
    fallback: S,
    service_name: String,
    endpoint: String,
    poll_interval: Duration,
    request_timeout: Duration,
    fetcher: Option<Box<dyn StrategyFetcher>>,
}

impl<C, S> AdaptiveSamplerBuilder<C, S>
where
    C: HttpClient + 'static,
    S: ShouldSample + 'static,
{
    /// The strategy endpoint to poll. Defaults to the local Jaeger agent,
    /// `http://localhost:5778/sampling`.
    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..self
        }
    }

    /// How often to poll for a new strategy. Defaults to five minutes.
    pub fn with_poll_interval(self, interval: Duration) -> Self {
        Self {
            poll_interval: interval,
            ..self
        }
    }

    /// Per-request timeout for strategy fetches. Defaults to ten seconds.
    pub fn with_request_timeout(self, timeout: Duration) -> Self {
        Self {
            request_timeout: timeout,
            ..self
        }
    }

    /// Replace the HTTP transport with a custom fetch collaborator.
    pub fn with_strategy_fetcher(self, fetcher: Box<dyn StrategyFetcher>) -> Self {
        Self {
            fetcher: Some(fetcher),
            ..self
        }
    }

    /// Validate the configuration and start the background poll task.
    ///
    /// Must be called within a Tokio runtime; the poll task lives on it
    /// until the sampler is shut down or the last clone is dropped.
    pub fn build(self) -> Result<AdaptiveSampler, ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidInterval);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        let fetcher: Box<dyn StrategyFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let endpoint = Url::parse(&self.endpoint).map_err(|err| {
                    ConfigError::InvalidEndpoint(format!("{}: {err}", self.endpoint))
                })?;
                Box::new(HttpStrategyFetcher::new(
                    self.client,
                    endpoint,
                    self.request_timeout,
                ))
            }
        };
        Ok(AdaptiveSampler::new(
            fetcher,
            Box::new(self.fallback),
            self.service_name,
            self.poll_interval,
        ))
    }
}

/// A sampler whose policy is refreshed from a remote strategy endpoint.
///
/// Until the first successful poll the caller-supplied fallback decides;
/// afterwards each successful poll atomically replaces the active policy.
/// A failed poll is logged and leaves the last good policy authoritative;
/// polling never stops because of one failure. Decisions read the active
/// policy with a single lock-free load and are never blocked by a poll in
/// progress.
#[derive(Clone)]
pub struct AdaptiveSampler {
    strategy: Arc<SamplingStrategy>,
    shutdown: Arc<ShutdownHandle>,
}

impl AdaptiveSampler {
    /// Start configuring an adaptive sampler for `service_name`.
    ///
    /// * `http_client` - transport used to poll the strategy endpoint.
    /// * `fallback_sampler` - decides until the first successful poll.
    /// * `service_name` - required by the strategy endpoint; must be
    ///   non-empty.
    pub fn builder<C, S, Svc>(
        http_client: C,
        fallback_sampler: S,
        service_name: Svc,
    ) -> AdaptiveSamplerBuilder<C, S>
    where
        C: HttpClient + 'static,
        S: ShouldSample + 'static,
        Svc: Into<String>,
    {
        AdaptiveSamplerBuilder {
            client: http_client,
            fallback: fallback_sampler,
            service_name: service_name.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fetcher: None,
        }
    }

    fn new(
        fetcher: Box<dyn StrategyFetcher>,
        fallback: Box<dyn ShouldSample>,
        service_name: String,
        poll_interval: Duration,
    ) -> Self {
        let strategy = Arc::new(SamplingStrategy::new(fallback));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self::run_poll_task(
            strategy.clone(),
            fetcher,
            service_name,
            poll_interval,
            shutdown_rx,
        );
        AdaptiveSampler {
            strategy,
            shutdown: Arc::new(ShutdownHandle { sender: shutdown_tx }),
        }
    }

    /// A description of the active policy, e.g. `RateLimiting(150.00)` after
    /// a rate-limiting strategy has been installed.
    pub fn description(&self) -> String {
        self.strategy.description()
    }

    /// Stop background polling. Idempotent; also happens automatically when
    /// the last clone of this sampler is dropped. The most recently
    /// installed policy keeps deciding.
    pub fn shutdown(&self) {
        self.shutdown.signal();
    }

    fn run_poll_task(
        strategy: Arc<SamplingStrategy>,
        fetcher: Box<dyn StrategyFetcher>,
        service_name: String,
        poll_interval: Duration,
        shutdown: mpsc::Receiver<()>,
    ) {
        #[allow(clippy::let_underscore_future)]
        // we don't have to await on the returned handle to execute
        let _ = tokio::spawn(async move {
            let interval = IntervalStream::new(tokio::time::interval(poll_interval));
            let mut ticks = stream::select(shutdown.map(|_| false), interval.map(|_| true));
            while let Some(poll) = ticks.next().await {
                if !poll {
                    break;
                }
                match fetcher.fetch(&service_name).await {
                    Ok(response) => strategy.update(response),
                    Err(err) => {
                        otel_warn!(
                            name: "AdaptiveSampler.FetchFailed",
                            service = service_name.as_str(),
                            reason = err.to_string()
                        );
                    }
                }
            }
            otel_debug!(name: "AdaptiveSampler.ShutDown");
        });
    }
}

impl fmt::Debug for AdaptiveSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveSampler")
            .field("active", &self.description())
            .finish()
    }
}

impl ShouldSample for AdaptiveSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        self.strategy
            .should_sample(parent_context, trace_id, name, span_kind, attributes, links)
    }
}

#[derive(Debug)]
struct ShutdownHandle {
    sender: mpsc::Sender<()>,
}

impl ShutdownHandle {
    fn signal(&self) {
        // Best effort: the loop exits on the first message, repeated signals
        // find the buffer full or the channel closed.
        let _ = self.sender.clone().try_send(());
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        let _ = self.sender.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::super::strategy::{RateLimitingSamplingStrategy, SamplingStrategyResponse};
    use super::super::FetchError;
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{Request, Response, StatusCode};
    use opentelemetry::trace::SamplingDecision;
    use opentelemetry_http::HttpError;
    use opentelemetry_sdk::trace::Sampler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct NoopClient;

    #[async_trait]
    impl HttpClient for NoopClient {
        async fn send_bytes(&self, _: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            Err("unreachable endpoint".into())
        }
    }

    #[derive(Debug)]
    struct StaticFetcher {
        response: SamplingStrategyResponse,
        hits: Arc<AtomicUsize>,
    }

    impl StaticFetcher {
        fn rate_limiting(max_traces_per_second: f64) -> Self {
            StaticFetcher {
                response: SamplingStrategyResponse {
                    rate_limiting_sampling: Some(RateLimitingSamplingStrategy {
                        max_traces_per_second,
                    }),
                    ..Default::default()
                },
                hits: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl StrategyFetcher for StaticFetcher {
        async fn fetch(&self, service_name: &str) -> Result<SamplingStrategyResponse, FetchError> {
            assert_eq!(service_name, "bar");
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    #[derive(Debug)]
    struct FlakyFetcher {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StrategyFetcher for FlakyFetcher {
        async fn fetch(&self, _: &str) -> Result<SamplingStrategyResponse, FetchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(SamplingStrategyResponse {
                rate_limiting_sampling: Some(RateLimitingSamplingStrategy {
                    max_traces_per_second: 150.0,
                }),
                ..Default::default()
            })
        }
    }

    fn builder() -> AdaptiveSamplerBuilder<NoopClient, Sampler> {
        AdaptiveSampler::builder(NoopClient, Sampler::AlwaysOff, "bar")
    }

    async fn wait_for_description(sampler: &AdaptiveSampler, expected: &str) {
        for _ in 0..100 {
            if sampler.description() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "policy never became {expected:?}, still {:?}",
            sampler.description()
        );
    }

    #[test]
    fn configuration_is_validated_eagerly() {
        assert!(matches!(
            AdaptiveSampler::builder(NoopClient, Sampler::AlwaysOff, "").build(),
            Err(ConfigError::EmptyServiceName)
        ));
        assert!(matches!(
            builder().with_poll_interval(Duration::ZERO).build(),
            Err(ConfigError::InvalidInterval)
        ));
        assert!(matches!(
            builder().with_request_timeout(Duration::ZERO).build(),
            Err(ConfigError::InvalidTimeout)
        ));
        assert!(matches!(
            builder().with_endpoint("not a url").build(),
            Err(ConfigError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn installs_the_fetched_strategy() {
        let sampler = builder()
            .with_poll_interval(Duration::from_millis(100))
            .with_strategy_fetcher(Box::new(StaticFetcher::rate_limiting(150.0)))
            .build()
            .unwrap();
        wait_for_description(&sampler, "RateLimiting(150.00)").await;

        let result = sampler.should_sample(
            None,
            TraceId::from(1),
            "a",
            &SpanKind::Internal,
            &[],
            &[],
        );
        assert_eq!(result.decision, SamplingDecision::RecordAndSample);
        sampler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failures_keep_the_previous_policy_and_polling_continues() {
        let sampler = builder()
            .with_poll_interval(Duration::from_millis(100))
            .with_strategy_fetcher(Box::new(FlakyFetcher {
                failures: 3,
                calls: AtomicUsize::new(0),
            }))
            .build()
            .unwrap();

        // While every fetch fails, the fallback stays authoritative.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(sampler.description().starts_with("Fallback{"));

        // The poller retries past the failures and installs the strategy.
        wait_for_description(&sampler, "RateLimiting(150.00)").await;
        sampler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn decisions_never_observe_a_missing_policy_during_swaps() {
        let sampler = builder()
            .with_poll_interval(Duration::from_millis(10))
            .with_strategy_fetcher(Box::new(StaticFetcher::rate_limiting(1000.0)))
            .build()
            .unwrap();

        for i in 0..200u128 {
            let result = sampler.should_sample(
                None,
                TraceId::from(i),
                "a",
                &SpanKind::Internal,
                &[],
                &[],
            );
            assert!(matches!(
                result.decision,
                SamplingDecision::RecordAndSample | SamplingDecision::Drop
            ));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        sampler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_idempotent_and_stops_polling() {
        let fetcher = StaticFetcher::rate_limiting(150.0);
        let hits = fetcher.hits.clone();
        let sampler = builder()
            .with_poll_interval(Duration::from_millis(100))
            .with_strategy_fetcher(Box::new(fetcher))
            .build()
            .unwrap();
        wait_for_description(&sampler, "RateLimiting(150.00)").await;

        sampler.shutdown();
        sampler.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_shutdown = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        // At most one tick could have been in flight when the signal landed.
        assert!(hits.load(Ordering::SeqCst) <= after_shutdown + 1);

        // The last installed policy keeps deciding after shutdown.
        assert_eq!(sampler.description(), "RateLimiting(150.00)");
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_one_active_policy() {
        let sampler = builder()
            .with_poll_interval(Duration::from_millis(100))
            .with_strategy_fetcher(Box::new(StaticFetcher::rate_limiting(150.0)))
            .build()
            .unwrap();
        let clone = sampler.clone();
        wait_for_description(&sampler, "RateLimiting(150.00)").await;
        assert_eq!(clone.description(), "RateLimiting(150.00)");
        drop(clone);
        // Dropping one clone must not stop polling for the survivor.
        assert_eq!(sampler.description(), "RateLimiting(150.00)");
        sampler.shutdown();
    }
}
