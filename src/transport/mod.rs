//! Layered HTTP transport with block-page fallback.
//!
//! A single logical request is tried against an ordered list of transport
//! strategies: two browser-impersonating clients first, a plain client last.
//! A strategy's result is accepted only when it does not look like an
//! anti-bot block page; otherwise the chain logs the rejection and moves on.
//! The chain is the only place that decides whether a response came from the
//! forum API or from the defence layer in front of it.

pub mod adapters;
pub mod proxy;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

pub use adapters::{ImpersonateAdapter, PlainAdapter, browser_profiles};
pub use proxy::{ProxyPair, normalize as normalize_proxy};

/// Default per-request timeout, matching the forum client's historical value.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One logical HTTP request as seen by the strategies.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response produced by exactly one strategy; never merged across
/// strategies.
#[derive(Debug, Clone)]
pub struct TransportResult {
    pub status: u16,
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub body: Bytes,
}

impl TransportResult {
    /// Lossy UTF-8 view of the body.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn is_json_content_type(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .contains("application/json")
    }

    /// A response that looks like it came from the anti-bot layer rather
    /// than the API: 400/403 status, or an HTML page where JSON belongs.
    pub fn is_blocked(&self) -> bool {
        matches!(self.status, 400 | 403)
            || self.content_type.to_ascii_lowercase().contains("text/html")
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header {0}")]
    InvalidHeader(String),
    #[error("proxy endpoint rejected: {0}")]
    Proxy(String),
    #[error("warm-up not supported by this strategy")]
    WarmupUnsupported,
    #[error("all transport strategies rejected (last status {last_status})")]
    Exhausted { last_status: u16 },
}

/// One independently constructible transport strategy.
///
/// Each strategy owns its connection and cookie state; nothing is shared
/// between strategies, so a block against one fingerprint does not taint
/// the others.
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    /// Short name used in fallback logs.
    fn name(&self) -> &'static str;

    /// Execute the request, optionally through a proxy.
    async fn execute(
        &self,
        request: &TransportRequest,
        proxy: Option<&ProxyPair>,
    ) -> Result<TransportResult, TransportError>;

    /// Whether this strategy can run the warm-up flow (session cookie jar).
    fn supports_warmup(&self) -> bool {
        false
    }

    /// Visit a trusted origin page to collect challenge-clearance cookies,
    /// then inject the caller's session cookie into this strategy's jar.
    async fn warm_up(
        &self,
        _origin: &Url,
        _cookie: &str,
        _proxy: Option<&ProxyPair>,
    ) -> Result<(), TransportError> {
        Err(TransportError::WarmupUnsupported)
    }
}

/// Ordered fallback chain over the configured strategies.
pub struct AdapterChain {
    strategies: Vec<Box<dyn TransportStrategy>>,
    proxy: Option<ProxyPair>,
}

impl AdapterChain {
    /// Build a chain from explicit strategies, tried in the given order.
    /// The last strategy is the final attempt; its blocked result is the only
    /// error path out of the chain.
    pub fn new(strategies: Vec<Box<dyn TransportStrategy>>, proxy: Option<ProxyPair>) -> Self {
        Self { strategies, proxy }
    }

    /// Default chain: Chrome impersonation, Firefox impersonation, plain.
    pub fn standard(proxy: Option<ProxyPair>, verify_tls: bool) -> Self {
        let strategies: Vec<Box<dyn TransportStrategy>> = vec![
            Box::new(ImpersonateAdapter::new(
                browser_profiles::chrome(),
                verify_tls,
            )),
            Box::new(ImpersonateAdapter::new(
                browser_profiles::firefox(),
                verify_tls,
            )),
            Box::new(PlainAdapter::new(verify_tls)),
        ];
        Self::new(strategies, proxy)
    }

    /// Run the request through the chain, returning the first accepted
    /// result.
    pub async fn execute(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResult, TransportError> {
        let mut last_status = 0u16;
        let mut last_error: Option<TransportError> = None;
        let total = self.strategies.len();

        for (index, strategy) in self.strategies.iter().enumerate() {
            let is_final = index + 1 == total;
            log::info!("transport: trying {} adapter", strategy.name());

            match strategy.execute(request, self.proxy.as_ref()).await {
                Ok(result) if !result.is_blocked() => return Ok(result),
                Ok(result) => {
                    log::info!(
                        "transport: {} rejected (status {}, content-type {:?})",
                        strategy.name(),
                        result.status,
                        result.content_type
                    );
                    last_status = result.status;

                    // A configured proxy is itself a detection signal for
                    // some origins; give the same adapter one proxyless shot
                    // before moving down the chain.
                    if self.proxy.is_some() && !is_final {
                        match strategy.execute(request, None).await {
                            Ok(retry) if !retry.is_blocked() => {
                                log::info!(
                                    "transport: {} accepted without proxy",
                                    strategy.name()
                                );
                                return Ok(retry);
                            }
                            Ok(retry) => last_status = retry.status,
                            Err(err) => {
                                log::warn!(
                                    "transport: {} proxyless retry failed: {err}",
                                    strategy.name()
                                );
                            }
                        }
                    }

                    if is_final {
                        return Err(TransportError::Exhausted { last_status });
                    }
                }
                Err(err) => {
                    log::warn!("transport: {} failed: {err}", strategy.name());
                    if is_final {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }

        // Empty chain or every strategy errored before the final slot.
        Err(last_error.unwrap_or(TransportError::Exhausted { last_status }))
    }

    /// Warm-up fallback for the sign-in POST: clear any challenge on the
    /// origin page with the first warm-up-capable strategy, inject the
    /// session cookie into that strategy's jar, then replay the request on
    /// that strategy alone (the cookie header is dropped; the jar carries
    /// it).
    pub async fn warmup_execute(
        &self,
        request: &TransportRequest,
        origin: &Url,
        cookie: &str,
    ) -> Result<TransportResult, TransportError> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.supports_warmup())
            .ok_or(TransportError::WarmupUnsupported)?;

        strategy
            .warm_up(origin, cookie, self.proxy.as_ref())
            .await?;

        let mut replay = request.clone();
        replay.headers.remove(http::header::COOKIE);
        log::info!(
            "transport: replaying request on warmed-up {} adapter",
            strategy.name()
        );
        strategy.execute(&replay, self.proxy.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted {
        name: &'static str,
        responses: Mutex<Vec<Result<TransportResult, TransportError>>>,
        calls: Mutex<Vec<bool>>,
    }

    impl Scripted {
        fn new(
            name: &'static str,
            responses: Vec<Result<TransportResult, TransportError>>,
        ) -> Self {
            Self {
                name,
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TransportStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(
            &self,
            _request: &TransportRequest,
            proxy: Option<&ProxyPair>,
        ) -> Result<TransportResult, TransportError> {
            self.calls.lock().unwrap().push(proxy.is_some());
            let mut guard = self.responses.lock().unwrap();
            if guard.is_empty() {
                return Ok(blocked(403));
            }
            guard.remove(0)
        }
    }

    fn ok_json(body: &str) -> TransportResult {
        TransportResult {
            status: 200,
            content_type: "application/json".into(),
            content_encoding: None,
            body: Bytes::from(body.to_string()),
        }
    }

    fn blocked(status: u16) -> TransportResult {
        TransportResult {
            status,
            content_type: "text/html; charset=utf-8".into(),
            content_encoding: None,
            body: Bytes::from_static(b"<html>blocked</html>"),
        }
    }

    fn request() -> TransportRequest {
        TransportRequest::new(
            Method::POST,
            Url::parse("https://www.nodeseek.com/api/attendance").unwrap(),
        )
    }

    #[tokio::test]
    async fn first_accepted_strategy_wins() {
        let chain = AdapterChain::new(
            vec![
                Box::new(Scripted::new("a", vec![Ok(ok_json("{}"))])),
                Box::new(Scripted::new("b", vec![])),
            ],
            None,
        );
        let result = chain.execute(&request()).await.unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn blocked_result_falls_through_to_next() {
        let chain = AdapterChain::new(
            vec![
                Box::new(Scripted::new("a", vec![Ok(blocked(403))])),
                Box::new(Scripted::new("b", vec![Ok(ok_json("{\"ok\":1}"))])),
            ],
            None,
        );
        let result = chain.execute(&request()).await.unwrap();
        assert!(result.is_json_content_type());
    }

    #[tokio::test]
    async fn exhausted_chain_errors() {
        let chain = AdapterChain::new(
            vec![
                Box::new(Scripted::new("a", vec![Ok(blocked(403))])),
                Box::new(Scripted::new("b", vec![Ok(blocked(400))])),
            ],
            None,
        );
        match chain.execute(&request()).await {
            Err(TransportError::Exhausted { last_status }) => assert_eq!(last_status, 400),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blocked_with_proxy_retries_proxyless() {
        let pair = ProxyPair {
            http: "http://proxy:1".into(),
            https: "http://proxy:1".into(),
        };
        let first = Scripted::new("a", vec![Ok(blocked(403)), Ok(ok_json("{}"))]);
        let chain = AdapterChain::new(
            vec![Box::new(first), Box::new(Scripted::new("b", vec![]))],
            Some(pair),
        );
        let result = chain.execute(&request()).await.unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn transport_error_on_final_strategy_propagates() {
        let chain = AdapterChain::new(
            vec![Box::new(Scripted::new(
                "only",
                vec![Err(TransportError::InvalidHeader("x".into()))],
            ))],
            None,
        );
        assert!(chain.execute(&request()).await.is_err());
    }

    struct WarmCapable {
        warmed: std::sync::Arc<Mutex<u32>>,
        replay_had_cookie: std::sync::Arc<Mutex<Option<bool>>>,
        responses: Mutex<Vec<Result<TransportResult, TransportError>>>,
    }

    impl WarmCapable {
        fn new(responses: Vec<Result<TransportResult, TransportError>>) -> Self {
            Self {
                warmed: Default::default(),
                replay_had_cookie: Default::default(),
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl TransportStrategy for WarmCapable {
        fn name(&self) -> &'static str {
            "warm-capable"
        }

        async fn execute(
            &self,
            request: &TransportRequest,
            _proxy: Option<&ProxyPair>,
        ) -> Result<TransportResult, TransportError> {
            *self.replay_had_cookie.lock().unwrap() =
                Some(request.headers.contains_key(http::header::COOKIE));
            self.responses.lock().unwrap().remove(0)
        }

        fn supports_warmup(&self) -> bool {
            true
        }

        async fn warm_up(
            &self,
            _origin: &Url,
            _cookie: &str,
            _proxy: Option<&ProxyPair>,
        ) -> Result<(), TransportError> {
            *self.warmed.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn warmup_replays_on_the_capable_strategy_without_cookie_header() {
        let capable = WarmCapable::new(vec![Ok(ok_json("{\"success\":true}"))]);
        let warmed = capable.warmed.clone();
        let replay_had_cookie = capable.replay_had_cookie.clone();
        // The incapable first strategy must be skipped entirely.
        let chain = AdapterChain::new(
            vec![
                Box::new(Scripted::new("incapable", vec![])),
                Box::new(capable),
            ],
            None,
        );

        let mut req = request();
        req.headers.insert(
            http::header::COOKIE,
            http::HeaderValue::from_static("session=abc"),
        );

        let result = chain
            .warmup_execute(&req, &Url::parse("https://www.nodeseek.com/board").unwrap(), "session=abc")
            .await
            .unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(*warmed.lock().unwrap(), 1);
        assert_eq!(*replay_had_cookie.lock().unwrap(), Some(false));
    }

    #[tokio::test]
    async fn warmup_without_capable_strategy_errors() {
        let chain = AdapterChain::new(vec![Box::new(Scripted::new("plain", vec![]))], None);
        match chain
            .warmup_execute(&request(), &Url::parse("https://www.nodeseek.com/board").unwrap(), "c")
            .await
        {
            Err(TransportError::WarmupUnsupported) => {}
            other => panic!("expected warm-up to be unsupported, got {other:?}"),
        }
    }

    #[test]
    fn block_detection() {
        assert!(blocked(403).is_blocked());
        assert!(blocked(400).is_blocked());
        assert!(!ok_json("{}").is_blocked());
        let html_200 = TransportResult {
            status: 200,
            content_type: "TEXT/HTML".into(),
            content_encoding: None,
            body: Bytes::new(),
        };
        assert!(html_200.is_blocked());
    }
}
