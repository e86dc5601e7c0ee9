//! Concrete transport strategies.
//!
//! Two browser-impersonating adapters (Chrome and Firefox header/TLS
//! profiles, each with its own long-lived cookie jar) and a plain adapter
//! with no fingerprint at all. Clients are cached per proxy endpoint the way
//! a browser keeps one connection pool per network path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, header};
use reqwest::Client;
use reqwest::cookie::Jar;
use tokio::sync::Mutex;
use url::Url;

use super::{ProxyPair, TransportError, TransportRequest, TransportResult, TransportStrategy};

/// Header-level browser fingerprint applied by an impersonating adapter.
#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub accept_language: &'static str,
    pub sec_ch_ua: Option<&'static str>,
    pub sec_ch_ua_platform: Option<&'static str>,
}

/// Built-in fingerprint profiles.
pub mod browser_profiles {
    use super::BrowserProfile;

    pub fn chrome() -> BrowserProfile {
        BrowserProfile {
            name: "chrome",
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8",
            sec_ch_ua: Some(
                "\"Chromium\";v=\"136\", \"Not:A-Brand\";v=\"24\", \"Google Chrome\";v=\"136\"",
            ),
            sec_ch_ua_platform: Some("\"Windows\""),
        }
    }

    pub fn firefox() -> BrowserProfile {
        BrowserProfile {
            name: "firefox",
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) \
                         Gecko/20100101 Firefox/127.0",
            accept_language: "zh-CN,zh;q=0.8,zh-TW;q=0.7,zh-HK;q=0.5,en-US;q=0.3,en;q=0.2",
            sec_ch_ua: None,
            sec_ch_ua_platform: None,
        }
    }
}

/// Reqwest client pool keyed by proxy endpoint.
struct ClientPool {
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ClientPool {
    fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client<F>(
        &self,
        proxy: Option<&ProxyPair>,
        build: F,
    ) -> Result<Client, TransportError>
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        let key = proxy.map(|p| p.https.clone());
        let mut guard = self.clients.lock().await;
        if let Some(client) = guard.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = build(Client::builder());
        if let Some(pair) = proxy {
            builder = builder
                .proxy(reqwest::Proxy::http(&pair.http)?)
                .proxy(reqwest::Proxy::https(&pair.https)?);
        }
        let client = builder.build()?;
        guard.insert(key, client.clone());
        Ok(client)
    }
}

async fn send(
    client: &Client,
    request: &TransportRequest,
    extra_headers: Option<&http::HeaderMap>,
) -> Result<TransportResult, TransportError> {
    let mut headers = request.headers.clone();
    if let Some(extra) = extra_headers {
        for (name, value) in extra.iter() {
            headers.insert(name.clone(), value.clone());
        }
    }

    let mut builder = client
        .request(request.method.clone(), request.url.clone())
        .headers(headers)
        .timeout(request.timeout);
    if let Some(ref body) = request.body {
        builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let content_encoding = response
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.bytes().await?;

    Ok(TransportResult {
        status,
        content_type,
        content_encoding,
        body,
    })
}

/// Browser-impersonating strategy with a persistent cookie jar.
///
/// The jar outlives individual requests so that challenge-clearance cookies
/// earned during a warm-up stay attached to this fingerprint.
pub struct ImpersonateAdapter {
    profile: BrowserProfile,
    verify_tls: bool,
    jar: Arc<Jar>,
    pool: ClientPool,
}

impl ImpersonateAdapter {
    pub fn new(profile: BrowserProfile, verify_tls: bool) -> Self {
        Self {
            profile,
            verify_tls,
            jar: Arc::new(Jar::default()),
            pool: ClientPool::new(),
        }
    }

    fn fingerprint_headers(&self) -> Result<http::HeaderMap, TransportError> {
        let mut map = http::HeaderMap::new();
        let set = |map: &mut http::HeaderMap,
                   name: &'static str,
                   value: &str|
         -> Result<(), TransportError> {
            let value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
            map.insert(HeaderName::from_static(name), value);
            Ok(())
        };

        set(&mut map, "user-agent", self.profile.user_agent)?;
        set(&mut map, "accept-language", self.profile.accept_language)?;
        if let Some(ua) = self.profile.sec_ch_ua {
            set(&mut map, "sec-ch-ua", ua)?;
            set(&mut map, "sec-ch-ua-mobile", "?0")?;
        }
        if let Some(platform) = self.profile.sec_ch_ua_platform {
            set(&mut map, "sec-ch-ua-platform", platform)?;
        }
        Ok(map)
    }

    async fn client(&self, proxy: Option<&ProxyPair>) -> Result<Client, TransportError> {
        let jar = self.jar.clone();
        let verify = self.verify_tls;
        self.pool
            .client(proxy, move |builder| {
                builder
                    .cookie_provider(jar)
                    .danger_accept_invalid_certs(!verify)
            })
            .await
    }
}

#[async_trait]
impl TransportStrategy for ImpersonateAdapter {
    fn name(&self) -> &'static str {
        self.profile.name
    }

    async fn execute(
        &self,
        request: &TransportRequest,
        proxy: Option<&ProxyPair>,
    ) -> Result<TransportResult, TransportError> {
        let client = self.client(proxy).await?;
        let fingerprint = self.fingerprint_headers()?;
        send(&client, request, Some(&fingerprint)).await
    }

    fn supports_warmup(&self) -> bool {
        true
    }

    async fn warm_up(
        &self,
        origin: &Url,
        cookie: &str,
        proxy: Option<&ProxyPair>,
    ) -> Result<(), TransportError> {
        let client = self.client(proxy).await?;
        let warm = TransportRequest::new(http::Method::GET, origin.clone());
        let fingerprint = self.fingerprint_headers()?;
        let response = send(&client, &warm, Some(&fingerprint)).await?;
        log::info!(
            "transport: warm-up visit to {origin} returned status {}",
            response.status
        );

        let host = origin
            .host_str()
            .ok_or_else(|| TransportError::InvalidHeader("origin host".into()))?
            .to_string();
        for part in cookie.split(';') {
            if let Some((name, value)) = part.trim().split_once('=') {
                let (name, value) = (name.trim(), value.trim());
                if name.is_empty() || value.is_empty() {
                    continue;
                }
                self.jar.add_cookie_str(
                    &format!("{name}={value}; Domain={host}; Path=/"),
                    origin,
                );
            }
        }
        Ok(())
    }
}

/// Final-fallback strategy: no fingerprint, no session state.
pub struct PlainAdapter {
    verify_tls: bool,
    pool: ClientPool,
}

impl PlainAdapter {
    pub fn new(verify_tls: bool) -> Self {
        Self {
            verify_tls,
            pool: ClientPool::new(),
        }
    }
}

#[async_trait]
impl TransportStrategy for PlainAdapter {
    fn name(&self) -> &'static str {
        "plain"
    }

    async fn execute(
        &self,
        request: &TransportRequest,
        proxy: Option<&ProxyPair>,
    ) -> Result<TransportResult, TransportError> {
        let verify = self.verify_tls;
        let client = self
            .pool
            .client(proxy, move |builder| {
                builder.danger_accept_invalid_certs(!verify)
            })
            .await?;
        send(&client, request, None).await
    }
}
