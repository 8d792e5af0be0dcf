//! HTTP transport built on reqwest

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, SET_COOKIE};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::Transport;
use crate::config::ClientConfig;
use crate::error::{ErrorPayload, LiveError, LiveResult};
use crate::types::{
    Delta, MountRequest, MountResponse, Props, Snapshot, UpdateRequest, UpdateResponse,
};

/// Transport that talks JSON over HTTP to a LiveGo server.
///
/// Cookies are kept in a jar shared with any
/// [`HttpPushSource`](crate::stream::HttpPushSource) built from this
/// transport, and are only sent/stored when the request's credential
/// policy allows it.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    origin: Url,
    cookies: Arc<Jar>,
}

impl HttpTransport {
    /// Create a transport for the server at `origin` (e.g. `http://localhost:8080`).
    pub fn new(origin: &str) -> LiveResult<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| LiveError::InvalidConfig(format!("invalid origin {origin:?}: {e}")))?;
        let client = Client::builder()
            .build()
            .map_err(|e| LiveError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self::with_client(client, origin))
    }

    /// Create a transport around an existing client.
    pub fn with_client(client: Client, origin: Url) -> Self {
        Self {
            client,
            origin,
            cookies: Arc::new(Jar::default()),
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Resolve a configured path against the origin.
    pub(crate) fn resolve(&self, path: &str) -> LiveResult<Url> {
        self.origin
            .join(path)
            .map_err(|e| LiveError::InvalidConfig(format!("invalid path {path:?}: {e}")))
    }

    /// Merged request headers plus the cookie header when credentials allow it.
    pub(crate) fn headers(&self, config: &ClientConfig, url: &Url) -> LiveResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in config.merged_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| LiveError::InvalidConfig(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| LiveError::InvalidConfig(format!("header value for {name}: {e}")))?;
            headers.insert(name, value);
        }
        if config.credentials.sends_cookies() {
            if let Some(cookie) = self.cookies.cookies(url) {
                headers.insert(COOKIE, cookie);
            }
        }
        Ok(headers)
    }

    pub(crate) fn store_cookies(&self, config: &ClientConfig, url: &Url, response: &Response) {
        if !config.credentials.sends_cookies() {
            return;
        }
        let mut set_cookies = response.headers().get_all(SET_COOKIE).iter();
        self.cookies.set_cookies(&mut set_cookies, url);
    }

    async fn post<B, R>(&self, config: &ClientConfig, path: &str, body: &B) -> LiveResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.resolve(path)?;
        let headers = self.headers(config, &url)?;

        let body = serde_json::to_vec(body).map_err(|e| LiveError::Protocol(e.to_string()))?;
        let response = self
            .client
            .post(url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| LiveError::Transport(ErrorPayload::network(e.to_string())))?;

        self.store_cookies(config, &url, &response);
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LiveError::Transport(ErrorPayload::network(e.to_string())))?;

        debug!(%url, status = status.as_u16(), bytes = bytes.len(), "Received response");

        if !status.is_success() {
            let payload = serde_json::from_slice::<ErrorPayload>(&bytes).unwrap_or_else(|_| {
                ErrorPayload::http_error(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status"),
                )
            });
            return Err(LiveError::Transport(payload));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| LiveError::Protocol(format!("unexpected response from {path}: {e}")))
    }
}

impl Transport for HttpTransport {
    async fn mount(
        &self,
        config: &ClientConfig,
        component: &str,
        props: &Props,
    ) -> LiveResult<MountResponse> {
        let request = MountRequest { component, props };
        self.post(config, &config.mount_path(), &request).await
    }

    async fn update(
        &self,
        config: &ClientConfig,
        snapshot: &Snapshot,
        deltas: &[Delta],
    ) -> LiveResult<UpdateResponse> {
        let request = UpdateRequest {
            snapshot,
            updates: deltas,
        };
        self.post(config, &config.update_path(), &request).await
    }
}
