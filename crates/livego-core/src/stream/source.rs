//! Push connection sources

use std::fmt;
use std::future::Future;
use std::io;

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::sse::{RawFrame, SseDecoder};
use crate::config::ClientConfig;
use crate::error::{LiveError, LiveResult};
use crate::transport::HttpTransport;

/// Frames from one open connection; an `Err` item or the end of the
/// stream both mean the connection is gone.
pub type FrameStream = BoxStream<'static, LiveResult<RawFrame>>;

/// Address of a component's push channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub component_id: String,
    pub signature: String,
}

impl StreamTarget {
    pub fn new(component_id: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            signature: signature.into(),
        }
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream_{}", self.component_id)
    }
}

/// Opens long-lived push connections.
pub trait PushSource: Send + Sync + 'static {
    /// Perform the handshake and return the frame stream.
    fn open(&self, target: &StreamTarget) -> impl Future<Output = LiveResult<FrameStream>> + Send;
}

/// Push source reading `text/event-stream` over HTTP.
///
/// Shares the client and cookie jar of the [`HttpTransport`] it is built from.
#[derive(Clone)]
pub struct HttpPushSource {
    transport: HttpTransport,
    config: ClientConfig,
}

impl HttpPushSource {
    pub fn new(transport: &HttpTransport, config: ClientConfig) -> Self {
        Self {
            transport: transport.clone(),
            config,
        }
    }
}

impl PushSource for HttpPushSource {
    async fn open(&self, target: &StreamTarget) -> LiveResult<FrameStream> {
        let path = self
            .config
            .stream
            .stream_path(&target.component_id, &target.signature);
        let url = self
            .transport
            .resolve(&path)
            .map_err(|e| LiveError::Connection(e.to_string()))?;

        let mut headers = self
            .transport
            .headers(&self.config, &url)
            .map_err(|e| LiveError::Connection(e.to_string()))?;
        headers.remove(CONTENT_TYPE);
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let response = self
            .transport
            .client()
            .get(url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| LiveError::Connection(e.to_string()))?;
        self.transport.store_cookies(&self.config, &url, &response);

        let status = response.status();
        if !status.is_success() {
            return Err(LiveError::Connection(format!(
                "push channel handshake failed with status {status}"
            )));
        }
        debug!(stream = %target, %url, "Push channel handshake complete");

        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let frames = FramedRead::new(StreamReader::new(body), SseDecoder::new())
            .map_err(|e| LiveError::Connection(e.to_string()));
        Ok(frames.boxed())
    }
}
