use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::service::RequestParts;

#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,

    #[error("connect/dns/tls error: {0}")]
    Network(String),

    #[error("API call error: {body}, status code: {status}")]
    Status { status: u16, body: String },

    #[error("response writer does not support flushing")]
    FlushUnsupported,

    #[error("error writing to response: {0}")]
    Write(String),

    #[error("http error: {0}")]
    Other(String),
}

/// A raw response as seen by the unary invoker; the 2xx check happens above
/// this layer.
#[derive(Debug, Clone, Default)]
pub struct ResponseParts {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Blocking-style request/response transport.
///
/// `timeout` is per-request; `None` means no deadline.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(
        &self,
        req: RequestParts,
        timeout: Option<Duration>,
    ) -> Result<ResponseParts, HttpError>;
}

pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        // Client creation should never fail in practice; surfacing a later,
        // clearer error beats panicking at startup.
        let client = reqwest::Client::builder()
            .user_agent(concat!("apiflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                panic!("failed to create reqwest HTTP client: {e}. This is a bug - please report it.");
            });
        Self { client }
    }
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(
        &self,
        req: RequestParts,
        timeout: Option<Duration>,
    ) -> Result<ResponseParts, HttpError> {
        let method: reqwest::Method = req
            .method
            .parse()
            .map_err(|_| HttpError::Other(format!("invalid method: {}", req.method)))?;

        debug!(method = %req.method, url = %req.url, "sending request");

        let mut rb = self.client.request(method, &req.url);
        if let Some(timeout) = timeout {
            rb = rb.timeout(timeout);
        }
        for (name, value) in &req.headers {
            rb = rb.header(name, value);
        }
        if let Some(body) = req.body {
            rb = rb.body(body);
        }

        let resp = rb.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();

        let mut headers = BTreeMap::new();
        for (name, value) in resp.headers() {
            if let Ok(s) = value.to_str() {
                headers.insert(name.to_string(), s.to_string());
            }
        }

        let body = resp.bytes().await.map_err(map_reqwest_error)?.to_vec();
        debug!(status, body_len = body.len(), "received response");

        Ok(ResponseParts {
            status,
            headers,
            body,
        })
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        return HttpError::Timeout;
    }
    if e.is_connect() || e.is_request() {
        return HttpError::Network(e.to_string());
    }
    HttpError::Other(e.to_string())
}
