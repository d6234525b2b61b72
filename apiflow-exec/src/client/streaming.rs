use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::client::http::{map_reqwest_error, HttpError};
use crate::service::RequestParts;

/// An in-flight streaming response body, consumed chunk by chunk.
#[async_trait]
pub trait ChunkStream: Send {
    /// `Ok(None)` signals end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, HttpError>;
}

pub struct StreamingReply {
    pub status: u16,
    pub stream: Box<dyn ChunkStream>,
}

/// Opens a streaming request without a deadline.
#[async_trait]
pub trait StreamingTransport: Send + Sync {
    async fn open(&self, req: RequestParts) -> Result<StreamingReply, HttpError>;
}

/// Caller-supplied sink the streamed bytes are forwarded to.
pub trait StreamWriter: Send {
    /// Writers that cannot flush are rejected before any byte is copied.
    fn supports_flush(&self) -> bool {
        true
    }

    fn set_header(&mut self, name: &str, value: &str);

    fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()>;

    fn flush(&mut self) -> std::io::Result<()>;
}

/// Forwards an upstream response body to a [`StreamWriter`], flushing after
/// every chunk, and returns the concatenated bytes as a string.
pub struct StreamingClient {
    transport: Arc<dyn StreamingTransport>,
}

impl Default for StreamingClient {
    fn default() -> Self {
        Self {
            transport: Arc::new(ReqwestStreamingTransport::default()),
        }
    }
}

impl StreamingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(transport: Arc<dyn StreamingTransport>) -> Self {
        Self { transport }
    }

    pub async fn make_streaming_request(
        &self,
        req: RequestParts,
        writer: &mut dyn StreamWriter,
    ) -> Result<String, HttpError> {
        debug!(method = %req.method, url = %req.url, "opening streaming request");
        let mut reply = self.transport.open(req).await?;

        if !(200..300).contains(&reply.status) {
            let body = drain(reply.stream.as_mut()).await;
            error!(status = reply.status, "streaming API call failed");
            return Err(HttpError::Status {
                status: reply.status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        writer.set_header("Content-Type", "text/event-stream");
        writer.set_header("Cache-Control", "no-cache");
        writer.set_header("Connection", "keep-alive");

        if !writer.supports_flush() {
            error!("response writer does not support flushing");
            return Err(HttpError::FlushUnsupported);
        }

        let mut buffer = Vec::new();
        while let Some(chunk) = reply.stream.next_chunk().await? {
            writer
                .write_chunk(&chunk)
                .map_err(|e| HttpError::Write(e.to_string()))?;
            writer
                .flush()
                .map_err(|e| HttpError::Write(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
        }

        debug!(bytes = buffer.len(), "streaming request completed");
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Reads whatever remains of a stream, swallowing read errors; used only to
/// capture error bodies.
async fn drain(stream: &mut dyn ChunkStream) -> Vec<u8> {
    let mut body = Vec::new();
    while let Ok(Some(chunk)) = stream.next_chunk().await {
        body.extend_from_slice(&chunk);
    }
    body
}

pub struct ReqwestStreamingTransport {
    client: reqwest::Client,
}

impl Default for ReqwestStreamingTransport {
    fn default() -> Self {
        // No timeout: streams stay open as long as the upstream keeps sending.
        let client = reqwest::Client::builder()
            .user_agent(concat!("apiflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                panic!("failed to create reqwest HTTP client: {e}. This is a bug - please report it.");
            });
        Self { client }
    }
}

#[async_trait]
impl StreamingTransport for ReqwestStreamingTransport {
    async fn open(&self, req: RequestParts) -> Result<StreamingReply, HttpError> {
        let method: reqwest::Method = req
            .method
            .parse()
            .map_err(|_| HttpError::Other(format!("invalid method: {}", req.method)))?;

        let mut rb = self.client.request(method, &req.url);
        for (name, value) in &req.headers {
            rb = rb.header(name, value);
        }
        if let Some(body) = req.body {
            rb = rb.body(body);
        }

        let resp = rb.send().await.map_err(map_reqwest_error)?;
        Ok(StreamingReply {
            status: resp.status().as_u16(),
            stream: Box::new(ReqwestChunkStream { inner: resp }),
        })
    }
}

struct ReqwestChunkStream {
    inner: reqwest::Response,
}

#[async_trait]
impl ChunkStream for ReqwestChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, HttpError> {
        match self.inner.chunk().await {
            Ok(Some(bytes)) => Ok(Some(bytes.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(map_reqwest_error(e)),
        }
    }
}
