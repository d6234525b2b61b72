use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use apiflow_core::{ParamMap, RouteTemplate};
use apiflow_exec::client::{
    ChunkStream, HttpError, StreamWriter, StreamingReply, StreamingTransport,
};
use apiflow_exec::error::ServiceError;
use apiflow_exec::service::ApiService;
use apiflow_exec::ServiceBuilder;

struct MockTransport {
    status: u16,
    chunks: Vec<&'static str>,
}

#[async_trait]
impl StreamingTransport for MockTransport {
    async fn open(&self, _req: apiflow_exec::RequestParts) -> Result<StreamingReply, HttpError> {
        Ok(StreamingReply {
            status: self.status,
            stream: Box::new(CannedStream {
                chunks: self.chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            }),
        })
    }
}

struct CannedStream {
    chunks: VecDeque<Vec<u8>>,
}

#[async_trait]
impl ChunkStream for CannedStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, HttpError> {
        Ok(self.chunks.pop_front())
    }
}

#[derive(Default)]
struct RecordingWriter {
    flushable: bool,
    headers: Vec<(String, String)>,
    written: Vec<u8>,
    flushes: usize,
}

impl StreamWriter for RecordingWriter {
    fn supports_flush(&self) -> bool {
        self.flushable
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.written.extend_from_slice(chunk);
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

fn streaming_service(status: u16, chunks: Vec<&'static str>) -> ApiService {
    ServiceBuilder::new()
        .with_streaming_transport(Arc::new(MockTransport { status, chunks }))
        .with_service("llm", "http://llm.test")
        .with_template("llm", "generate", RouteTemplate::new("POST", "/generate"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn streams_chunks_to_writer_and_returns_concatenation() {
    let service = streaming_service(200, vec!["data: a\n\n", "data: b\n\n", "data: [DONE]\n\n"]);
    let mut writer = RecordingWriter {
        flushable: true,
        ..RecordingWriter::default()
    };

    let body = service
        .perform_streaming_request("llm", "generate", &ParamMap::new(), &mut writer)
        .await
        .unwrap();

    assert_eq!(body, "data: a\n\ndata: b\n\ndata: [DONE]\n\n");
    assert_eq!(writer.written, body.as_bytes());
    // Flushed once per chunk.
    assert_eq!(writer.flushes, 3);

    let header = |name: &str| {
        writer
            .headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    };
    assert_eq!(header("Content-Type"), Some("text/event-stream"));
    assert_eq!(header("Cache-Control"), Some("no-cache"));
    assert_eq!(header("Connection"), Some("keep-alive"));
}

#[tokio::test]
async fn non_2xx_fails_with_captured_body_before_writing() {
    let service = streaming_service(502, vec!["upstream", " died"]);
    let mut writer = RecordingWriter {
        flushable: true,
        ..RecordingWriter::default()
    };

    let err = service
        .perform_streaming_request("llm", "generate", &ParamMap::new(), &mut writer)
        .await
        .unwrap_err();

    match err {
        ServiceError::Http(HttpError::Status { status, body }) => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream died");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert!(writer.written.is_empty());
    assert!(writer.headers.is_empty());
}

#[tokio::test]
async fn unflushable_writer_is_rejected_before_streaming() {
    let service = streaming_service(200, vec!["data: a\n\n"]);
    let mut writer = RecordingWriter::default();

    let err = service
        .perform_streaming_request("llm", "generate", &ParamMap::new(), &mut writer)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Http(HttpError::FlushUnsupported)
    ));
    assert!(writer.written.is_empty());
    assert_eq!(writer.flushes, 0);
}
