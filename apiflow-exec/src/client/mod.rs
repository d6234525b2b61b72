mod http;
mod streaming;

pub use http::{HttpClient, HttpError, ReqwestHttpClient, ResponseParts};
pub use streaming::{
    ChunkStream, ReqwestStreamingTransport, StreamWriter, StreamingClient, StreamingReply,
    StreamingTransport,
};
