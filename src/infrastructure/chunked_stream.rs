// Chunked JSON streaming utilities
use crate::infrastructure::http_response::brotli_compress;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::Stream;
use serde::Serialize;

/// Create a chunked streaming response. Every item becomes one frame: a
/// 4-byte big-endian length followed by the (optionally Brotli-compressed)
/// JSON payload.
pub fn chunked_json_stream<S, T>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + Sync + 'static,
{
    let byte_stream = stream.then(move |item| async move { serialize_chunk(&item, compress).await });

    // No Content-Encoding header: frames are compressed individually, not
    // the HTTP body as a whole
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serialize a single item to a length-prefixed frame
pub async fn serialize_chunk<T: Serialize>(item: &T, compress: bool) -> Result<Bytes, std::io::Error> {
    let json_bytes = serde_json::to_vec(item).map_err(std::io::Error::other)?;

    let payload = if compress {
        brotli_compress(json_bytes).await?
    } else {
        json_bytes
    };

    let length = u32::try_from(payload.len()).map_err(std::io::Error::other)?;
    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(length);
    chunk.put_slice(&payload);

    Ok(chunk.freeze())
}

/// Helper to turn a stream into a response, mapping failures to a status
pub fn stream_response<S, T>(stream: S, compress: bool) -> axum::response::Response
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + Sync + 'static,
{
    match chunked_json_stream(stream, compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
