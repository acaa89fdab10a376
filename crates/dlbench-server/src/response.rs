use std::io;

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tracing::{error, warn};

use dlbench_core::StoreError;

/// What a strategy hands to the response layer.
pub enum StrategyOutput {
    /// The whole file, already in one contiguous buffer.
    Buffer(Bytes),
    /// Bytes in file order, produced while the response is being written.
    /// An `Err` item aborts the response mid-body.
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

/// Build a 200 response for a strategy's output.
///
/// `declared_len` becomes `content-length` when present; without it the body
/// goes out with chunked transfer encoding.
pub fn assemble(output: StrategyOutput, declared_len: Option<u64>) -> Response {
    let body = match output {
        StrategyOutput::Buffer(bytes) => Body::from(bytes),
        StrategyOutput::Stream(stream) => Body::from_stream(stream),
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(len) = declared_len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    response
}

/// Request failures that happen before any body byte is sent.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("unknown download strategy: {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        let status = match &self {
            DownloadError::UnknownStrategy(endpoint) => {
                warn!("Unknown strategy endpoint {}", endpoint);
                StatusCode::NOT_FOUND
            }
            DownloadError::Store(StoreError::NotFound(name)) => {
                warn!("File not found: {}", name);
                StatusCode::NOT_FOUND
            }
            DownloadError::Store(e) => {
                error!("Download failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        status.into_response()
    }
}
