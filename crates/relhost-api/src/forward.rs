//! HTTP/1.1 over a worker's Unix socket.
use std::path::Path;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Uri, header},
    response::Response,
};
use futures_util::StreamExt;
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::{net::UnixStream, task::AbortHandle};
use tracing::{debug, trace};

use crate::headers::strip_hop_by_hop;

#[derive(Debug, Error)]
pub(crate) enum ForwardError {
    #[error("connect to {socket} failed: {reason}")]
    Connect { socket: String, reason: String },

    #[error("http handshake failed: {0}")]
    Handshake(String),

    #[error("request to worker failed: {0}")]
    Send(String),

    #[error("invalid forwarded uri {0:?}")]
    InvalidUri(String),
}

impl ForwardError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            ForwardError::Connect { .. } => "connect",
            ForwardError::Handshake(_) => "handshake",
            ForwardError::Send(_) => "send",
            ForwardError::InvalidUri(_) => "invalid_uri",
        }
    }
}

/// Aborts the connection task once the response body is gone.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Send `req` to the worker listening on `socket` with its URI replaced by `path_and_query`.
///
/// The response is streamed back as-is apart from hop-by-hop headers. Dropping the returned
/// response, or the future, tears down the connection.
pub(crate) async fn send(
    socket: &Path,
    req: Request,
    path_and_query: &str,
) -> Result<Response, ForwardError> {
    let uri: Uri = path_and_query
        .parse()
        .map_err(|_| ForwardError::InvalidUri(path_and_query.to_string()))?;

    let stream = UnixStream::connect(socket)
        .await
        .map_err(|e| ForwardError::Connect {
            socket: socket.display().to_string(),
            reason: e.to_string(),
        })?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ForwardError::Handshake(e.to_string()))?;
    let conn = tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "worker connection closed with error");
        }
    });
    let guard = AbortOnDrop(conn.abort_handle());

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    strip_hop_by_hop(&mut parts.headers);
    if !parts.headers.contains_key(header::HOST) {
        parts
            .headers
            .insert(header::HOST, HeaderValue::from_static("localhost"));
    }
    trace!(method = %parts.method, uri = %parts.uri, "forwarding to worker");

    let resp = sender
        .send_request(Request::from_parts(parts, body))
        .await
        .map_err(|e| ForwardError::Send(e.to_string()))?;

    let (mut parts, body) = resp.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    let stream = body.into_data_stream().map(move |chunk| {
        let _conn = &guard;
        chunk
    });
    Ok(Response::from_parts(parts, Body::from_stream(stream)))
}
