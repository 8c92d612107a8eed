//! Bridges the synchronous negotiation pipeline into axum responses.
//!
//! # Responsibilities
//! - Run the pipeline on the blocking pool
//! - Turn a committed stream head into a streaming response immediately
//! - Map negotiation failures to plain-text error responses
//!
//! # Design Decisions
//! - The sink is a bounded channel, so a slow client slows the copy down
//! - A dropped connection closes the channel and the copy sees a write error
//! - A stream that breaks after its head was sent ends the body with an error

use std::io::{self, Write};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use crate::http::request::request_id;
use crate::negotiation::context::already_committed;
use crate::negotiation::{
    Content, HeaderWrites, Negotiated, NegotiationError, Pipeline, Preferences, ResponseSink,
};
use crate::observability::metrics;

/// Chunks buffered between the copy and the connection.
const STREAM_CHANNEL_DEPTH: usize = 8;

type Chunk = io::Result<Bytes>;

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

struct ChannelWriter {
    tx: mpsc::Sender<Chunk>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| disconnected())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that hands the head to the async side and forwards body chunks.
/// Must only be used off the async runtime threads.
struct ChannelSink {
    head: Option<oneshot::Sender<HeaderWrites>>,
    writer: ChannelWriter,
    committed: bool,
}

impl ChannelSink {
    fn new(head: oneshot::Sender<HeaderWrites>, body: mpsc::Sender<Chunk>) -> Self {
        Self {
            head: Some(head),
            writer: ChannelWriter { tx: body },
            committed: false,
        }
    }

    /// End a committed body with an error so the transport aborts it.
    fn abort(&self, error: &NegotiationError) {
        if self.committed {
            let _ = self
                .writer
                .tx
                .blocking_send(Err(io::Error::other(error.to_string())));
        }
    }
}

impl ResponseSink for ChannelSink {
    fn open(&mut self, headers: &HeaderWrites) -> io::Result<&mut dyn Write> {
        let head = self.head.take().ok_or_else(already_committed)?;
        head.send(headers.clone()).map_err(|_| disconnected())?;
        self.committed = true;
        Ok(&mut self.writer)
    }
}

/// Negotiate `content` for a request and build the response.
pub async fn negotiate(
    pipeline: Arc<Pipeline>,
    route: &'static str,
    headers: &HeaderMap,
    content: Content,
) -> Response {
    let preferences = Preferences::from_headers(headers);
    let request_id = request_id(headers).to_owned();

    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);

    let task = tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink::new(head_tx, body_tx);
        let result = pipeline.run(&preferences, content, &mut sink);
        if let Err(e) = &result {
            sink.abort(e);
        }
        result
    });

    // The head only arrives when the stream stage commits it; otherwise the
    // sender is dropped when the pipeline returns.
    if let Ok(head) = head_rx.await {
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(request_id = %request_id, error = %e, "Stream ended early");
                }
                Err(e) => {
                    tracing::error!(request_id = %request_id, error = %e, "Stream task failed");
                }
            }
        });
        metrics::record_request(route, StatusCode::OK.as_u16());
        return streaming_response(head, body_rx);
    }

    let response = match task.await {
        Ok(Ok(negotiated)) => negotiated_response(negotiated),
        Ok(Err(e)) => {
            tracing::debug!(request_id = %request_id, error = %e, "Negotiation aborted");
            error_response(&e)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Negotiation task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };
    metrics::record_request(route, response.status().as_u16());
    response
}

fn streaming_response(head: HeaderWrites, body_rx: mpsc::Receiver<Chunk>) -> Response {
    let chunks = stream::unfold(body_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    let mut response = Response::new(Body::from_stream(chunks));
    head.apply(response.headers_mut());
    response
}

fn negotiated_response(negotiated: Negotiated) -> Response {
    match negotiated {
        Negotiated::Body { body, headers } => {
            let mut response = Response::new(Body::from(body));
            headers.apply(response.headers_mut());
            response
        }
        // Streamed bodies always commit a head first.
        Negotiated::Streamed { .. } => StatusCode::OK.into_response(),
    }
}

/// Plain-text response for an aborted negotiation.
pub fn error_response(error: &NegotiationError) -> Response {
    (
        error.status(),
        [(CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        error.to_string(),
    )
        .into_response()
}
