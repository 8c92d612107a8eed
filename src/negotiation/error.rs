//! Negotiation and compression error definitions.

use std::io;

use bytes::Bytes;
use http::StatusCode;
use thiserror::Error;

use crate::negotiation::compression::Codec;

/// Errors that abort a response during representation selection.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// The chosen representation cannot encode the content's shape.
    #[error("Can not encode {shape} content as {representation}")]
    UnsupportedType {
        representation: &'static str,
        shape: &'static str,
    },

    /// Streaming was requested but the content is not a stream source.
    #[error("Can not stream data source: content is {0}")]
    StreamSource(&'static str),

    /// No preference token matched and the content is not byte-shaped.
    #[error("No acceptable representation for {0} content")]
    NoRepresentation(&'static str),

    /// The underlying encoder failed.
    #[error("{representation} serialization failed: {message}")]
    Serialization {
        representation: &'static str,
        message: String,
    },

    /// The stream copy stopped before the declared length was written.
    #[error("Stream interrupted after {written} bytes: {source}")]
    StreamInterrupted {
        written: u64,
        #[source]
        source: io::Error,
    },

    /// Compression failed and the pipeline is configured to fail closed.
    #[error(transparent)]
    Compression(#[from] CompressionError),
}

impl NegotiationError {
    /// HTTP status the caller should abort the response with.
    pub fn status(&self) -> StatusCode {
        match self {
            NegotiationError::UnsupportedType { .. } | NegotiationError::NoRepresentation(_) => {
                StatusCode::NOT_ACCEPTABLE
            }
            NegotiationError::StreamSource(_)
            | NegotiationError::Serialization { .. }
            | NegotiationError::StreamInterrupted { .. }
            | NegotiationError::Compression(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            NegotiationError::UnsupportedType { .. } => "unsupported_type",
            NegotiationError::StreamSource(_) => "stream_source",
            NegotiationError::NoRepresentation(_) => "no_representation",
            NegotiationError::Serialization { .. } => "serialization",
            NegotiationError::StreamInterrupted { .. } => "stream_interrupted",
            NegotiationError::Compression(_) => "compression",
        }
    }
}

/// A codec failed to write or finalize its frame.
///
/// The uncompressed input travels with the error so the caller can still
/// serve it.
#[derive(Debug, Error)]
#[error("{codec} compression failed: {source}")]
pub struct CompressionError {
    codec: Codec,
    original: Bytes,
    #[source]
    source: io::Error,
}

impl CompressionError {
    pub(crate) fn new(codec: Codec, original: Bytes, source: io::Error) -> Self {
        Self {
            codec,
            original,
            source,
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The bytes as they were before compression was attempted.
    pub fn into_original(self) -> Bytes {
        self.original
    }
}

/// Result type for representation selection.
pub type NegotiationResult<T> = Result<T, NegotiationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = NegotiationError::UnsupportedType {
            representation: "xml",
            shape: "mapping",
        };
        assert_eq!(err.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(err.kind(), "unsupported_type");

        let err = NegotiationError::StreamSource("structured");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = NegotiationError::NoRepresentation("number");
        assert_eq!(err.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_compression_error_keeps_original() {
        let original = Bytes::from_static(b"payload");
        let err = CompressionError::new(
            Codec::Gzip,
            original.clone(),
            io::Error::new(io::ErrorKind::BrokenPipe, "closed"),
        );
        assert_eq!(err.codec(), Codec::Gzip);
        assert!(err.to_string().contains("gzip"));
        assert_eq!(err.into_original(), original);
    }
}
