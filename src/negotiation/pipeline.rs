//! Two-stage response pipeline: representation, then compression.

use std::io::Write;

use bytes::Bytes;

use crate::config::{ConfigError, ServerConfig, ValidationError};
use crate::negotiation::compression::CompressionSelector;
use crate::negotiation::content::Content;
use crate::negotiation::context::{HeaderWrites, Preferences, ResponseSink};
use crate::negotiation::error::NegotiationResult;
use crate::negotiation::representation::{Representation, RepresentationSelector};
use crate::observability::metrics;

/// Final outcome handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiated {
    /// Body and the headers both stages wrote.
    Body { body: Bytes, headers: HeaderWrites },
    /// Body was streamed to the sink; nothing left to send.
    Streamed { bytes_written: u64 },
}

/// Request-independent configuration of both selectors.
#[derive(Debug, Clone)]
pub struct Pipeline {
    representation: RepresentationSelector,
    compression: CompressionSelector,
    fail_open: bool,
}

impl Pipeline {
    pub fn new(
        representation: RepresentationSelector,
        compression: CompressionSelector,
        fail_open: bool,
    ) -> Self {
        Self {
            representation,
            compression,
            fail_open,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let representation = RepresentationSelector::new(&config.representation).map_err(|_| {
            ConfigError::Validation(vec![ValidationError::DispositionFilename(
                config.representation.disposition_filename.clone(),
            )])
        })?;
        Ok(Self::new(
            representation,
            CompressionSelector::new(&config.compression),
            config.compression.fail_open,
        ))
    }

    /// Run both stages for one request.
    pub fn run(
        &self,
        preferences: &Preferences,
        content: Content,
        sink: &mut dyn ResponseSink,
    ) -> NegotiationResult<Negotiated> {
        self.run_into(preferences, content, sink, Vec::new())
    }

    /// Like `run`, but the compression stage encodes into `out`.
    pub(crate) fn run_into<W>(
        &self,
        preferences: &Preferences,
        content: Content,
        sink: &mut dyn ResponseSink,
        out: W,
    ) -> NegotiationResult<Negotiated>
    where
        W: Write + Into<Vec<u8>>,
    {
        let representation = self
            .representation
            .select(preferences.accept(), content, sink)
            .inspect_err(|e| {
                tracing::warn!(error = %e, accept = ?preferences.accept(), "Representation failed");
                metrics::record_failure(e.kind());
            })?;

        let (body, mut headers) = match representation {
            Representation::Streamed { bytes_written } => {
                metrics::record_representation("mp4");
                metrics::record_stream(bytes_written);
                return Ok(Negotiated::Streamed { bytes_written });
            }
            Representation::Body { body, headers } => (body, headers),
        };
        if let Some(format) = self.representation.resolve(preferences.accept()) {
            metrics::record_representation(format.name());
        }

        let original_len = body.len();
        match self.compression.select_into(preferences.accept_encoding(), body, out) {
            Ok(encoded) => {
                if let Some(codec) = encoded.codec {
                    metrics::record_compression(codec.name(), original_len, encoded.body.len());
                }
                headers.extend(encoded.headers);
                Ok(Negotiated::Body {
                    body: encoded.body,
                    headers,
                })
            }
            Err(e) if self.fail_open => {
                tracing::warn!(error = %e, "Compression failed, serving uncompressed body");
                metrics::record_failure("compression");
                Ok(Negotiated::Body {
                    body: e.into_original(),
                    headers,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "Compression failed");
                metrics::record_failure("compression");
                Err(e.into())
            }
        }
    }
}
