//! Accept-Encoding driven body compression.
//!
//! # Design Decisions
//! - Tokens are matched by substring containment; quality values are not parsed
//! - A codec frame is only returned once it has been fully finalized
//! - On failure the original bytes are handed back with the error

use std::fmt;
use std::io::{self, Write};

use bytes::Bytes;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use http::header::{HeaderValue, CONTENT_ENCODING};

use crate::config::{CompressionConfig, SelectionPolicy};
use crate::negotiation::context::HeaderWrites;
use crate::negotiation::error::CompressionError;

/// Supported compression codecs, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Gzip,
    /// zlib-framed deflate.
    Deflate,
}

impl Codec {
    pub const TABLE: [Codec; 2] = [Codec::Gzip, Codec::Deflate];

    /// Content-Encoding token for this codec.
    pub fn name(self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
        }
    }

    pub fn matches(self, token: &str) -> bool {
        token.contains(self.name())
    }

    /// Compress `input` into `out`, returning `out` after the frame is finished.
    pub fn encode<W: Write>(self, level: Compression, input: &[u8], out: W) -> io::Result<W> {
        match self {
            Codec::Gzip => {
                let mut encoder = GzEncoder::new(out, level);
                encoder.write_all(input)?;
                encoder.finish()
            }
            Codec::Deflate => {
                let mut encoder = ZlibEncoder::new(out, level);
                encoder.write_all(input)?;
                encoder.finish()
            }
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Body after the compression stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub body: Bytes,
    pub headers: HeaderWrites,
    pub codec: Option<Codec>,
}

impl Encoded {
    fn identity(body: Bytes) -> Self {
        Self {
            body,
            headers: HeaderWrites::new(),
            codec: None,
        }
    }
}

/// Chooses a codec from the client's encoding preferences and applies it.
#[derive(Debug, Clone)]
pub struct CompressionSelector {
    policy: SelectionPolicy,
    level: Compression,
    min_size: usize,
}

impl CompressionSelector {
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            policy: config.policy,
            level: Compression::new(config.level),
            min_size: config.min_size,
        }
    }

    /// Pick at most one codec for the given tokens.
    pub fn resolve<S: AsRef<str>>(&self, tokens: &[S]) -> Option<Codec> {
        match self.policy {
            SelectionPolicy::Priority => Codec::TABLE
                .into_iter()
                .find(|codec| tokens.iter().any(|t| codec.matches(t.as_ref()))),
            SelectionPolicy::LastMatch => {
                let mut chosen = None;
                for token in tokens {
                    for codec in Codec::TABLE {
                        if codec.matches(token.as_ref()) {
                            chosen = Some(codec);
                        }
                    }
                }
                chosen
            }
        }
    }

    /// Compress `body` with the negotiated codec.
    ///
    /// Without a matching token, or below the size threshold, the body is
    /// returned unchanged and no Content-Encoding is written.
    pub fn select<S: AsRef<str>>(
        &self,
        tokens: &[S],
        body: Bytes,
    ) -> Result<Encoded, CompressionError> {
        self.select_into(tokens, body, Vec::new())
    }

    /// Like `select`, but compresses into a caller-supplied writer.
    pub(crate) fn select_into<S, W>(
        &self,
        tokens: &[S],
        body: Bytes,
        out: W,
    ) -> Result<Encoded, CompressionError>
    where
        S: AsRef<str>,
        W: Write + Into<Vec<u8>>,
    {
        let codec = match self.resolve(tokens) {
            Some(codec) if body.len() >= self.min_size => codec,
            _ => return Ok(Encoded::identity(body)),
        };
        self.compress_into(codec, body, out)
    }

    pub(crate) fn compress_into<W>(
        &self,
        codec: Codec,
        body: Bytes,
        out: W,
    ) -> Result<Encoded, CompressionError>
    where
        W: Write + Into<Vec<u8>>,
    {
        match codec.encode(self.level, &body, out) {
            Ok(out) => {
                let mut headers = HeaderWrites::new();
                headers.set(CONTENT_ENCODING, HeaderValue::from_static(codec.name()));
                Ok(Encoded {
                    body: Bytes::from(out.into()),
                    headers,
                    codec: Some(codec),
                })
            }
            Err(e) => Err(CompressionError::new(codec, body, e)),
        }
    }
}

impl Default for CompressionSelector {
    fn default() -> Self {
        Self::new(&CompressionConfig::default())
    }
}

/// Writer that accepts a few bytes and then fails.
#[cfg(test)]
pub(crate) struct FailingWriter {
    buf: Vec<u8>,
    budget: usize,
}

#[cfg(test)]
impl FailingWriter {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            buf: Vec::new(),
            budget,
        }
    }
}

#[cfg(test)]
impl Write for FailingWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        let n = data.len().min(self.budget);
        self.budget -= n;
        self.buf.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl From<FailingWriter> for Vec<u8> {
    fn from(w: FailingWriter) -> Self {
        w.buf
    }
}
