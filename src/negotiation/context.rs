//! The narrow interface between the pipeline and the transport.
//!
//! # Responsibilities
//! - Expose the client's preference lists in arrival order
//! - Collect outgoing header assignments as explicit stage output
//! - Hand out a write-once response sink for direct streaming

use std::io::{self, Write};

use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING};

/// Client-supplied preference tokens for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    accept: Vec<String>,
    accept_encoding: Vec<String>,
}

impl Preferences {
    pub fn new<A, E>(accept: A, accept_encoding: E) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            accept: accept.into_iter().map(Into::into).collect(),
            accept_encoding: accept_encoding.into_iter().map(Into::into).collect(),
        }
    }

    /// Read every `Accept` and `Accept-Encoding` occurrence in order.
    /// Values that are not visible ASCII are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            accept: header_tokens(headers, &ACCEPT),
            accept_encoding: header_tokens(headers, &ACCEPT_ENCODING),
        }
    }

    pub fn accept(&self) -> &[String] {
        &self.accept
    }

    pub fn accept_encoding(&self) -> &[String] {
        &self.accept_encoding
    }
}

fn header_tokens(headers: &HeaderMap, name: &HeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_owned)
        .collect()
}

/// Outgoing header assignments produced by a stage.
///
/// Keys are unique; setting a key again replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderWrites {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compose a later stage's writes on top of this one.
    pub fn extend(&mut self, other: HeaderWrites) {
        for (name, value) in other.entries {
            self.set(name, value);
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.entries {
            headers.insert(name.clone(), value.clone());
        }
    }
}

/// Destination for a directly streamed body.
pub trait ResponseSink {
    /// Commit the response head and return the body writer.
    ///
    /// A sink accepts one head per response; later calls fail.
    fn open(&mut self, headers: &HeaderWrites) -> io::Result<&mut dyn Write>;
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct BufferSink {
    head: Option<HeaderWrites>,
    body: Vec<u8>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers committed by `open`, if any.
    pub fn head(&self) -> Option<&HeaderWrites> {
        self.head.as_ref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl ResponseSink for BufferSink {
    fn open(&mut self, headers: &HeaderWrites) -> io::Result<&mut dyn Write> {
        if self.head.is_some() {
            return Err(already_committed());
        }
        self.head = Some(headers.clone());
        Ok(&mut self.body)
    }
}

pub(crate) fn already_committed() -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, "response head already committed")
}
