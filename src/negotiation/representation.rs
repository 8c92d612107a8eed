//! Accept driven choice of wire representation.
//!
//! # Responsibilities
//! - Match preference tokens against the fixed representation table
//! - Serialize structured content as JSON or XML
//! - Stream a file source straight to the sink, bypassing later stages
//!
//! # Design Decisions
//! - Tokens are matched by substring containment; quality values are not parsed
//! - Mappings are rejected for XML before any bytes are produced
//! - Shapes XML cannot carry without loss fail before encoding
//! - The stream path writes exactly the declared length, starting at offset 0

use std::io::{self, Read, Write};

use bytes::Bytes;
use http::header::{
    HeaderValue, InvalidHeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE,
};
use serde_json::Value;

use crate::config::validation::is_xml_name;
use crate::config::{RepresentationConfig, SelectionPolicy};
use crate::negotiation::content::{shape_of, Content, StreamSource};
use crate::negotiation::context::{HeaderWrites, ResponseSink};
use crate::negotiation::error::{NegotiationError, NegotiationResult};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Known representations, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Xml,
    Mp4,
}

impl Format {
    pub const TABLE: [Format; 3] = [Format::Json, Format::Xml, Format::Mp4];

    pub fn matches(self, token: &str) -> bool {
        match self {
            Format::Json => token.contains("application/json"),
            Format::Xml => token.contains("text/xml") || token.contains("application/xml"),
            Format::Mp4 => token.contains("video/mp4"),
        }
    }

    /// Content-Type written for this representation.
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "text/xml",
            Format::Mp4 => "video/mp4",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Mp4 => "mp4",
        }
    }
}

/// Outcome of the representation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// Encoded body for the compression stage.
    Body { body: Bytes, headers: HeaderWrites },
    /// Body already written to the sink. Terminal.
    Streamed { bytes_written: u64 },
}

/// Chooses how a handler's content goes on the wire.
#[derive(Debug, Clone)]
pub struct RepresentationSelector {
    policy: SelectionPolicy,
    xml_root: String,
    disposition: HeaderValue,
}

impl RepresentationSelector {
    pub fn new(config: &RepresentationConfig) -> Result<Self, InvalidHeaderValue> {
        let disposition =
            HeaderValue::from_str(&format!("inline; filename={}", config.disposition_filename))?;
        Ok(Self {
            policy: config.policy,
            xml_root: config.xml_root.clone(),
            disposition,
        })
    }

    /// Pick at most one representation for the given tokens.
    pub fn resolve<S: AsRef<str>>(&self, tokens: &[S]) -> Option<Format> {
        match self.policy {
            SelectionPolicy::Priority => Format::TABLE
                .into_iter()
                .find(|format| tokens.iter().any(|t| format.matches(t.as_ref()))),
            SelectionPolicy::LastMatch => {
                let mut chosen = None;
                for token in tokens {
                    for format in Format::TABLE {
                        if format.matches(token.as_ref()) {
                            // Streaming ends the scan.
                            if format == Format::Mp4 {
                                return Some(format);
                            }
                            chosen = Some(format);
                        }
                    }
                }
                chosen
            }
        }
    }

    /// Produce the response body for `content`, or stream it to `sink`.
    pub fn select<S: AsRef<str>>(
        &self,
        tokens: &[S],
        content: Content,
        sink: &mut dyn ResponseSink,
    ) -> NegotiationResult<Representation> {
        match self.resolve(tokens) {
            Some(Format::Json) => {
                let value = structured(content, Format::Json)?;
                let body =
                    serde_json::to_vec(&value).map_err(|e| NegotiationError::Serialization {
                        representation: Format::Json.name(),
                        message: e.to_string(),
                    })?;
                Ok(body_of(Format::Json, body))
            }
            Some(Format::Xml) => {
                let value = structured(content, Format::Xml)?;
                if value.is_object() {
                    return Err(NegotiationError::UnsupportedType {
                        representation: Format::Xml.name(),
                        shape: shape_of(&value),
                    });
                }
                let xml_error = |message: String| NegotiationError::Serialization {
                    representation: Format::Xml.name(),
                    message,
                };
                check_xml_shape(&value, false).map_err(xml_error)?;
                let body = quick_xml::se::to_string_with_root(&self.xml_root, &value)
                    .map_err(|e| xml_error(e.to_string()))?;
                Ok(body_of(Format::Xml, body.into_bytes()))
            }
            Some(Format::Mp4) => match content {
                Content::FileStream(source) => self.stream(source, sink),
                other => Err(NegotiationError::StreamSource(other.shape())),
            },
            None => passthrough(content),
        }
    }

    fn stream(
        &self,
        mut source: StreamSource,
        sink: &mut dyn ResponseSink,
    ) -> NegotiationResult<Representation> {
        let len = source.len();
        let mut headers = HeaderWrites::new();
        headers.set(CONTENT_TYPE, HeaderValue::from_static(Format::Mp4.content_type()));
        headers.set(CONTENT_DISPOSITION, self.disposition.clone());
        headers.set(CONTENT_LENGTH, HeaderValue::from(len));

        let interrupted = |written, source| NegotiationError::StreamInterrupted { written, source };

        source.rewind().map_err(|e| interrupted(0, e))?;
        let writer = sink.open(&headers).map_err(|e| interrupted(0, e))?;
        let bytes_written = copy_exact(&mut source, writer, len)?;

        tracing::debug!(bytes_written, "Stream copy complete");
        Ok(Representation::Streamed { bytes_written })
    }
}

fn structured(content: Content, format: Format) -> NegotiationResult<Value> {
    match content {
        Content::Structured(value) => Ok(value),
        Content::FileStream(_) => Err(NegotiationError::UnsupportedType {
            representation: format.name(),
            shape: "stream",
        }),
    }
}

fn body_of(format: Format, body: Vec<u8>) -> Representation {
    let mut headers = HeaderWrites::new();
    headers.set(CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    Representation::Body {
        body: Bytes::from(body),
        headers,
    }
}

/// Reject values the XML encoder would reshape instead of encoding.
///
/// Sequences directly inside sequences are flattened, `@` keys become
/// attributes and `$` keys become text, so none of them round trip.
fn check_xml_shape(value: &Value, in_sequence: bool) -> Result<(), String> {
    match value {
        Value::Array(items) => {
            if in_sequence {
                return Err("nested sequence has no XML element form".to_string());
            }
            items.iter().try_for_each(|item| check_xml_shape(item, true))
        }
        Value::Object(map) => map.iter().try_for_each(|(key, item)| {
            if key.starts_with('@') || key.starts_with('$') {
                return Err(format!("key {key:?} would not encode as an element"));
            }
            if !is_xml_name(key) {
                return Err(format!("key {key:?} is not a valid XML name"));
            }
            check_xml_shape(item, false)
        }),
        _ => Ok(()),
    }
}

// Only a string is already byte-shaped; anything else would need an
// unchecked coercion.
fn passthrough(content: Content) -> NegotiationResult<Representation> {
    match content {
        Content::Structured(Value::String(text)) => {
            let mut headers = HeaderWrites::new();
            headers.set(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            Ok(Representation::Body {
                body: Bytes::from(text),
                headers,
            })
        }
        other => Err(NegotiationError::NoRepresentation(other.shape())),
    }
}

/// Copy exactly `len` bytes, reporting how far the copy got on failure.
fn copy_exact(
    source: &mut StreamSource,
    writer: &mut dyn Write,
    len: u64,
) -> NegotiationResult<u64> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut written = 0u64;

    while written < len {
        let want = (len - written).min(COPY_BUF_SIZE as u64) as usize;
        let n = match source.read(&mut buf[..want]) {
            Ok(0) => {
                return Err(NegotiationError::StreamInterrupted {
                    written,
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream source ended early",
                    ),
                })
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(NegotiationError::StreamInterrupted { written, source: e }),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| NegotiationError::StreamInterrupted { written, source: e })?;
        written += n as u64;
    }

    writer
        .flush()
        .map_err(|e| NegotiationError::StreamInterrupted { written, source: e })?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::context::BufferSink;
    use serde_json::json;
    use std::io::Cursor;

    fn selector(policy: SelectionPolicy) -> RepresentationSelector {
        RepresentationSelector::new(&RepresentationConfig {
            policy,
            ..RepresentationConfig::default()
        })
        .unwrap()
    }

    fn default_selector() -> RepresentationSelector {
        selector(SelectionPolicy::Priority)
    }

    fn video(len: usize) -> (Vec<u8>, Content) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let source = StreamSource::new(Cursor::new(data.clone())).unwrap();
        (data, Content::FileStream(source))
    }

    /// Sink whose connection is already gone.
    struct ClosedSink;

    impl ResponseSink for ClosedSink {
        fn open(&mut self, _: &HeaderWrites) -> io::Result<&mut dyn Write> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))
        }
    }

    #[test]
    fn test_json_round_trip() {
        let value = json!({"name": "clip", "tags": ["a", "b"], "size": 3});
        let mut sink = BufferSink::new();
        let result = default_selector()
            .select(&["application/json"], Content::from(value.clone()), &mut sink)
            .unwrap();

        let Representation::Body { body, headers } = result else {
            panic!("expected a body");
        };
        let decoded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(headers.get(&CONTENT_TYPE).unwrap(), "application/json");
        assert!(sink.head().is_none());
    }

    #[test]
    fn test_xml_rejects_mapping() {
        let mut sink = BufferSink::new();
        let err = default_selector()
            .select(&["text/xml"], Content::from(json!({"a": 1})), &mut sink)
            .unwrap_err();

        assert!(matches!(
            err,
            NegotiationError::UnsupportedType { representation: "xml", shape: "mapping" }
        ));
        assert_eq!(err.status(), http::StatusCode::NOT_ACCEPTABLE);
        assert!(sink.body().is_empty());
    }

    #[test]
    fn test_xml_encodes_scalar_under_root() {
        let mut sink = BufferSink::new();
        let result = default_selector()
            .select(&["application/xml"], Content::from(json!("hello")), &mut sink)
            .unwrap();

        let Representation::Body { body, headers } = result else {
            panic!("expected a body");
        };
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.starts_with("<response"));
        assert!(text.contains("hello"));
        assert_eq!(headers.get(&CONTENT_TYPE).unwrap(), "text/xml");
    }

    fn xml_error(value: Value) -> NegotiationError {
        let mut sink = BufferSink::new();
        default_selector()
            .select(&["text/xml"], Content::from(value), &mut sink)
            .unwrap_err()
    }

    #[test]
    fn test_xml_rejects_nested_sequences() {
        let err = xml_error(json!([[1, 2]]));
        assert!(matches!(err, NegotiationError::Serialization { representation: "xml", .. }));
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);

        let err = xml_error(json!([{"items": [[1], [2]]}]));
        assert!(matches!(err, NegotiationError::Serialization { .. }));
    }

    #[test]
    fn test_xml_rejects_attribute_and_text_keys() {
        for key in ["@id", "$text", "$value"] {
            let err = xml_error(json!([{ key: 1 }]));
            let NegotiationError::Serialization { message, .. } = err else {
                panic!("{key} should be rejected");
            };
            assert!(message.contains(key));
        }
    }

    #[test]
    fn test_xml_rejects_invalid_element_names() {
        for key in ["1bad", "has space", "", "xmlns"] {
            let err = xml_error(json!([{ key: "v" }]));
            assert!(matches!(err, NegotiationError::Serialization { .. }), "{key:?}");
        }
    }

    #[test]
    fn test_xml_encodes_sequence_of_records() {
        let mut sink = BufferSink::new();
        let result = default_selector()
            .select(&["text/xml"], Content::from(json!([{"id": 1, "tags": ["a"]}])), &mut sink)
            .unwrap();

        let Representation::Body { body, .. } = result else {
            panic!("expected a body");
        };
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("<id>1</id>"));
        assert!(text.contains("<tags>a</tags>"));
    }

    #[test]
    fn test_stream_requires_file_stream() {
        let mut sink = BufferSink::new();
        let err = default_selector()
            .select(&["video/mp4"], Content::from(json!([1, 2, 3])), &mut sink)
            .unwrap_err();

        assert!(matches!(err, NegotiationError::StreamSource("sequence")));
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(sink.head().is_none());
        assert!(sink.body().is_empty());
    }

    #[test]
    fn test_stream_writes_exact_length() {
        let (data, content) = video(200_000);
        let mut sink = BufferSink::new();
        let result = default_selector()
            .select(&["video/mp4"], content, &mut sink)
            .unwrap();

        assert_eq!(result, Representation::Streamed { bytes_written: 200_000 });
        assert_eq!(sink.body(), &data[..]);

        let head = sink.head().unwrap();
        assert_eq!(head.get(&CONTENT_TYPE).unwrap(), "video/mp4");
        assert_eq!(head.get(&CONTENT_LENGTH).unwrap(), "200000");
        assert_eq!(
            head.get(&CONTENT_DISPOSITION).unwrap(),
            "inline; filename=motion.mpeg4"
        );
    }

    #[test]
    fn test_stream_starts_from_offset_zero() {
        let mut cursor = Cursor::new(b"abcdef".to_vec());
        cursor.set_position(4);
        let source = StreamSource::with_len(cursor, 6);

        let mut sink = BufferSink::new();
        default_selector()
            .select(&["video/mp4"], Content::FileStream(source), &mut sink)
            .unwrap();
        assert_eq!(sink.body(), b"abcdef");
    }

    #[test]
    fn test_short_source_is_interrupted() {
        let source = StreamSource::with_len(Cursor::new(vec![1u8; 10]), 20);
        let mut sink = BufferSink::new();
        let err = default_selector()
            .select(&["video/mp4"], Content::FileStream(source), &mut sink)
            .unwrap_err();

        assert!(matches!(err, NegotiationError::StreamInterrupted { written: 10, .. }));
    }

    #[test]
    fn test_closed_sink_is_interrupted() {
        let (_, content) = video(16);
        let err = default_selector()
            .select(&["video/mp4"], content, &mut ClosedSink)
            .unwrap_err();
        assert!(matches!(err, NegotiationError::StreamInterrupted { written: 0, .. }));
    }

    #[test]
    fn test_no_match_passes_strings_through() {
        let mut sink = BufferSink::new();
        let result = default_selector()
            .select(&["text/html"], Content::from(json!("raw text")), &mut sink)
            .unwrap();
        let Representation::Body { body, headers } = result else {
            panic!("expected a body");
        };
        assert_eq!(body, Bytes::from_static(b"raw text"));
        assert_eq!(headers.get(&CONTENT_TYPE).unwrap(), "text/plain");

        let empty: [&str; 0] = [];
        let result = default_selector()
            .select(&empty, Content::from(json!("raw text")), &mut sink)
            .unwrap();
        assert!(matches!(result, Representation::Body { .. }));
    }

    #[test]
    fn test_no_match_rejects_non_bytes() {
        let mut sink = BufferSink::new();
        let err = default_selector()
            .select(&["text/html"], Content::from(json!(42)), &mut sink)
            .unwrap_err();
        assert!(matches!(err, NegotiationError::NoRepresentation("number")));
    }

    #[test]
    fn test_json_rejects_stream_content() {
        let (_, content) = video(4);
        let mut sink = BufferSink::new();
        let err = default_selector()
            .select(&["application/json"], content, &mut sink)
            .unwrap_err();
        assert!(matches!(err, NegotiationError::UnsupportedType { shape: "stream", .. }));
        assert!(sink.head().is_none());
    }

    #[test]
    fn test_priority_policy_ignores_token_order() {
        let s = selector(SelectionPolicy::Priority);
        assert_eq!(s.resolve(&["text/xml", "application/json"]), Some(Format::Json));
        assert_eq!(s.resolve(&["video/mp4", "text/xml"]), Some(Format::Xml));
        assert_eq!(s.resolve(&["text/html"]), None);
    }

    #[test]
    fn test_last_match_policy_overwrites() {
        let s = selector(SelectionPolicy::LastMatch);
        assert_eq!(s.resolve(&["application/json", "text/xml"]), Some(Format::Xml));
        assert_eq!(s.resolve(&["text/xml", "application/json"]), Some(Format::Json));
        // Within one token XML is checked after JSON.
        assert_eq!(s.resolve(&["application/json, application/xml"]), Some(Format::Xml));
        // Streaming stops the scan.
        assert_eq!(s.resolve(&["video/mp4", "application/json"]), Some(Format::Mp4));
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let s = default_selector();
        let value = json!({"k": [1, 2, 3]});
        let mut sink = BufferSink::new();
        let a = s.select(&["application/json"], Content::from(value.clone()), &mut sink).unwrap();
        let b = s.select(&["application/json"], Content::from(value), &mut sink).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_disposition_filename() {
        let config = RepresentationConfig {
            disposition_filename: "bad\nname".into(),
            ..RepresentationConfig::default()
        };
        assert!(RepresentationSelector::new(&config).is_err());
    }
}
