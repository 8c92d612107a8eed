//! Handler output handed to the pipeline.
//!
//! The caller tags content explicitly; selectors branch on the variant and
//! never inspect the runtime type of a value.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::negotiation::error::NegotiationError;

/// Output of a handler.
#[derive(Debug)]
pub enum Content {
    /// Any serializable value. Mappings are `Value::Object`.
    Structured(Value),
    /// A seekable byte source with a known length.
    FileStream(StreamSource),
}

impl Content {
    /// Convert any serializable value into structured content.
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Result<Self, NegotiationError> {
        serde_json::to_value(value)
            .map(Content::Structured)
            .map_err(|e| NegotiationError::Serialization {
                representation: "json",
                message: e.to_string(),
            })
    }

    /// Short name of the content's shape, used in errors and logs.
    pub fn shape(&self) -> &'static str {
        match self {
            Content::Structured(value) => shape_of(value),
            Content::FileStream(_) => "stream",
        }
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Structured(value)
    }
}

impl From<StreamSource> for Content {
    fn from(source: StreamSource) -> Self {
        Content::FileStream(source)
    }
}

pub(crate) fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Object-safe bound for stream handles.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A readable, seekable handle with a known total length.
pub struct StreamSource {
    handle: Box<dyn ReadSeek>,
    len: u64,
}

impl StreamSource {
    /// Wrap a handle, discovering its length by seeking to the end.
    pub fn new<R: Read + Seek + Send + 'static>(mut handle: R) -> io::Result<Self> {
        let len = handle.seek(SeekFrom::End(0))?;
        handle.seek(SeekFrom::Start(0))?;
        Ok(Self::with_len(handle, len))
    }

    /// Wrap a handle whose length is already known.
    pub fn with_len<R: Read + Seek + Send + 'static>(handle: R, len: u64) -> Self {
        Self {
            handle: Box::new(handle),
            len,
        }
    }

    /// Open a file; the length comes from its metadata.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::with_len(file, len))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn rewind(&mut self) -> io::Result<()> {
        self.handle.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

impl Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle.read(buf)
    }
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSource").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Cursor, Write};

    #[test]
    fn test_stream_source_discovers_length() {
        let source = StreamSource::new(Cursor::new(vec![0u8; 42])).unwrap();
        assert_eq!(source.len(), 42);
        assert!(!source.is_empty());
    }

    #[test]
    fn test_stream_source_open_uses_metadata() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let source = StreamSource::open(file.path()).unwrap();
        assert_eq!(source.len(), 10);
    }

    #[test]
    fn test_structured_conversion() {
        #[derive(Serialize)]
        struct Status {
            healthy: bool,
        }

        let content = Content::structured(&Status { healthy: true }).unwrap();
        assert_eq!(content.shape(), "mapping");
        match content {
            Content::Structured(value) => assert_eq!(value, json!({"healthy": true})),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_shapes() {
        assert_eq!(Content::from(json!("text")).shape(), "string");
        assert_eq!(Content::from(json!([1, 2])).shape(), "sequence");
        let source = StreamSource::with_len(Cursor::new(Vec::new()), 0);
        assert_eq!(Content::from(source).shape(), "stream");
    }
}
