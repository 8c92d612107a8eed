//! Response negotiation subsystem.
//!
//! # Data Flow
//! ```text
//! handler output (Content)
//!     → representation.rs (Accept → JSON / XML / pass-through body)
//!         └─ video/mp4 → copy StreamSource into the sink (terminal)
//!     → compression.rs (Accept-Encoding → gzip / deflate)
//!     → pipeline.rs (Negotiated body + composed header writes)
//!     → transport
//! ```
//!
//! # Design Decisions
//! - Everything here is synchronous and request-scoped
//! - Stages return header assignments instead of mutating shared state
//! - Representation failures abort; compression failures fall back to the
//!   uncompressed body

pub mod compression;
pub mod content;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod representation;

pub use compression::{Codec, CompressionSelector, Encoded};
pub use content::{Content, StreamSource};
pub use context::{BufferSink, HeaderWrites, Preferences, ResponseSink};
pub use error::{CompressionError, NegotiationError, NegotiationResult};
pub use pipeline::{Negotiated, Pipeline};
pub use representation::{Format, Representation, RepresentationSelector};
