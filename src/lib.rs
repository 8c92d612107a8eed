//! Response negotiation pipeline and the HTTP server around it.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod negotiation;
pub mod observability;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use negotiation::{Content, Negotiated, NegotiationError, Pipeline, Preferences};
