//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::path::Path;

use response_pipeline::config::ServerConfig;
use response_pipeline::{HttpServer, Shutdown};
use tokio::net::TcpListener;

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server serving media from `media_root`.
pub async fn start_server(
    media_root: &Path,
    configure: impl FnOnce(&mut ServerConfig),
) -> TestServer {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.media.root = media_root.display().to_string();
    configure(&mut config);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let notified = shutdown.notified();
    tokio::spawn(async move {
        server.run(listener, notified).await.unwrap();
    });

    TestServer { addr, shutdown }
}

/// Client that does not decompress bodies on its own.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().build().unwrap()
}
