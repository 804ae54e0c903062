//! Shared utilities for end-to-end tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use expressway::config::ServerConfig;
use expressway::{App, HttpServer};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server running on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: HttpServer,
    task: JoinHandle<io::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the server and wait for it to finish.
    pub async fn stop(self) -> io::Result<()> {
        self.server.stop();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

/// Serve `app` with default configuration.
pub async fn spawn(app: App) -> TestServer {
    spawn_with(app, ServerConfig::default()).await
}

/// Serve `app` with `config` on 127.0.0.1 and an ephemeral port.
pub async fn spawn_with(app: App, config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(app, config);

    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.run(listener).await })
    };

    TestServer { addr, server, task }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
