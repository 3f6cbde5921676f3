//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use geodata_gateway::config::parse_config;
use geodata_gateway::{HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A canned upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", content_type.to_string())],
            body: body.into(),
        }
    }

    #[allow(dead_code)]
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    fn to_wire(&self) -> Vec<u8> {
        let reason = reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        ));
        let mut wire = head.into_bytes();
        wire.extend_from_slice(&self.body);
        wire
    }
}

/// Start a programmable upstream. The responder sees the raw request head.
pub async fn start_upstream<F>(respond: F) -> SocketAddr
where
    F: Fn(&str) -> UpstreamResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let respond = respond.clone();
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 4096];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }
                        let head = String::from_utf8_lossy(&buf).into_owned();
                        let response = respond(&head);
                        let _ = socket.write_all(&response.to_wire()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start an upstream that always answers the same way.
#[allow(dead_code)]
pub async fn start_static_upstream(response: UpstreamResponse) -> SocketAddr {
    start_upstream(move |_| response.clone()).await
}

/// Start the gateway from TOML config text on an ephemeral port.
pub async fn start_gateway(config: &str) -> (SocketAddr, Shutdown) {
    let config = parse_config(config).unwrap();
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

/// One route named `geo` in front of `upstream` with the given filters.
pub fn single_route(upstream: SocketAddr, filters: &str) -> String {
    format!(
        r#"
        [[hosts]]
        from = "internal.example.com"
        to = "public.example.com"

        [[routes]]
        name = "geo"
        path_prefix = "/"
        upstream = "http://{upstream}"
        filters = [{filters}]
        "#
    )
}
