//! HTTP listener for liveness checks.

use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{AuthGuardError, Result};

/// Serves `GET /health` next to the gRPC server.
pub struct HealthServer {
    addr: SocketAddr,
}

impl HealthServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn router() -> Router {
        Router::new().route("/health", get(health))
    }

    /// Bind the configured address and serve until `shutdown` flips to `true`
    /// or its sender is dropped.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        Self::serve_with_listener(listener, shutdown).await
    }

    pub async fn serve_with_listener(
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(addr = %listener.local_addr()?, "Starting HTTP health server");

        axum::serve(listener, Self::router())
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP health server failed");
                AuthGuardError::Io(e)
            })
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get_path(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(HealthServer::serve_with_listener(listener, rx));

        let response = get_path(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");

        let response = get_path(addr, "/missing").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{response}");

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_sender_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(HealthServer::serve_with_listener(listener, rx));

        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("health server did not stop")
            .unwrap()
            .unwrap();
    }
}
