//! gRPC server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use super::AuthLimiterServer;
use super::service::AuthLimiterService;
use crate::app::App;
use crate::error::{AuthGuardError, Result};

/// gRPC server for the AuthLimiter service.
pub struct GrpcServer {
    /// Address to bind to
    addr: SocketAddr,
    app: Arc<App>,
    request_timeout: Duration,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, app: Arc<App>, request_timeout: Duration) -> Self {
        Self {
            addr,
            app,
            request_timeout,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(addr = %self.addr, "Starting gRPC server for AuthLimiter");

        Server::builder()
            .timeout(self.request_timeout)
            .add_service(AuthLimiterServer::new(AuthLimiterService::new(self.app)))
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                AuthGuardError::Grpc(e)
            })
    }

    /// Serve on an already bound listener, ignoring the configured address.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(addr = %listener.local_addr()?, "Starting gRPC server for AuthLimiter");

        Server::builder()
            .timeout(self.request_timeout)
            .add_service(AuthLimiterServer::new(AuthLimiterService::new(self.app)))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                AuthGuardError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthGuardConfig;
    use crate::grpc::proto::LimitCheckRequest;
    use crate::grpc::AuthLimiterClient;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let app = Arc::new(App::new(&AuthGuardConfig::default()).await.unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = GrpcServer::new(addr, app, Duration::from_secs(5));
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_listener(listener, async move {
            let _ = rx.await;
        }));

        let mut client = AuthLimiterClient::connect(format!("http://{addr}")).await.unwrap();
        let response = client
            .limit_check(LimitCheckRequest {
                ip: "10.0.0.1".to_string(),
                login: "root".to_string(),
                password: "pw".to_string(),
            })
            .await
            .unwrap();
        assert!(response.into_inner().allowed);

        drop(client);
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
