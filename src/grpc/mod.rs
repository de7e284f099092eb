//! gRPC transport for the Authguard limiter service.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::{AuthLimiterService, REQUEST_ID_HEADER};

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("authguard.v1");
}

// Re-export commonly used types
pub use proto::auth_limiter_client::AuthLimiterClient;
pub use proto::auth_limiter_server::AuthLimiterServer;
