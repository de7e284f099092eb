//! Authguard - Brute-force Protection Service
//!
//! This crate implements a gRPC service that decides whether a login attempt
//! may proceed. Attempts are metered per login, per password and per client
//! IP with token buckets, and IP white/black lists take precedence over the
//! buckets. All state is kept in memory; a small HTTP listener answers
//! liveness checks.

pub mod app;
pub mod bucket;
pub mod config;
pub mod error;
pub mod grpc;
pub mod http;
pub mod limiter;
pub mod rule;
