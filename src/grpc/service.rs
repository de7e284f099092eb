//! AuthLimiter service implementation.

use std::sync::Arc;
use std::time::Instant;

use tonic::metadata::{Ascii, MetadataMap, MetadataValue};
use tonic::{Code, Request, Response, Status};
use tracing::{debug, field, info, instrument, warn, Span};

use super::proto::{
    auth_limiter_server::AuthLimiter as AuthLimiterRpc, BlackListAddRequest, BlackListAddResponse,
    BlackListDeleteRequest, BlackListDeleteResponse, BucketResetRequest, BucketResetResponse,
    LimitCheckRequest, LimitCheckResponse, WhiteListAddRequest, WhiteListAddResponse,
    WhiteListDeleteRequest, WhiteListDeleteResponse,
};
use crate::app::App;
use crate::error::AuthGuardError;

/// Metadata key carrying the request id, in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const UNKNOWN: &str = "unknown";

/// Implementation of the `authguard.v1.AuthLimiter` gRPC interface.
pub struct AuthLimiterService {
    app: Arc<App>,
}

impl AuthLimiterService {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    async fn check(&self, req: LimitCheckRequest) -> Result<LimitCheckResponse, Status> {
        require("ip", &req.ip)?;
        require("login", &req.login)?;
        require("password", &req.password)?;

        let allowed = self
            .app
            .limit_check(&req.ip, &req.login, &req.password)
            .await
            .map_err(to_status)?;

        info!(ip = %req.ip, login = %req.login, allowed, "Limit check decided");
        Ok(LimitCheckResponse { allowed })
    }

    async fn reset(&self, req: BucketResetRequest) -> Result<BucketResetResponse, Status> {
        require("ip", &req.ip)?;
        require("login", &req.login)?;

        self.app
            .limit_reset(&req.ip, &req.login)
            .await
            .map_err(to_status)?;

        info!(ip = %req.ip, login = %req.login, "Buckets reset");
        Ok(BucketResetResponse {})
    }
}

fn require(field: &'static str, value: &str) -> Result<(), Status> {
    if value.is_empty() {
        warn!(field, "Received request with empty field");
        return Err(Status::invalid_argument(format!("{field} is required")));
    }
    Ok(())
}

fn to_status(err: AuthGuardError) -> Status {
    warn!(error = %err, "Request failed");
    Status::from(err)
}

fn header<'a>(metadata: &'a MetadataMap, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Access log entry for a single call.
///
/// The request id is taken from the caller's `x-request-id` metadata when
/// present, generated otherwise, recorded on the current span and echoed back
/// on the response or status.
struct CallLog {
    method: &'static str,
    request_id: String,
    peer: String,
    user_agent: String,
    started: Instant,
}

impl CallLog {
    fn start<T>(method: &'static str, request: &Request<T>) -> Self {
        let metadata = request.metadata();

        let request_id = header(metadata, REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Span::current().record("request_id", request_id.as_str());

        let peer = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .or_else(|| {
                header(metadata, "x-forwarded-for")
                    .and_then(|value| value.split(',').next())
                    .map(|ip| ip.trim().to_string())
            })
            .unwrap_or_else(|| UNKNOWN.to_string());

        let user_agent = header(metadata, "user-agent").unwrap_or(UNKNOWN).to_string();

        Self {
            method,
            request_id,
            peer,
            user_agent,
            started: Instant::now(),
        }
    }

    fn finish<T>(self, result: Result<T, Status>) -> Result<Response<T>, Status> {
        let latency = self.started.elapsed();
        let request_id: Option<MetadataValue<Ascii>> = self.request_id.parse().ok();

        let (code, result) = match result {
            Ok(message) => {
                let mut response = Response::new(message);
                if let Some(value) = request_id {
                    response.metadata_mut().insert(REQUEST_ID_HEADER, value);
                }
                (Code::Ok, Ok(response))
            }
            Err(mut status) => {
                if let Some(value) = request_id {
                    status.metadata_mut().insert(REQUEST_ID_HEADER, value);
                }
                (status.code(), Err(status))
            }
        };

        info!(
            method = self.method,
            code = ?code,
            latency_ms = latency.as_secs_f64() * 1000.0,
            peer = %self.peer,
            user_agent = %self.user_agent,
            "gRPC call"
        );
        result
    }
}

#[tonic::async_trait]
impl AuthLimiterRpc for AuthLimiterService {
    /// Decide whether a login attempt may proceed.
    #[instrument(skip_all, fields(request_id = field::Empty))]
    async fn limit_check(
        &self,
        request: Request<LimitCheckRequest>,
    ) -> Result<Response<LimitCheckResponse>, Status> {
        let call = CallLog::start("LimitCheck", &request);
        let result = self.check(request.into_inner()).await;
        call.finish(result)
    }

    #[instrument(skip_all, fields(request_id = field::Empty))]
    async fn bucket_reset(
        &self,
        request: Request<BucketResetRequest>,
    ) -> Result<Response<BucketResetResponse>, Status> {
        let call = CallLog::start("BucketReset", &request);
        let result = self.reset(request.into_inner()).await;
        call.finish(result)
    }

    #[instrument(skip_all, fields(request_id = field::Empty))]
    async fn white_list_add(
        &self,
        request: Request<WhiteListAddRequest>,
    ) -> Result<Response<WhiteListAddResponse>, Status> {
        let call = CallLog::start("WhiteListAdd", &request);
        let ip_net = request.into_inner().ip_net;

        let result = match require("ip_net", &ip_net) {
            Ok(()) => self.app.white_list_add(&ip_net).await.map_err(to_status),
            Err(status) => Err(status),
        };
        debug!(%ip_net, ok = result.is_ok(), "White list add handled");
        call.finish(result.map(|()| WhiteListAddResponse {}))
    }

    #[instrument(skip_all, fields(request_id = field::Empty))]
    async fn white_list_delete(
        &self,
        request: Request<WhiteListDeleteRequest>,
    ) -> Result<Response<WhiteListDeleteResponse>, Status> {
        let call = CallLog::start("WhiteListDelete", &request);
        let ip_net = request.into_inner().ip_net;

        let result = match require("ip_net", &ip_net) {
            Ok(()) => self.app.white_list_delete(&ip_net).await.map_err(to_status),
            Err(status) => Err(status),
        };
        debug!(%ip_net, ok = result.is_ok(), "White list delete handled");
        call.finish(result.map(|()| WhiteListDeleteResponse {}))
    }

    #[instrument(skip_all, fields(request_id = field::Empty))]
    async fn black_list_add(
        &self,
        request: Request<BlackListAddRequest>,
    ) -> Result<Response<BlackListAddResponse>, Status> {
        let call = CallLog::start("BlackListAdd", &request);
        let ip_net = request.into_inner().ip_net;

        let result = match require("ip_net", &ip_net) {
            Ok(()) => self.app.black_list_add(&ip_net).await.map_err(to_status),
            Err(status) => Err(status),
        };
        debug!(%ip_net, ok = result.is_ok(), "Black list add handled");
        call.finish(result.map(|()| BlackListAddResponse {}))
    }

    #[instrument(skip_all, fields(request_id = field::Empty))]
    async fn black_list_delete(
        &self,
        request: Request<BlackListDeleteRequest>,
    ) -> Result<Response<BlackListDeleteResponse>, Status> {
        let call = CallLog::start("BlackListDelete", &request);
        let ip_net = request.into_inner().ip_net;

        let result = match require("ip_net", &ip_net) {
            Ok(()) => self.app.black_list_delete(&ip_net).await.map_err(to_status),
            Err(status) => Err(status),
        };
        debug!(%ip_net, ok = result.is_ok(), "Black list delete handled");
        call.finish(result.map(|()| BlackListDeleteResponse {}))
    }
}
