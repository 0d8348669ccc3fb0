//! Control HTTP API
//!
//! Exposes the node's emitter and burst dispatcher to operators and to the
//! fleet controller. Every route answers with a JSON `Envelope`.
//!
//! Routes:
//! - `POST /api/v1/config`    - partial payload update
//! - `POST /api/v1/start`     - start periodic emission
//! - `POST /api/v1/stop`      - stop periodic emission
//! - `GET  /api/v1/stats`     - detailed stats
//! - `POST /api/v1/frequency` - change emission period
//! - `POST /api/v1/spam`      - run a burst and wait for its result
//! - `GET  /health`           - liveness

use crate::domain::{BurstRequest, ConfigUpdate, Envelope, FrequencyRequest};
use crate::infra::parse_period;
use crate::services::burst::{BurstDispatcher, BurstJob, BurstLimits};
use crate::services::emitter::Emitter;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub const API_PREFIX: &str = "/api/v1";

/// Shared handles behind every connection
#[derive(Clone)]
pub struct ControlState {
    pub emitter: Emitter,
    pub burst: BurstDispatcher,
    pub burst_limits: BurstLimits,
}

/// A rendered reply before it is wrapped into a hyper response
#[derive(Debug)]
struct Reply {
    status: StatusCode,
    body: String,
}

impl Reply {
    fn json<T: Serialize>(status: StatusCode, envelope: &Envelope<T>) -> Self {
        match serde_json::to_string(envelope) {
            Ok(body) => Self { status, body },
            Err(e) => {
                error!(error = %e, "control_response_encode_failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: r#"{"data":null,"error":true,"message":"encode failed"}"#.to_string(),
                }
            }
        }
    }

    fn ok<T: Serialize>(data: T, message: &str) -> Self {
        Self::json(StatusCode::OK, &Envelope::ok(data, message))
    }

    fn done(message: &str) -> Self {
        Self::json(StatusCode::OK, &Envelope::<()>::empty(message))
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::json(StatusCode::BAD_REQUEST, &Envelope::<()>::fail(message))
    }

    fn into_response(self, content_type: &'static str) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = self.status;
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Reply> {
    serde_json::from_slice(body).map_err(|e| Reply::bad_request(format!("invalid request body: {e}")))
}

/// Route one request. Kept free of hyper types so handlers are testable
/// without a socket.
async fn dispatch(state: &ControlState, method: &Method, path: &str, body: &[u8]) -> Reply {
    let Some(route) = path.strip_prefix(API_PREFIX) else {
        return Reply::json(StatusCode::NOT_FOUND, &Envelope::<()>::fail("not found"));
    };

    match (method, route) {
        (&Method::POST, "/config") => match decode::<ConfigUpdate>(body) {
            Ok(update) => {
                state.emitter.configure(&update);
                Reply::done("configuration updated")
            }
            Err(reply) => reply,
        },
        (&Method::POST, "/start") => {
            if state.emitter.start() {
                Reply::done("emitter started")
            } else {
                Reply::bad_request("already running")
            }
        }
        (&Method::POST, "/stop") => {
            if state.emitter.stop() {
                Reply::done("emitter stopped")
            } else {
                Reply::bad_request("already stopped")
            }
        }
        (&Method::GET, "/stats") => Reply::ok(state.emitter.detailed_stats(), "stats retrieved"),
        (&Method::POST, "/frequency") => {
            let req = match decode::<FrequencyRequest>(body) {
                Ok(req) => req,
                Err(reply) => return reply,
            };
            match parse_period(&req.timeout).and_then(|p| state.emitter.set_frequency(p)) {
                Ok(()) => Reply::done("frequency updated"),
                Err(e) => Reply::bad_request(e.to_string()),
            }
        }
        (&Method::POST, "/spam") => {
            let req = match decode::<BurstRequest>(body) {
                Ok(req) => req,
                Err(reply) => return reply,
            };
            match BurstJob::from_request(&req, &state.burst_limits) {
                Ok(job) => Reply::ok(state.burst.run(job).await, "burst completed"),
                Err(e) => Reply::bad_request(e.to_string()),
            }
        }
        _ => Reply::json(StatusCode::NOT_FOUND, &Envelope::<()>::fail("not found")),
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<ControlState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::GET && path == "/health" {
        let reply = Reply { status: StatusCode::OK, body: "ok".to_string() };
        return Ok(reply.into_response("text/plain; charset=utf-8"));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, path = %path, "control_body_read_failed");
            return Ok(Reply::bad_request("unreadable request body").into_response("application/json"));
        }
    };

    let reply = dispatch(&state, &method, &path, &body).await;
    if reply.status.is_client_error() {
        warn!(method = %method, path = %path, status = %reply.status.as_u16(), "control_request_rejected");
    } else {
        info!(method = %method, path = %path, "control_request_handled");
    }
    Ok(reply.into_response("application/json"))
}

/// Serve the control API on an already bound listener until `shutdown`
/// flips to `true`
pub async fn serve(
    listener: TcpListener,
    state: ControlState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let state = Arc::new(state);
    info!(addr = %listener.local_addr()?, "control_api_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "control_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "control_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("control_api_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind `addr` and serve the control API
pub async fn start_control_server(
    addr: SocketAddr,
    state: ControlState,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await
}
