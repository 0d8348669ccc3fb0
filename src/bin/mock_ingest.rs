//! Mock ingestion endpoint
//!
//! Accepts readings over HTTP/JSON so a loadgen fleet can run end-to-end
//! on one machine.
//!
//! Behavior:
//! 1. Listens on configurable port (default 8080)
//! 2. `POST /api/v1/readings` with a JSON reading answers `{"status": ...}`
//! 3. Optionally delays every response and fails every Nth request with 500
//! 4. Logs received/rejected counts periodically
//!
//! Usage:
//!   cargo run --bin mock_ingest -- --port 8080 --delay-ms 5 --fail-every 10

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use sensor_loadgen::domain::{Ack, Reading};
use sensor_loadgen::io::sink::READINGS_PATH;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mock_ingest")]
#[command(about = "Mock reading ingestion endpoint for local load tests")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Artificial delay before each response (ms)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Reject every Nth reading with 500 (0 = never)
    #[arg(long, default_value = "0")]
    fail_every: u64,

    /// Count report interval (seconds)
    #[arg(long, default_value = "10")]
    report_interval_secs: u64,
}

#[derive(Default)]
struct IngestCounters {
    received: AtomicU64,
    rejected: AtomicU64,
}

struct IngestState {
    delay: Duration,
    fail_every: u64,
    counters: IngestCounters,
}

fn json_response(status: StatusCode, ack: &Ack) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(ack).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<IngestState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::POST || req.uri().path() != READINGS_PATH {
        return Ok(json_response(StatusCode::NOT_FOUND, &Ack { status: "not found".to_string() }));
    }

    let reading = match req.into_body().collect().await {
        Ok(collected) => serde_json::from_slice::<Reading>(&collected.to_bytes()),
        Err(e) => {
            error!(error = %e, "ingest_body_read_failed");
            return Ok(json_response(StatusCode::BAD_REQUEST, &Ack { status: "unreadable body".to_string() }));
        }
    };
    let reading = match reading {
        Ok(reading) => reading,
        Err(e) => {
            return Ok(json_response(StatusCode::BAD_REQUEST, &Ack { status: format!("invalid reading: {e}") }))
        }
    };

    let n = state.counters.received.fetch_add(1, Ordering::Relaxed) + 1;
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    if state.fail_every > 0 && n % state.fail_every == 0 {
        state.counters.rejected.fetch_add(1, Ordering::Relaxed);
        return Ok(json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &Ack { status: format!("rejected reading {n}") },
        ));
    }

    debug!(sensor_type = %reading.sensor_type, id1 = %reading.id1, value = %reading.value, "reading_received");
    Ok(json_response(
        StatusCode::OK,
        &Ack { status: format!("successfully received {} from {}", reading.sensor_type, reading.id1) },
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║              Mock Reading Ingestion Endpoint             ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Port:            {:>5}                                   ║", args.port);
    println!("║ Delay:           {:>5} ms                                ║", args.delay_ms);
    println!("║ Fail every:      {:>5}                                   ║", args.fail_every);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let state = Arc::new(IngestState {
        delay: Duration::from_millis(args.delay_ms),
        fail_every: args.fail_every,
        counters: IngestCounters::default(),
    });

    let reporter = state.clone();
    let report_interval = Duration::from_secs(args.report_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(report_interval);
        let mut last = 0u64;
        loop {
            interval.tick().await;
            let received = reporter.counters.received.load(Ordering::Relaxed);
            let rejected = reporter.counters.rejected.load(Ordering::Relaxed);
            let rate = (received - last) as f64 / report_interval.as_secs_f64();
            last = received;
            info!(received = %received, rejected = %rejected, rps = %format!("{rate:.2}"), "ingest_report");
        }
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;
    info!(port = %args.port, path = %READINGS_PATH, "mock_ingest_started");

    loop {
        let (stream, _peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(req, state).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(error = %e, "ingest_http_error");
            }
        });
    }
}
