//! MJPEG relay HTTP server example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                    # binds to 0.0.0.0:8081
//!   cargo run --example relay_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! ## Watching a camera
//!
//! Open in a browser (or an `<img>` tag):
//!   http://localhost:8081/stream_proxy?host=172.16.1.200&port=8000&path=/stream0.mjpg
//!
//! Every viewer of the same camera shares one upstream connection.
//!
//! ## Statistics
//!
//!   curl http://localhost:8081/stats

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::unfold;
use serde::Deserialize;
use tokio::net::TcpListener;

use mjpeg_relay::viewer::response_headers;
use mjpeg_relay::{RelayConfig, RelayDirectory, RelayError, ViewerError, ViewerSession};

const DEFAULT_BIND: &str = "0.0.0.0:8081";
const DEFAULT_STREAM_HOST: &str = "172.16.1.200";
const DEFAULT_STREAM_PORT: u16 = 8000;
const DEFAULT_STREAM_PATH: &str = "/stream0.mjpg";

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: {})", DEFAULT_BIND);
}

/// Camera selection for `/stream_proxy`
#[derive(Debug, Deserialize)]
struct StreamQuery {
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
}

impl StreamQuery {
    fn url(&self) -> String {
        RelayDirectory::stream_url(
            self.host.as_deref().unwrap_or(DEFAULT_STREAM_HOST),
            self.port.unwrap_or(DEFAULT_STREAM_PORT),
            self.path.as_deref().unwrap_or(DEFAULT_STREAM_PATH),
        )
    }
}

/// Relay errors mapped to HTTP responses
struct AppError(RelayError);

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RelayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("{}\n", self.0)).into_response()
    }
}

async fn stream_proxy(
    State(directory): State<Arc<RelayDirectory>>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, AppError> {
    let url = query.url();
    let relay = directory.get_or_create(&url)?;
    let session = ViewerSession::open(relay)?;

    // The session (and its subscription) lives as long as the body stream.
    let chunks = unfold(session, |mut session| async move {
        match session.next_chunk().await {
            Ok(chunk) => Some((Ok::<_, Infallible>(chunk), session)),
            Err(ViewerError::Shutdown) => None,
            Err(e) => {
                tracing::info!(url = %session.relay().url(), reason = %e, "Viewer stream ended");
                None
            }
        }
    });

    let mut response = Response::builder().status(StatusCode::OK);
    for (name, value) in response_headers() {
        response = response.header(name, value);
    }
    response
        .body(Body::from_stream(chunks))
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Failed to build viewer response");
            AppError(RelayError::Unavailable(url.clone()))
        })
}

async fn stats(State(directory): State<Arc<RelayDirectory>>) -> String {
    let mut out = String::new();
    for stats in directory.stats() {
        out.push_str(&format!(
            "{} state={:?} subscribers={} cached={} received={} served={} \
             connections={} errors={} bytes={}\n",
            stats.url,
            stats.state,
            stats.subscriber_count,
            stats.cache.frames_in_cache,
            stats.cache.frames_received,
            stats.cache.frames_served,
            stats.upstream.connections,
            stats.upstream.upstream_errors,
            stats.upstream.bytes_received,
        ));
    }
    if out.is_empty() {
        out.push_str("No active relays\n");
    }
    out
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr: SocketAddr = args
        .get(1)
        .map(String::as_str)
        .unwrap_or(DEFAULT_BIND)
        .parse()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_relay=info".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let directory = Arc::new(RelayDirectory::new(RelayConfig::default()));

    let app = Router::new()
        .route("/stream_proxy", get(stream_proxy))
        .route("/stats", get(stats))
        .with_state(Arc::clone(&directory));

    let listener = TcpListener::bind(bind_addr).await?;

    println!("MJPEG relay listening on http://{}", bind_addr);
    println!(
        "Watch: http://localhost:{}/stream_proxy?host={}&port={}&path={}",
        bind_addr.port(),
        DEFAULT_STREAM_HOST,
        DEFAULT_STREAM_PORT,
        DEFAULT_STREAM_PATH
    );

    // Stopping the relays ends every viewer stream, which lets the server
    // finish its open connections.
    let shutdown = {
        let directory = Arc::clone(&directory);
        async move {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
            directory.stop_all();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    directory.stop_all();
    Ok(())
}
