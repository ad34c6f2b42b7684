//! targetfs storage target
//!
//! Registers the configured mountpaths, keeps them health-checked and serves
//! health and metrics endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Storage Target                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Health    │───▶│  MountedFs   │◀───│ Health/Metric│       │
//! │  │   Checker    │    │  (registry)  │    │   Servers    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use targetfs::error::{Error, Result};
use targetfs::fs::{self, MountedFs};
use targetfs::health::{MountpathHealthChecker, NodeHealth};
use targetfs::{NodeConfig, RegistryMetrics};

// =============================================================================
// CLI Arguments
// =============================================================================

/// targetfs - mountpath registry and health checking for a storage target
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mountpath directory (repeatable)
    #[arg(long = "mountpath", env = "MOUNTPATHS", value_delimiter = ',')]
    mountpaths: Vec<PathBuf>,

    /// YAML configuration file
    #[arg(long, env = "TARGETFS_CONFIG")]
    config: Option<PathBuf>,

    /// Allow several mountpaths on one filesystem (loopback/test setups)
    #[arg(long, env = "NO_FSID_CHECK")]
    no_fsid_check: bool,

    /// Disable the mountpath health checker
    #[arg(long, env = "NO_HEALTH_CHECK")]
    no_health_check: bool,

    /// Seconds between mountpath health checks
    #[arg(long, env = "HEALTH_CHECK_INTERVAL_SECONDS")]
    health_check_interval_seconds: Option<u64>,

    /// Consecutive failed checks before a mountpath is disabled
    #[arg(long, env = "HEALTH_CHECK_FAILURE_THRESHOLD")]
    health_check_failure_threshold: Option<u32>,

    /// Milliseconds a single mountpath check may take
    #[arg(long, env = "HEALTH_CHECK_TIMEOUT_MS")]
    health_check_timeout_ms: Option<u64>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Combine the config file with command-line overrides
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        config.merge_mountpaths(self.mountpaths.iter().cloned());
        if self.no_fsid_check {
            config.check_fsid = false;
        }
        if self.no_health_check {
            config.health_check.enabled = false;
        }
        if let Some(secs) = self.health_check_interval_seconds {
            config.health_check.interval_secs = secs;
        }
        if let Some(threshold) = self.health_check_failure_threshold {
            config.health_check.failure_threshold = threshold;
        }
        if let Some(timeout_ms) = self.health_check_timeout_ms {
            config.health_check.check_timeout_ms = timeout_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting targetfs storage target");

    let config = args.node_config().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    info!("  Mountpaths: {:?}", config.mountpaths);
    info!("  Fsid check: {}", config.check_fsid);
    info!("  Health check: {:?}", config.health_check);

    // Register mountpaths; any failure here stops the node
    let mfs = Arc::new(MountedFs::new());
    mfs.set_fsid_check(config.check_fsid);
    if let Err(e) = mfs.init(&config.mountpaths) {
        match e.path() {
            Some(path) => error!(mountpath = %path.display(), "Failed to register mountpaths: {}", e),
            None => error!("Failed to register mountpaths: {}", e),
        }
        return Err(e);
    }

    let current = mfs.mountpaths();
    for mpath in current.available().values() {
        info!("Mountpath {}", mpath);
    }
    let capacity = fs::scan(&mfs);
    info!(
        "Capacity: {} bytes total, {} bytes available ({:.1}% used)",
        capacity.total_bytes(),
        capacity.available_bytes(),
        capacity.used_percent()
    );

    let metrics = RegistryMetrics::new()?;
    metrics.observe(&current);
    drop(current);

    let shutdown = CancellationToken::new();

    // Start mountpath health checker
    let checker_handle = if config.health_check.enabled {
        let checker = Arc::new(
            MountpathHealthChecker::new(Arc::clone(&mfs), config.health_check.clone())
                .with_metrics(metrics.clone()),
        );
        Some(tokio::spawn(checker.run(shutdown.clone())))
    } else {
        warn!("Mountpath health checker disabled");
        None
    };

    // Start health server
    let health = Arc::new(NodeHealth::new(Arc::clone(&mfs)));
    let health_addr = args.health_addr.clone();
    let health_state = HttpState {
        mfs: Arc::clone(&mfs),
        health: Arc::clone(&health),
        metrics: metrics.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = serve(&health_addr, "Health", health_state, health_handler).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_state = HttpState {
        mfs: Arc::clone(&mfs),
        health: Arc::clone(&health),
        metrics,
    };
    tokio::spawn(async move {
        if let Err(e) = serve(&metrics_addr, "Metrics", metrics_state, metrics_handler).await {
            error!("Metrics server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    health.set_live(false);
    shutdown.cancel();
    if let Some(handle) = checker_handle {
        if let Err(e) = handle.await {
            error!("Health checker task failed: {}", e);
        }
    }

    info!("Storage target shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "h2=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// HTTP Servers
// =============================================================================

#[derive(Clone)]
struct HttpState {
    mfs: Arc<MountedFs>,
    health: Arc<NodeHealth>,
    metrics: RegistryMetrics,
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn respond_json<T: serde::Serialize>(value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, "application/json", body),
        Err(e) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            format!("serialization failed: {}", e),
        ),
    }
}

fn health_handler(req: Request<Incoming>, state: &HttpState) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/healthz" | "/livez" => {
            if state.health.is_live() {
                respond(StatusCode::OK, "text/plain", "ok")
            } else {
                respond(StatusCode::SERVICE_UNAVAILABLE, "text/plain", "shutting down")
            }
        }
        "/readyz" => {
            if state.health.is_ready() {
                respond(StatusCode::OK, "text/plain", "ok")
            } else {
                respond(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "text/plain",
                    "no available mountpaths",
                )
            }
        }
        "/health" => respond_json(&state.health.report()),
        "/capacity" => respond_json(&fs::scan(&state.mfs)),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

fn metrics_handler(req: Request<Incoming>, state: &HttpState) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/metrics" => {
            state.metrics.observe(&state.mfs.mountpaths());
            match state.metrics.encode() {
                Ok(text) => respond(StatusCode::OK, "text/plain; version=0.0.4", text),
                Err(e) => respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    e.to_string(),
                ),
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

async fn serve(
    addr: &str,
    name: &'static str,
    state: HttpState,
    handler: fn(Request<Incoming>, &HttpState) -> Response<Full<Bytes>>,
) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {} server address: {}", name, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server: {}", name, e)))?;

    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("{} server accept error: {}", name, e)))?;

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = handler(req, &state);
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}
