//! Server binary for slidecast.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServiceConfig` and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use slidecast::{app, AppState, GraphAuth, ServiceConfig};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port (80)
  slidecast

  # Local development
  slidecast --port 8080 --verbose

  # Client-credentials auth against Graph
  GRAPH_TENANT_ID=... GRAPH_CLIENT_ID=... GRAPH_CLIENT_SECRET=... slidecast

EXTERNAL TOOLS:
  soffice      PPTX → PDF             (SOFFICE_PATH)
  pdfium       PDF → PNG              (PDFIUM_LIB_PATH, a directory)
  ffmpeg       slideshow + narration  (FFMPEG_PATH)
  weasyprint   HTML → PDF             (HTML_TO_PDF_PATH)

GRAPH AUTH:
  GRAPH_TOKEN wins when set. Otherwise all three of GRAPH_TENANT_ID,
  GRAPH_CLIENT_ID and GRAPH_CLIENT_SECRET enable the client-credentials flow.
"#;

/// Extract PPTX notes, render narrated slideshows and convert HTML to PDF over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "slidecast",
    version,
    about = "HTTP service: PPTX notes extraction, slideshow videos, HTML to PDF",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 80)]
    port: u16,

    /// Runtime worker threads (default: available CPUs).
    #[arg(long, env = "WORKERS")]
    workers: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "WORKER_TIMEOUT", default_value_t = 300)]
    worker_timeout: u64,

    /// Outbound connect timeout in seconds.
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value_t = 10)]
    connect_timeout: u64,

    /// Outbound read timeout in seconds.
    #[arg(long, env = "HTTP_READ_TIMEOUT", default_value_t = 60)]
    read_timeout: u64,

    /// Maximum simultaneous downloads across all requests.
    #[arg(long, env = "MAX_CONCURRENT_DOWNLOADS", default_value_t = 4)]
    max_concurrent_downloads: usize,

    /// Seconds each slide stays on screen.
    #[arg(long, env = "SLIDE_DURATION", default_value_t = 5.0)]
    slide_duration: f64,

    /// Crossfade between slides, in seconds.
    #[arg(long, env = "CROSSFADE_DURATION", default_value_t = 1.0)]
    crossfade: f64,

    /// Slide image width in pixels.
    #[arg(long, env = "RENDER_WIDTH", default_value_t = 1920)]
    render_width: u32,

    /// Output video frame rate.
    #[arg(long, env = "VIDEO_FPS", default_value_t = 25)]
    fps: u32,

    /// LibreOffice binary.
    #[arg(long, env = "SOFFICE_PATH", default_value = "soffice")]
    soffice: PathBuf,

    /// ffmpeg binary.
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// HTML → PDF renderer, invoked as `<bin> - -`.
    #[arg(long, env = "HTML_TO_PDF_PATH", default_value = "weasyprint")]
    html_to_pdf: PathBuf,

    /// Directory holding libpdfium (default: system library path).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Graph API root.
    #[arg(long, env = "GRAPH_BASE_URL", default_value = slidecast::config::DEFAULT_GRAPH_BASE_URL)]
    graph_base_url: String,

    /// Identity platform root for client credentials.
    #[arg(long, env = "GRAPH_AUTHORITY_URL", default_value = slidecast::config::DEFAULT_AUTHORITY_URL)]
    graph_authority_url: String,

    /// Static Graph bearer token.
    #[arg(long, env = "GRAPH_TOKEN", hide_env_values = true)]
    graph_token: Option<String>,

    /// Tenant for the client-credentials flow.
    #[arg(long, env = "GRAPH_TENANT_ID")]
    graph_tenant_id: Option<String>,

    /// Application (client) id for the client-credentials flow.
    #[arg(long, env = "GRAPH_CLIENT_ID")]
    graph_client_id: Option<String>,

    /// Client secret for the client-credentials flow.
    #[arg(long, env = "GRAPH_CLIENT_SECRET", hide_env_values = true)]
    graph_client_secret: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SLIDECAST_VERBOSE")]
    verbose: bool,
}

impl Cli {
    fn service_config(&self) -> Result<ServiceConfig> {
        let auth = GraphAuth::from_parts(
            self.graph_token.clone(),
            self.graph_tenant_id.clone(),
            self.graph_client_id.clone(),
            self.graph_client_secret.clone(),
        );

        let mut builder = ServiceConfig::builder()
            .request_timeout_secs(self.worker_timeout)
            .connect_timeout_secs(self.connect_timeout)
            .read_timeout_secs(self.read_timeout)
            .max_concurrent_downloads(self.max_concurrent_downloads)
            .slide_duration_secs(self.slide_duration)
            .crossfade_secs(self.crossfade)
            .render_width_px(self.render_width)
            .video_fps(self.fps)
            .soffice(&self.soffice)
            .ffmpeg(&self.ffmpeg)
            .html_to_pdf(&self.html_to_pdf)
            .graph_base_url(&self.graph_base_url)
            .graph_authority_url(&self.graph_authority_url)
            .graph_auth(auth);

        if let Some(workers) = self.workers {
            builder = builder.workers(workers);
        }
        if let Some(dir) = &self.pdfium_lib_path {
            builder = builder.pdfium_lib_dir(dir);
        }

        builder.build().context("Invalid configuration")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.service_config()?;
    info!("Starting with {:?}", config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(serve(&cli.host, cli.port, config))
}

async fn serve(host: &str, port: u16, config: ServiceConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let state = Arc::new(AppState::new(config).context("Failed to initialise service state")?);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down cleanly");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix (container stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
