use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use desk_state::{BlobStore, Desktop, FsBlobStore, MemoryBlobStore};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
#[cfg(test)]
mod test_helpers;

use crate::config::{
    CliOverrides, DeskConfig, FileConfig, Profile, ServerConfig, StorageBackend, load_config,
};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "desk")]
#[command(about = "Shared desktop state server with live WebSocket sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.desksync)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server in the foreground (default)
    Serve(ServeArgs),

    /// Print the resolved configuration as TOML
    Config(ConfigArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Configuration preset
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct ConfigArgs {
    /// Configuration preset
    #[arg(long, value_enum)]
    profile: Option<Profile>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub desktop: Arc<Desktop>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(desktop: Arc<Desktop>) -> Self {
        Self {
            desktop,
            started_at: Utc::now(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => run_server(ServeArgs::default(), cli.data_dir).await,
        Some(Commands::Serve(args)) => run_server(args, cli.data_dir).await,
        Some(Commands::Config(args)) => print_config(args, cli.data_dir),
    }
}

fn print_config(args: ConfigArgs, data_dir: Option<PathBuf>) -> Result<()> {
    let dirs = DeskConfig::new(data_dir)?;
    let fc: FileConfig = load_config(&dirs.data_dir, args.profile.as_ref())
        .extract()
        .context("Failed to load configuration")?;
    print!("{}", toml::to_string_pretty(&fc)?);
    Ok(())
}

async fn run_server(args: ServeArgs, data_dir: Option<PathBuf>) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "desk=debug,desk_state=debug,tower_http=debug,info"
    } else {
        "desk=info,desk_state=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting desk sync server");

    let dirs = DeskConfig::new(data_dir)?;
    let fc: FileConfig = load_config(&dirs.data_dir, args.profile.as_ref())
        .extract()
        .context("Failed to load configuration")?;
    info!("Config file: {}", dirs.config_toml_path().display());
    let overrides = CliOverrides {
        host: args.host,
        port: args.port,
    };
    let server_config = ServerConfig::resolve(&fc, &dirs, &overrides)?;

    let blobs: Arc<dyn BlobStore> = match server_config.storage.backend {
        StorageBackend::Fs => {
            let store = FsBlobStore::new(server_config.storage.files_dir.clone()).with_context(|| {
                format!(
                    "Failed to create files directory: {:?}",
                    server_config.storage.files_dir
                )
            })?;
            info!("Saving files to {}", store.root().display());
            Arc::new(store)
        }
        StorageBackend::Memory => {
            info!("Saving files in memory; content is lost on exit");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let desktop = Arc::new(
        Desktop::builder()
            .theme(server_config.default_theme.clone())
            .channel_capacity(server_config.send_channel_capacity)
            .blob_store(blobs)
            .build(),
    );
    let app_state = AppState::new(desktop.clone());

    let app = handlers::api_routes()
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(cors_layer(&server_config.allowed_origins)?)
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.bind_addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Desk server listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  GET    /api/state                 - Full desktop state");
    info!("  POST   /api/windows               - Create window");
    info!("  PUT    /api/windows/{{id}}          - Replace window");
    info!("  DELETE /api/windows/{{id}}          - Delete window");
    info!("  GET    /api/files                 - List files");
    info!("  POST   /api/files                 - Create file");
    info!("  POST   /api/files/save            - Save file content");
    info!("  GET    /api/files/{{name}}/content  - Load saved content");
    info!("  PUT    /api/theme                 - Set theme");
    info!("  GET    /ws                        - Live state stream");

    // Upgraded sockets outlive graceful shutdown, so close them here
    let shutdown_desktop = desktop.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing subscribers...");
        shutdown_desktop.shutdown().await;
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    info!("Shutdown complete");
    server_result
}

/// Permissive when no origins are configured, otherwise an explicit allow-list.
fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    if allowed_origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }

    let origins = allowed_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("Invalid allowed origin: {}", o))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any))
}
