//! bundleworks server — micro-frontend build & publish worker.
//!
//! Accepts build requests over HTTP, clones the requested branch, runs the
//! project's configured build commands, publishes the dist files under a
//! versioned static path, and serves them back.

mod routes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use url::Url;

use bundleworks_core::BuildService;
use bundleworks_ledger::Ledger;
use bundleworks_scm::GitlabClient;
use bundleworks_shared::{AppConfig, init_config, load_config, load_config_from};
use bundleworks_store::ArtifactStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bundleworks — build and publish micro-frontend bundles.
#[derive(Parser)]
#[command(
    name = "bundleworks",
    version,
    about = "Build micro-frontend bundles on request and publish them under versioned static paths.",
    long_about = None,
)]
struct Cli {
    /// Path to the config file (overrides the default search locations).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Start the build worker and HTTP server (the default).
    Serve,

    /// Write a template config file to ./bundleworks.toml and exit.
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Init => {
            let path = init_config()?;
            println!(
                "template config created at {}, fill in correct values and start the server",
                path.display()
            );
            Ok(())
        }
        Command::Serve => serve(cli.config.as_deref()).await,
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "bundleworks=info,tower_http=info",
        1 => "bundleworks=debug,tower_http=debug",
        _ => "bundleworks=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Server wiring
// ---------------------------------------------------------------------------

async fn serve(config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.validate()?;
    let config = Arc::new(config);

    let token = config.scm.resolve_token()?;

    let ledger = Arc::new(Ledger::open(Path::new(&config.db_path)).await?);
    let store = Arc::new(ArtifactStore::new(
        Path::new(&config.storage_path),
        &config.http_base_url,
    )?);
    let static_root = store.layout().static_path();

    let scm_base_url = Url::parse(&config.scm.base_url)?;
    let scm = Arc::new(GitlabClient::new(scm_base_url, token.clone())?);

    let service = BuildService::start(config.clone(), scm, ledger, store, token)?;
    let state = Arc::new(routes::AppState { service });

    let app = routes::router(state, &static_root);

    let addr = bind_addr(&config)?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "bundleworks server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// The listen address comes from the configured base URL's host and port.
fn bind_addr(config: &AppConfig) -> Result<String> {
    let base = Url::parse(&config.http_base_url)?;
    let host = base
        .host_str()
        .ok_or_else(|| eyre!("http_base_url has no host: {}", config.http_base_url))?;
    let port = base
        .port_or_known_default()
        .ok_or_else(|| eyre!("http_base_url has no port: {}", config.http_base_url))?;
    Ok(format!("{host}:{port}"))
}
