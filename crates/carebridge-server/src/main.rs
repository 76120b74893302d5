use std::path::PathBuf;
use std::sync::Arc;

use carebridge_bulk::JobRegistry;
use carebridge_server::{AppState, load_config, observability, router};
use carebridge_store::{MemoryStore, ResilientClient};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From CAREBRIDGE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (carebridge.toml), used only if the file exists
    Default,
    /// Built-in defaults, no file found
    BuiltIn,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (CAREBRIDGE_CONFIG)"),
            Self::Default => write!(f, "default path"),
            Self::BuiltIn => write!(f, "built-in defaults"),
        }
    }
}

fn resolve_config_path() -> (Option<PathBuf>, ConfigSource) {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (Some(PathBuf::from(path)), ConfigSource::CliArgument);
            }
        }
    }
    if let Ok(path) = std::env::var("CAREBRIDGE_CONFIG") {
        return (Some(PathBuf::from(path)), ConfigSource::EnvironmentVariable);
    }
    let default = PathBuf::from("carebridge.toml");
    if default.exists() {
        (Some(default), ConfigSource::Default)
    } else {
        (None, ConfigSource::BuiltIn)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; absence is not an error.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: failed to load .env file: {e}");
        }
    }

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    observability::init_tracing(&cfg.logging.level);
    tracing::info!(
        path = %config_path.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
        source = %source,
        "configuration loaded"
    );

    // The in-memory reference store backs the gateway until a remote
    // backend adapter is configured.
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(ResilientClient::new(store, cfg.store.client_config()));
    let registry = JobRegistry::new(Arc::clone(&client), cfg.bulk.clone());

    let app = router(AppState { registry, client });
    let addr = cfg.addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "carebridge gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
