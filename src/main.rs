use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keywarden::config::{Config, StorageKind};
use keywarden::handlers;
use keywarden::rate_limit::SlidingWindowLimiter;
use keywarden::store::{AppState, FileStore, LicenseStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "keywarden")]
#[command(about = "Machine-bound license key verification service")]
struct Cli {
    /// Override the STORAGE environment variable
    #[arg(long, value_enum)]
    storage: Option<StorageKind>,
}

fn open_store(config: &Config) -> Arc<dyn LicenseStore> {
    match config.storage {
        StorageKind::Sqlite => {
            tracing::info!("Using SQLite store at {}", config.database_path);
            Arc::new(
                SqliteStore::open(&config.database_path).expect("Failed to open database"),
            )
        }
        StorageKind::File => {
            tracing::info!("Using file store at {}", config.data_file);
            Arc::new(FileStore::open(&config.data_file).expect("Failed to open data file"))
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keywarden=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }

    if config.license_secret.is_empty() {
        tracing::warn!("LICENSE_SECRET is not set; no issued key can verify");
    }
    if config.admin_token.is_empty() {
        tracing::warn!("ADMIN_TOKEN is not set; the admin surface is locked");
    }
    if config.allow_self_register {
        tracing::info!("Self-registration enabled: signed but unknown keys register on first verify");
    }

    let store = open_store(&config);

    let state = AppState {
        store,
        license_secret: Arc::new(config.license_secret.clone().into_bytes()),
        admin_token: Arc::new(config.admin_token.clone()),
        rate_limiter: Arc::new(SlidingWindowLimiter::new(
            config.rate_limit_max,
            config.rate_limit_window_secs,
        )),
        allow_self_register: config.allow_self_register,
    };

    let app = Router::new()
        .merge(handlers::public::router(state.clone()))
        .merge(handlers::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("keywarden listening on {}", addr);

    // Connect info enables peer-address rate limiting for direct clients.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
