// src/main.rs - taskboard server entry point
use clap::Parser;
use std::sync::Arc;
use taskboard::config::{self, Config};
use taskboard::web::api::{AppStateInner, create_router_with_state};
use taskboard::web::auth::InMemoryAuthBackend;
use taskboard::web::task_store::InMemoryTaskStore;

#[derive(Parser, Debug)]
#[command(name = "taskboard", version, about = "Task manager API server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "taskboard.toml")]
    config: String,

    /// Address to listen on, overriding `server.bind`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    // A missing file means defaults; an unreadable or invalid one is fatal.
    let mut config = if std::path::Path::new(&args.config).exists() {
        config::load_config(&args.config)?
    } else {
        Config::default()
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.logging.max_level())
        .init();

    tracing::info!("Starting taskboard {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Configuration: {}", args.config);
    tracing::info!(
        "Revocation filter: {} bits, {} hashes",
        config.revocation.capacity_bits,
        config.revocation.hash_count
    );
    tracing::info!("Task list cache TTL: {} ms", config.cache.ttl_ms);

    let state = Arc::new(AppStateInner::new(
        &config,
        Box::new(InMemoryAuthBackend::new()),
        Arc::new(InMemoryTaskStore::new()),
    ));
    let app = create_router_with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C and closes every live subscriber so upgraded
/// connections do not hold the shutdown open.
async fn shutdown_signal(state: taskboard::web::api::AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
    state.shutdown();
}
