//! ucrif-nv - Novedades record service
//!
//! Stores the daily records of the nine UCRIF groups and the operation
//! files of the two investigative groups, behind an authenticated HTTP
//! API. Zero-config startup: the database is created on first run under
//! the resolved root folder.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use ucrif_common::api::auth::load_shared_secret;
use ucrif_common::config::{load_config, resolve_root_folder};
use ucrif_common::db::init_database;
use ucrif_nv::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "ucrif-nv", about = "UCRIF novedades record service")]
struct Args {
    /// Data directory (overrides UCRIF_ROOT_FOLDER and the config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// Listen port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting UCRIF Novedades (ucrif-nv) v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let strategy = config.scope_strategy()?;

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)?;

    let db_path = root_folder.join("ucrif.db");
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;

    let shared_secret = load_shared_secret(&pool).await?;
    if shared_secret == 0 {
        info!("API authentication disabled (shared_secret = 0)");
    } else {
        info!("Loaded shared secret for API authentication");
    }

    info!(
        "Tenant {} with {:?} scoping",
        config.tenant_id, strategy
    );

    let state = AppState::new(pool, shared_secret, &config.tenant_id, strategy);
    let app = build_router(state);

    let port = args.port.unwrap_or(config.port);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("ucrif-nv listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
