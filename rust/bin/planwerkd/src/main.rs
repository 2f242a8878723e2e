//! `planwerkd` — the planwerk server binary.
//!
//! Usage:
//!   planwerkd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/planwerk/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use planwerk_core::Module;
use tracing::info;

use config::ServerConfig;

/// Planwerk server.
#[derive(Parser, Debug)]
#[command(name = "planwerkd", about = "Planwerk manufacturing-planning server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides default 0.0.0.0:8080).
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Load server configuration.
    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    // Initialize storage.
    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = planwerk_core::ServiceConfig {
        data_dir: Some(data_dir.clone()),
        listen: cli.listen.clone(),
        ..Default::default()
    };

    let sql: Arc<dyn planwerk_sql::SQLStore> = Arc::new(
        planwerk_sql::SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );

    // Shop module owns the machine registry; the plan module shares its
    // store so reservations flip the same machine rows.
    let machine_store = Arc::new(
        shop::store::ShopStore::new(Arc::clone(&sql))
            .map_err(|e| anyhow::anyhow!("failed to init shop storage: {}", e))?,
    );
    let shop_module = shop::ShopModule::new(shop::service::ShopService::new(
        Arc::clone(&machine_store),
    ));
    info!("Shop module initialized");

    let plan_config = plan::PlanConfig {
        reservation_ttl_secs: server_config.scheduler.reservation_ttl_secs,
        expiry_check_interval_secs: server_config.scheduler.expiry_check_interval_secs,
    };
    let plan_module = plan::PlanModule::with_config(
        Arc::clone(&sql),
        Arc::clone(&machine_store),
        plan_config,
    )
    .map_err(|e| anyhow::anyhow!("failed to init plan module: {}", e))?;
    info!("Plan module initialized");

    let module_routes = vec![
        (shop_module.name(), shop_module.routes()),
        (plan_module.name(), plan_module.routes()),
    ];

    // Build router.
    let app = routes::build_router(module_routes);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!("Planwerk server listening on {}", cli.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
