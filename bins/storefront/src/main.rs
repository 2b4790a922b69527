//! Storefront CLI and Server Binary
//!
//! Entry point for initializing, validating, migrating and starting a
//! Storefront API instance.

use anyhow::{Context, Result};
use async_trait::async_trait;
use cli::{Cli, Commands, LogFormatArg};
use common::SystemClock;
use config::{
    generate_default_config, load_config, save_config, validate_config, PostgresConfig,
    StorefrontConfig,
};
use datastore::api::{datastore_routes, DatastoreApiState};
use datastore::{
    CoordinationStore, DatastoreManager, InMemoryCoordinationStore, PostgresCoordinationStore,
};
use observability::{init_logging, init_metrics, LogFormat};
use server::{
    validate_ports_available, HealthCheck, HealthState, ServerConfig, ShutdownController,
    ShutdownReason, StorefrontServer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start {
            config,
            port,
            instance,
        } => start_command(config, port, instance, cli.log_format).await,
        Commands::Validate { config } => {
            init_logging("storefront", log_format(cli.log_format, None))?;
            validate_command(config).await
        }
        Commands::Init { output } => {
            init_logging("storefront", log_format(cli.log_format, None))?;
            init_command(output).await
        }
        Commands::Migrate { config } => migrate_command(config, cli.log_format).await,
    }
}

/// CLI override first, then the configured format, then pretty
fn log_format(cli_override: Option<LogFormatArg>, config: Option<&StorefrontConfig>) -> LogFormat {
    cli_override
        .map(|arg| arg.as_str())
        .or_else(|| config.map(|c| c.logging.format.as_str()))
        .and_then(LogFormat::parse)
        .unwrap_or_default()
}

/// Reports whether the coordination store answers
struct CoordinationStoreCheck {
    manager: Arc<DatastoreManager>,
    storage_type: String,
}

#[async_trait]
impl HealthCheck for CoordinationStoreCheck {
    fn name(&self) -> &str {
        "coordination-store"
    }

    fn address(&self) -> String {
        self.storage_type.clone()
    }

    async fn check(&self) -> std::result::Result<(), String> {
        self.manager.ping().await.map_err(|e| e.to_string())
    }
}

fn postgres_section(config: &StorefrontConfig) -> Result<&PostgresConfig> {
    config
        .storage
        .postgres
        .as_ref()
        .context("storage.type is 'postgres' but the postgres section is missing")
}

async fn connect_postgres(pg: &PostgresConfig) -> Result<PostgresCoordinationStore> {
    info!(host = %pg.host, port = pg.port, database = %pg.database, "Connecting to PostgreSQL");
    PostgresCoordinationStore::connect(
        &pg.connection_url(),
        pg.max_connections,
        pg.connection_timeout(),
    )
    .await
    .context("Failed to connect to the coordination database")
}

async fn build_store(config: &StorefrontConfig) -> Result<Arc<dyn CoordinationStore>> {
    match config.storage.storage_type.as_str() {
        "memory" => {
            warn!(
                "Using the in-memory coordination store; locks are not shared with other processes"
            );
            Ok(Arc::new(InMemoryCoordinationStore::new()))
        }
        "postgres" => {
            let store = connect_postgres(postgres_section(config)?).await?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("Unknown storage type '{}'", other),
    }
}

/// Log warnings and fail on any validation error
fn ensure_valid(config: &StorefrontConfig) -> Result<()> {
    let report = validate_config(config);

    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }

    if !report.is_valid() {
        error!(error_count = report.errors.len(), "Configuration validation failed");
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot continue due to configuration errors");
    }

    Ok(())
}

async fn start_command(
    config_path: PathBuf,
    port_override: Option<u16>,
    instance_override: Option<String>,
    log_override: Option<LogFormatArg>,
) -> Result<()> {
    let mut config = load_config(&config_path)?;
    if let Some(port) = port_override {
        config.http.port = port;
    }
    if let Some(instance) = instance_override {
        config.service.instance_name = Some(instance);
    }

    init_logging(&config.service.name, log_format(log_override, Some(&config)))?;

    // Validated after overrides so they are checked too
    ensure_valid(&config)?;

    let instance_name = config.service.resolved_instance_name();
    let bindings = config.coordination.datastores.clone();
    info!(
        service = %config.service.name,
        instance = %instance_name,
        datastores = bindings.len(),
        storage = %config.storage.storage_type,
        "Starting Storefront"
    );

    // Ports are checked and the exporter installed before anything records
    let server_config = ServerConfig::new(config.http.host.clone(), config.http.port);
    let extra_ports: Vec<(&str, u16)> = if config.metrics.enabled {
        vec![("metrics", config.metrics.port)]
    } else {
        Vec::new()
    };
    validate_ports_available(&server_config, &extra_ports).await?;

    if config.metrics.enabled {
        init_metrics(config.metrics.port)?;
    }

    let clock = Arc::new(SystemClock);
    let store = build_store(&config).await?;
    let manager = Arc::new(DatastoreManager::new(store, clock.clone(), &config.coordination));

    manager
        .register_bindings(&instance_name, &bindings)
        .await
        .context("Failed to register this instance")?;

    let router = datastore_routes(Arc::new(DatastoreApiState {
        manager: manager.clone(),
        clock,
    }));
    let health = HealthState::new(config.service.name.clone()).with_check(Arc::new(
        CoordinationStoreCheck {
            manager: manager.clone(),
            storage_type: config.storage.storage_type.clone(),
        },
    ));
    let server = StorefrontServer::new(
        config.service.name.clone(),
        server_config,
        router,
        Arc::new(health),
    );

    let shutdown = ShutdownController::with_signals();
    let heartbeat = manager.spawn_heartbeat(&instance_name, &bindings, shutdown.child_token());

    let served = server.run(shutdown.child_token()).await;
    shutdown.shutdown(ShutdownReason::ListenerExited);
    if let Some(reason) = shutdown.reason() {
        info!(%reason, "Stopping Storefront");
    }

    if let Err(e) = heartbeat.await {
        warn!(error = %e, "Heartbeat task ended abnormally");
    }

    let released = manager.release_held_locks(&instance_name, &bindings).await;
    info!(instance = %instance_name, released, "Released held write locks");

    served?;
    info!("Storefront stopped");
    Ok(())
}

async fn validate_command(config_path: PathBuf) -> Result<()> {
    info!(path = ?config_path, "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    let coordination = &config.coordination;
    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {}", config.service.name);
    println!("Storage: {}", config.storage.storage_type);
    println!("HTTP: {}:{}", config.http.host, config.http.port);
    println!(
        "Lease: {}s, CAS retries: {} ({}ms backoff)",
        coordination.lease_duration_seconds,
        coordination.max_cas_retries,
        coordination.cas_retry_backoff_ms

    );
    println!(
        "Heartbeat: every {}s, stale after {}s",
        coordination.heartbeat_interval_seconds, coordination.liveness_threshold_seconds
    );
    println!("Datastores: {}", coordination.datastores.len());
    for binding in &coordination.datastores {
        println!("  - store {} / {}", binding.store_id, binding.name);
    }

    Ok(())
}

async fn init_command(output_path: PathBuf) -> Result<()> {
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, &output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("Next steps:");
    println!("  1. Set INSTANCE_NAME or edit service.instance_name");
    println!("  2. List the datastores this instance serves under coordination.datastores");
    println!(
        "  3. Run 'storefront validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  4. Run 'storefront start --config {:?}' to start the server",
        output_path
    );

    Ok(())
}

async fn migrate_command(config_path: PathBuf, log_override: Option<LogFormatArg>) -> Result<()> {
    let config = load_config(&config_path)?;
    init_logging(&config.service.name, log_format(log_override, Some(&config)))?;

    if config.storage.storage_type != "postgres" {
        anyhow::bail!(
            "storage.type is '{}'; migrations only apply to postgres",
            config.storage.storage_type
        );
    }

    ensure_valid(&config)?;
    let store = connect_postgres(postgres_section(&config)?).await?;
    store
        .run_migrations()
        .await
        .context("Failed to apply coordination schema")?;

    debug!("Coordination schema is up to date");
    println!("[ok] Coordination schema applied");
    Ok(())
}
