use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_logo_proxy::{
    config::Config,
    database::Database,
    fetch::ResilientHttpClient,
    job_scheduling::{IndexScheduler, RefreshJob},
    store::{KeyValueStore, SeaOrmStore},
    web::{AppState, WebServer},
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "token-logo-proxy")]
#[command(version)]
#[command(about = "Token logo cache and CORS-enabled image proxy")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file and environment)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(cli: &Cli) {
    let log_filter = if cli.log_level == "trace" {
        format!("token_logo_proxy={},tower_http=trace", cli.log_level)
    } else {
        format!("token_logo_proxy={}", cli.log_level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    info!("Starting Token Logo Proxy v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    config.validate()?;

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!(
        "{} database connection established and migrations applied",
        database.database_type.as_str()
    );

    let store: Arc<dyn KeyValueStore> = Arc::new(SeaOrmStore::from_database(&database));
    let client = ResilientHttpClient::new(&config.upstream)?;
    let state = AppState::new(config, store.clone(), client);

    let job = Arc::new(RefreshJob::new(
        store,
        state.registry.clone(),
        state.indexer.clone(),
        state.config.indexer.lock_ttl,
    ));
    let scheduler = IndexScheduler::new(job, &state.config.indexer)?;
    let scheduler_task = tokio::spawn(scheduler.start());

    let web_server = WebServer::new(state)?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    let served = web_server.serve().await;

    scheduler_task.abort();
    info!("Token Logo Proxy stopped");
    served
}
