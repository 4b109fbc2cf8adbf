use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use finops_admin::config::Config;
use finops_admin::services::{MetricsService, SnowflakeClient};
use finops_admin::{AppState, create_app};

#[derive(Parser, Debug)]
#[command(name = "finops-admin", about = "Cost observability over warehouse query telemetry")]
struct Args {
    /// Path to a config file (defaults to conf/config.toml lookup)
    #[arg(long)]
    config: Option<String>,

    /// Bind address override, e.g. 127.0.0.1
    #[arg(long)]
    host: Option<String>,

    /// Port override
    #[arg(long)]
    port: Option<u16>,

    /// Refresh all dimensions once at startup
    #[arg(long, default_value_t = false)]
    warm_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = Config::load_from(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // Keep the guard alive for the process lifetime so file logs flush.
    let _log_guard = init_tracing(&config);

    let source = Arc::new(SnowflakeClient::new(config.snowflake.clone(), &config.source));
    let metrics = Arc::new(MetricsService::new(source, config.metrics.ttl_secs));

    if args.warm_cache {
        tracing::info!("Warming metrics cache before serving");
        if let Err(e) = metrics.refresh_all().await {
            tracing::warn!("Cache warm-up failed, continuing without snapshots: {}", e);
        }
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState { config, metrics });
    let app = create_app(state);

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match config.logging.file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().map(|f| f.to_string_lossy().into_owned());
            let appender = tracing_appender::rolling::daily(
                dir,
                file.unwrap_or_else(|| "finops-admin.log".to_string()),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        },
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        },
    }
}
