use city_weather_service::api_client::{OpenMeteoClient, WeatherSource};
use city_weather_service::config::Config;
use city_weather_service::directory::{EntityDirectory, PgEntityDirectory, StaticDirectory};
use city_weather_service::handlers::AppState;
use city_weather_service::query::QueryFacade;
use city_weather_service::scheduler::RefreshScheduler;
use city_weather_service::store::{self, MemoryReadingStore, PgReadingStore, ReadingStore};
use common::errors::AppError;
use common::http_client::HttpClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    common::tracing::init(&config.log_format);

    if config.fetch_timeout_secs < config.fetch_budget_secs() {
        warn!(
            fetch_timeout_secs = config.fetch_timeout_secs,
            budget_secs = config.fetch_budget_secs(),
            "FETCH_TIMEOUT_SECS is shorter than the HTTP retry budget, late retries will be cut off"
        );
    }

    let cancellation_token = CancellationToken::new();

    let (directory, store) = build_storage(&config).await?;

    let http_client = HttpClient::new(config.http_timeout_secs, config.http_max_retries)?;
    let source: Arc<dyn WeatherSource> = Arc::new(OpenMeteoClient::new(
        http_client,
        &config.open_meteo_url,
        config.weather_api_key.clone(),
        config.rate_limit_per_minute,
    )?);

    let scheduler = Arc::new(RefreshScheduler::new(
        directory,
        source,
        store.clone(),
        config.refresh_concurrency,
        config.fetch_timeout(),
        cancellation_token.clone(),
    ));

    if config.admin_jwt_secret.is_none() {
        warn!("ADMIN_JWT_SECRET not set, admin routes are disabled");
    }

    let state = AppState {
        query: QueryFacade::new(store),
        scheduler: scheduler.clone(),
        jwt_secret: config.admin_jwt_secret.as_deref().map(Arc::from),
    };

    let refresh_interval = config.refresh_interval();
    let refresh_on_startup = config.refresh_on_startup;
    let scheduler_task = tokio::spawn(async move {
        scheduler.run(refresh_interval, refresh_on_startup).await;
    });

    let app = city_weather_service::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("City weather service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancellation_token))
        .await?;

    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "Refresh scheduler task ended abnormally");
    }

    info!("City weather service stopped");
    Ok(())
}

/// Postgres for both directory and readings when a database is configured,
/// otherwise an in-memory store over a static city list.
async fn build_storage(
    config: &Config,
) -> Result<(Arc<dyn EntityDirectory>, Arc<dyn ReadingStore>), AppError> {
    if let Some(database_url) = &config.database_url {
        let pool = store::create_pool(database_url).await?;
        info!("Using Postgres reading store");
        let directory: Arc<dyn EntityDirectory> = Arc::new(PgEntityDirectory::new(pool.clone()));
        let store: Arc<dyn ReadingStore> = Arc::new(PgReadingStore::new(pool));
        return Ok((directory, store));
    }

    let directory: Arc<dyn EntityDirectory> = match &config.cities_file {
        Some(path) => Arc::new(StaticDirectory::from_json_file(path).await?),
        None => {
            warn!("Neither DATABASE_URL nor CITIES_FILE set, directory is empty");
            Arc::new(StaticDirectory::default())
        }
    };
    info!("Using in-memory reading store");
    let store: Arc<dyn ReadingStore> = Arc::new(MemoryReadingStore::new(directory.clone()));

    Ok((directory, store))
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }

    // Abandon in-flight fetches and stop the refresh timer
    cancellation_token.cancel();
    warn!("Cancelled in-flight refreshes, shutting down gracefully...");
}
