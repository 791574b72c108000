//! Ops binary wiring the cache manager and connection pool into a minimal
//! `axum` surface: health checks and stats, nothing else (§6). Routing,
//! templating, and session handling belong to the embedding application.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use tracing::{info, warn};

use dirserve_core::cache::CacheManager;
use dirserve_core::config::{AppConfig, CliArgs};
use dirserve_core::directory::client::DirectoryClientFactory;
use dirserve_core::pool::ConnectionPool;

#[cfg(not(feature = "testing"))]
compile_error!(
    "dirserve-server has no wire-level directory client built in (out of scope, see module docs); \
     build with `--features testing` to run it against the in-memory directory for local demos."
);

struct AppState {
    pool: Arc<ConnectionPool>,
    cache: Arc<CacheManager>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let args = CliArgs::parse();
    let config = AppConfig::load(&args)?;

    info!(
        server = %config.directory.server,
        base_dn = %config.directory.base_dn,
        max_connections = config.pool.max_connections,
        "starting dirserve-server"
    );

    let factory = demo_factory();

    let pool = ConnectionPool::new(config.pool.clone(), factory.clone())?;
    pool.warm_up().await;
    pool.spawn_maintenance();

    let cache = CacheManager::with_default_period();
    let warm_conn = pool
        .acquire(&config.directory.readonly_user, &config.directory.readonly_password)
        .await?;
    cache.warm_up(warm_conn.client()).await?;
    drop(warm_conn);

    let readonly_client = factory
        .with_credentials(&config.directory.readonly_user, &config.directory.readonly_password)
        .await?;
    cache.spawn_refresh_loop(readonly_client);

    let state = Arc::new(AppState {
        pool: Arc::clone(&pool),
        cache: Arc::clone(&cache),
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/stats/pool", get(pool_stats))
        .route("/stats/cache", get(cache_stats))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!(addr = "0.0.0.0:8080", "ops surface listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        warn!("shutdown signal received");
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    cache.stop();
    pool.close().await;

    Ok(())
}

#[cfg(feature = "testing")]
fn demo_factory() -> Arc<dirserve_core::directory::mock::MockDirectoryClientFactory> {
    use dirserve_core::directory::mock::{MockDirectoryClientFactory, MockDirectoryState};
    use parking_lot::RwLock;

    Arc::new(MockDirectoryClientFactory::new(Arc::new(RwLock::new(
        MockDirectoryState::default(),
    ))))
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    use dirserve_core::metrics::HealthStatus;
    use dirserve_core::pool::PoolHealth;

    let cache_ready = state.cache.metrics().health_status() != HealthStatus::Unhealthy;
    let pool_ready = state.pool.health() != PoolHealth::Unhealthy;

    if cache_ready && pool_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn pool_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pool.stats())
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cache.metrics().snapshot())
}
