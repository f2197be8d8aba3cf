mod api;
mod cache;
mod middleware;
mod scheduler;

use std::sync::Arc;

use casadigital_sync::SyncSettings;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    cache::ResponseCache,
    middleware::{AuthState, RateLimitState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = casadigital_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = casadigital_db::PoolConfig::from_app_config(&config);
    let pool = casadigital_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = casadigital_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    if config.affiliates.is_empty() {
        tracing::warn!("no affiliate ids configured; product links will not be rewritten");
    }

    let settings = Arc::new(SyncSettings::from_app_config(&config));
    let _scheduler = scheduler::build_scheduler(
        pool.clone(),
        Arc::clone(&settings),
        config.catalog_path.clone(),
    )
    .await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        casadigital_core::Environment::Development
    ))?;
    let state = AppState {
        pool,
        sync: settings,
        cache: ResponseCache::new(config.cache_ttl_secs, config.cache_max_entries),
    };
    let app = build_app(
        state,
        auth,
        RateLimitState::from_config(&config),
        &config.cors_origins,
    );

    tracing::info!(addr = %config.bind_addr, env = %config.env, "casadigital-server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
