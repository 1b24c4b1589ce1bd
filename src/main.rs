use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod kv;
mod routes;
mod services;

use config::Config;
use kv::KvStore;
use services::{init, providers::ProviderRegistry};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub kv: KvStore,
    pub registry: Arc<ProviderRegistry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notification_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting notification dispatch engine");

    let pool = init::init_db(&config).await?;
    let kv = KvStore::connect(&config.redis.addr, config.redis.password.as_deref()).await?;
    let registry = Arc::new(init::build_provider_registry(&config));

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        kv,
        registry,
    });

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let worker_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/v1/notifications", routes::notifications::router())
        .nest("/api/v1/dlq", routes::dlq::router())
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                    Method::PATCH,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT]),
        );

    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{}:{}", host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let shutdown_signal = {
        let shutdown_tx = shutdown_tx.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, notifying background loops");
            let _ = shutdown_tx.send(());
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    for handle in worker_handles {
        let _ = handle.await;
    }

    Ok(())
}
