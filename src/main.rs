use std::sync::Arc;

use pharmadesk::{
    config::Config,
    data::{DataClient, MemoryDataClient, PgDataClient, TimeoutClient},
    db,
    models::AppState,
    routes,
    session::SessionStore,
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;

    let client: Arc<dyn DataClient> = match cfg.database_url.as_deref() {
        Some(url) => {
            let pool = db::connect_pg(url, cfg.db_max_connections).await?;
            tracing::info!(max_connections = cfg.db_max_connections, "connected to postgres");
            Arc::new(TimeoutClient::new(PgDataClient::new(pool), cfg.data_call_timeout))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, serving the in-memory demo store");
            Arc::new(TimeoutClient::new(MemoryDataClient::demo(), cfg.data_call_timeout))
        }
    };

    let state = AppState {
        client,
        sessions: SessionStore::new(),
        session_ttl_hours: cfg.session_ttl_hours,
    };

    // Browser desk clients call the API cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
