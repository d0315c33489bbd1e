mod auth;
mod config;
mod db;
mod entities;
mod error;
mod extract;
mod models;
mod resources;
mod routes;
mod store;
#[cfg(test)]
mod testutils;
mod validation;

use std::sync::Arc;

use crate::{config::Config, store::Store};

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,afisha=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store = Store::new(db, config.page_size);

    let state = Arc::new(AppState { config: config.clone(), store });
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
