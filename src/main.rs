mod app;
mod auth;
mod config;
mod db;
mod error;
mod pages;
mod state;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "notekeep=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // Startup order: config, pool, schema, then accept requests.
    let config = AppConfig::from_env()?;
    auth::services::prepare_dummy_hash()?;
    let db = db::connect(&config).await?;
    db::migrate(&db).await?;

    let state = AppState::new(db, &config);
    let app = app::build_app(state);
    app::serve(app, &config).await
}
