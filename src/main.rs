#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod database;
mod db;
mod env;
mod error;
mod format;
mod models;
mod store;
mod sync;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;
mod view;

use anyhow::Context;
use api::{
    api_add_song, api_admin_login, api_delete_song, api_lineup, api_lineup_events, api_login,
    api_logout, api_me, api_register, api_store_health, api_update_song, api_upsert_leader,
    health,
};
use auth::{IdentityProvider, unauthorized_api};
use database::init_schema;
use env::{AppConfig, load_environment, log_environment};
use error::AppError;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use store::DocumentStore;
use sync::Lineup;
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::{error, info, warn};

const SESSION_CLEANUP_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

#[launch]
async fn rocket() -> _ {
    let env_loaded = load_environment();
    init_tracing();

    match env_loaded {
        Ok(files) => log_environment(&files),
        Err(e) => warn!("Failed to load environment files: {}", e),
    }

    match build().await {
        Ok(rocket) => rocket,
        Err(e) => {
            error!("Startup failed: {}", e);
            shutdown_telemetry();
            std::process::exit(1);
        }
    }
}

async fn build() -> Result<Rocket<Build>, Error> {
    let config = AppConfig::from_env()?;

    let pool = SqlitePool::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to connect to {}", config.database_url))?;

    info!("Applying database schema...");
    init_schema(&pool).await?;

    let provider = IdentityProvider::new(pool.clone());
    let cleanup = provider.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match cleanup.clean_expired_sessions().await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS))
                .await;
        }
    });

    init_rocket(pool, config, provider).await
}

pub async fn init_rocket(
    pool: SqlitePool,
    config: AppConfig,
    provider: IdentityProvider,
) -> Result<Rocket<Build>, Error> {
    info!("Starting song lineup");

    let store = DocumentStore::new(pool);
    let lineup = Lineup::mount(store.clone()).await?;

    Ok(rocket::build()
        .manage(config)
        .manage(provider)
        .manage(store)
        .manage(lineup)
        .mount(
            "/api",
            routes![
                api_login,
                api_admin_login,
                api_register,
                api_logout,
                api_me,
                api_lineup,
                api_lineup_events,
                api_add_song,
                api_update_song,
                api_delete_song,
                api_upsert_leader,
                api_store_health,
            ],
        )
        .register("/api", catchers![unauthorized_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async { shutdown_telemetry() })
        })))
}
