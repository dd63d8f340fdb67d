use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS accounts (
    uid TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    display_name TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS provider_sessions (
    id INTEGER PRIMARY KEY,
    uid TEXT NOT NULL,
    token TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    expires_at TIMESTAMP NOT NULL,
    FOREIGN KEY (uid) REFERENCES accounts (uid) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS users (
    uid TEXT PRIMARY KEY,
    email TEXT,
    display_name TEXT,
    is_admin BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS songs (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    song_key TEXT,
    youtube_link TEXT NOT NULL,
    sequence TEXT NOT NULL,
    sunday TEXT NOT NULL CHECK (sunday IN ('first', 'second', 'third', 'fourth', 'fifth')),
    created_at TIMESTAMP,
    updated_at TIMESTAMP,
    created_by TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_songs_created_at ON songs (created_at);

CREATE TABLE IF NOT EXISTS sunday_leaders (
    id TEXT PRIMARY KEY,
    sunday TEXT NOT NULL CHECK (sunday IN ('first', 'second', 'third', 'fourth', 'fifth')),
    leader_name TEXT NOT NULL,
    created_at TIMESTAMP,
    updated_at TIMESTAMP,
    created_by TEXT NOT NULL DEFAULT ''
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sunday_leaders_sunday ON sunday_leaders (sunday);
"#;

/// Applies the schema; every statement is idempotent so this runs on each boot.
#[instrument(skip(pool))]
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Applying database schema");
    sqlx::raw_sql(CURRENT_SCHEMA).execute(pool).await?;
    Ok(())
}
