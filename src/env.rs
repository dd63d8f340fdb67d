use std::path::Path;

use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://lineup.db?mode=rwc";

/// What happened to one env file during [`load_environment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(&'static str),
    Missing(&'static str),
}

/// Layers the env files for the active profile. Runs before tracing is
/// installed, so it reports per-file outcomes instead of logging them.
pub fn load_environment() -> Result<Vec<EnvFile>, dotenvy::Error> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        ["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        ["config/common.env", "config/dev.env", ".secrets.env"]
    };

    env_files.into_iter().map(load_env_file).collect()
}

fn load_env_file(path: &'static str) -> Result<EnvFile, dotenvy::Error> {
    if !Path::new(path).exists() {
        return Ok(EnvFile::Missing(path));
    }

    dotenvy::from_filename_override(path)?;
    Ok(EnvFile::Loaded(path))
}

pub fn log_environment(files: &[EnvFile]) {
    for file in files {
        match file {
            EnvFile::Loaded(path) => info!("Loaded environment from: {}", path),
            EnvFile::Missing(path) => {
                warn!("Environment file {} not found, skipping", path)
            }
        }
    }
}

/// The fixed credential pair for the admin bypass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub admin: AdminCredentials,
    pub database_url: String,
}

impl AppConfig {
    /// Reads configuration from the process environment.
    ///
    /// Both admin variables must be present and non-empty; the app refuses to
    /// start without them.
    pub fn from_env() -> Result<Self, AppError> {
        let username = non_empty_var("ADMIN_USERNAME");
        let password = non_empty_var("ADMIN_PASSWORD");

        let (username, password) = match (username, password) {
            (Some(username), Some(password)) => (username, password),
            _ => {
                return Err(AppError::Configuration(
                    "Admin credentials not configured. Please set ADMIN_USERNAME and ADMIN_PASSWORD in your environment variables.".to_string(),
                ));
            }
        };

        let database_url =
            non_empty_var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        Ok(Self {
            admin: AdminCredentials { username, password },
            database_url,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    dotenvy::var(name).ok().filter(|v| !v.trim().is_empty())
}
