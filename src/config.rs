use std::env;

use clap::ValueEnum;

use crate::rate_limit::{DEFAULT_RATE_MAX, DEFAULT_RATE_WINDOW_SECS};

/// Which authorization store backend to run against. Both are behaviorally
/// identical; the file backend suits ephemeral-filesystem deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    Sqlite,
    File,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Shared admin token. Empty leaves the admin surface locked (401).
    pub admin_token: String,
    /// HMAC secret shared with the key generator.
    pub license_secret: String,
    pub storage: StorageKind,
    pub database_path: String,
    pub data_file: String,
    pub rate_limit_max: usize,
    pub rate_limit_window_secs: i64,
    pub allow_self_register: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5000);

        let storage = match env::var("STORAGE").as_deref() {
            Ok("file") => StorageKind::File,
            _ => StorageKind::Sqlite,
        };

        let allow_self_register = env::var("ALLOW_SELF_REGISTER")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            host,
            port,
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_default(),
            license_secret: env::var("LICENSE_SECRET").unwrap_or_default(),
            storage,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "keywarden.db".to_string()),
            data_file: env::var("DATA_FILE").unwrap_or_else(|_| "keys_data.json".to_string()),
            rate_limit_max: env::var("RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RATE_MAX),
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RATE_WINDOW_SECS),
            allow_self_register,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
