//! Environment configuration
//!
//! Read once at startup after `.env` has been loaded.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redb,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Path of the redb database file
    pub database_url: String,
    pub store_backend: StoreBackend,
    /// Prefix of every display short URL
    pub base_url: String,
    pub mirror_path: String,
    pub mirror_enabled: bool,
    pub file_sync_interval: Duration,
    pub store_sync_interval: Duration,
}

impl Config {
    /// # Environment Variables
    ///
    /// - `PORT` - Server port number (default: 8080)
    /// - `DATABASE_URL` - Path to database file (default: "data.db")
    /// - `STORE_BACKEND` - `redb` or `memory` (default: redb)
    /// - `BASE_URL` - Short link prefix (default: "http://localhost:{PORT}")
    /// - `MIRROR_PATH` - Mirror file (default: "urls.json")
    /// - `MIRROR_ENABLED` - Run the synchronizer (default: true)
    /// - `FILE_SYNC_INTERVAL_SECS` - File to store interval (default: 10)
    /// - `STORE_SYNC_INTERVAL_SECS` - Store to file interval (default: 15)
    pub fn from_env() -> Self {
        let port = parse_or("PORT", 8080u16);
        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("redb") | Err(_) => StoreBackend::Redb,
            Ok(other) => {
                warn!("Unknown STORE_BACKEND {:?}, using redb", other);
                StoreBackend::Redb
            }
        };

        Self {
            port,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "data.db".to_string()),
            store_backend,
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            mirror_path: env::var("MIRROR_PATH").unwrap_or_else(|_| "urls.json".to_string()),
            mirror_enabled: parse_or("MIRROR_ENABLED", true),
            file_sync_interval: Duration::from_secs(parse_or("FILE_SYNC_INTERVAL_SECS", 10)),
            store_sync_interval: Duration::from_secs(parse_or("STORE_SYNC_INTERVAL_SECS", 15)),
        }
    }
}

fn parse_or<T: FromStr + std::fmt::Debug>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
