use std::env;
use std::fmt::Display;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {key} value '{value}': {message}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// PostgreSQL connection string. Without one, polls live in memory.
    pub database_url: Option<String>,
    pub visitor_state: PathBuf,
    pub static_dir: PathBuf,
    pub notify_interval: Duration,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn load() -> Result<Config, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => info!("Ignoring .env: {err}"),
        }
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        Ok(Config {
            bind_addr: try_load(&lookup, "BIND_ADDR", "127.0.0.1")?,
            port: try_load(&lookup, "PORT", "3000")?,
            database_url,
            visitor_state: try_load(&lookup, "VISITOR_STATE", ".pollshare/visitor.json")?,
            static_dir: try_load(&lookup, "STATIC_DIR", "static")?,
            notify_interval: Duration::from_millis(try_load(&lookup, "NOTIFY_POLL_MS", "250")?),
        })
    }
}

fn try_load<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        debug!("{key} not set, using default: {default}");
        default.to_string()
    });
    value.parse().map_err(|err: T::Err| ConfigError {
        key,
        message: err.to_string(),
        value,
    })
}
