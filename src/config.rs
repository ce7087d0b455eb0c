use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, anyhow};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub feed_capacity: usize,
}

impl Config {
    /// Reads `.env` first, then the process environment.
    pub fn from_env() -> anyhow::Result<Config> {
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let database_url = lookup("DATABASE_URL").ok_or(anyhow!("DATABASE_URL is not set"))?;
        Ok(Config {
            database_url,
            bind_addr: parse_or(&lookup, "BIND_ADDR", "0.0.0.0:8080")?,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", "16")?,
            feed_capacity: parse_or(&lookup, "FEED_CAPACITY", "256")?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_owned());
    raw.parse().with_context(|| format!("{key}={raw}"))
}
