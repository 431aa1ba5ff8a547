use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    /// No URL means the process runs on the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 50,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl Config {
    /// Reads settings from the environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => defaults.db_max_connections,
        };

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("BIND_ADDR is not a socket address: {raw}"))?,
            None => defaults.bind_addr,
        };

        let cache_ttl = match lookup("CACHE_TTL_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("CACHE_TTL_SECS is not a number: {raw}"))?,
            ),
            None => defaults.cache_ttl,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            bind_addr,
            cache_ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(config.bind_addr.port(), 3001);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://db/djvote"),
            ("CACHE_TTL_SECS", "60"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgresql://db/djvote"));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(Config::from_lookup(lookup(&[("CACHE_TTL_SECS", "soon")])).is_err());
    }
}
