use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` runs against the in-memory demo store.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub data_call_timeout: Duration,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let session_ttl_hours = lookup("SESSION_TTL_HOURS")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);
        let data_call_timeout_ms = lookup("DATA_CALL_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(10_000);
        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(5);

        Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            data_call_timeout: Duration::from_millis(data_call_timeout_ms),
            db_max_connections,
        }
    }
}
