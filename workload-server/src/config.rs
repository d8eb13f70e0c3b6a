use std::net::SocketAddr;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use sqlx::postgres::PgConnectOptions;
use workload_common::retry::RetryPolicy;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "0.0.0.0:3000")]
    pub address: SocketAddr,

    #[envconfig(default = "localhost")]
    pub db_host: String,

    #[envconfig(default = "5432")]
    pub db_port: u16,

    #[envconfig(default = "postgres")]
    pub db_user: String,

    #[envconfig(default = "abcd")]
    pub db_password: String,

    #[envconfig(default = "performance_test")]
    pub db_name: String,

    #[envconfig(default = "10")]
    pub max_pg_connections: u32,

    /// Unset means callers wait for a pooled connection as long as it takes.
    pub acquire_timeout_ms: Option<EnvMsDuration>,

    #[envconfig(default = "300")]
    pub connection_max_lifetime_secs: u64,

    #[envconfig(nested = true)]
    pub bootstrap: BootstrapConfig,

    #[envconfig(default = "30000")]
    pub request_timeout_ms: EnvMsDuration,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

#[derive(Envconfig, Clone)]
pub struct BootstrapConfig {
    #[envconfig(from = "BOOTSTRAP_MAX_ATTEMPTS", default = "5")]
    pub max_attempts: u32,

    #[envconfig(from = "BOOTSTRAP_RETRY_INTERVAL_MS", default = "5000")]
    pub retry_interval: EnvMsDuration,
}

impl Config {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .username(&self.db_user)
            .password(&self.db_password)
            .database(&self.db_name)
    }

    /// Policy applied to establishing the connection pool at startup.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.bootstrap.max_attempts, self.bootstrap.retry_interval.0)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_pg_connections,
            acquire_timeout: self.acquire_timeout_ms.map(|timeout| timeout.0),
            max_lifetime: time::Duration::from_secs(self.connection_max_lifetime_secs),
        }
    }
}

/// Sizing and lifetime settings for the profile store's connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Option<time::Duration>,
    pub max_lifetime: time::Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: None,
            max_lifetime: time::Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
