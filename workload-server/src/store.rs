use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::Connection;
use thiserror::Error;
use tracing::{info, instrument};
use workload_common::retry::{RetryError, RetryPolicy};

use crate::config::PoolSettings;

/// Stand-in for "wait as long as it takes" when acquiring a pooled connection.
/// sqlx computes a deadline from the acquire timeout, so it has to stay finite.
const UNBOUNDED_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Arbitrary key for the advisory lock held while bootstrapping.
const BOOTSTRAP_LOCK_KEY: i64 = 0x776f_726b_6c6f_6164;

pub const SEED_PROFILES: [(i64, &str); 5] = [
    (1, "user1_profile_data_with_some_content"),
    (2, "user2_profile_data_with_different_content"),
    (3, "user3_profile_data_with_more_content"),
    (4, "user4_profile_data_with_additional_content"),
    (5, "user5_profile_data_with_extended_content"),
];

/// Enumeration of errors for operations with the profile store.
/// Errors originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed after {attempts} attempts with: {error}")]
    ConnectionError { attempts: u32, error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
}

/// The profile returned for ids without a backing row.
pub fn mock_profile(id: i64) -> String {
    format!("mock_profile_user_{}", id)
}

/// Point lookups of user profiles by id.
#[async_trait]
pub trait ProfileStore {
    /// Returns the stored profile, or `mock_profile(id)` when there is no row for `id`.
    async fn lookup(&self, id: i64) -> Result<String, StoreError>;
}

/// A profile store backed by a `users` table in PostgreSQL.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    /// Check the server accepts connections, retrying according to `retry_policy`, then
    /// build the pool. Exhausting the retries returns the last connection error.
    pub async fn connect(
        options: PgConnectOptions,
        settings: PoolSettings,
        retry_policy: RetryPolicy,
    ) -> Result<Self, StoreError> {
        let max_attempts = retry_policy.max_attempts();
        let connect_options = &options;

        retry_policy
            .retry(|attempt| async move {
                info!(
                    "connecting to profile store (attempt {}/{})",
                    attempt + 1,
                    max_attempts
                );
                metrics::counter!("workload_bootstrap_attempts_total").increment(1);
                let conn = PgConnection::connect_with(connect_options).await?;
                conn.close().await
            })
            .await
            .map_err(|error| match error {
                RetryError::Exhausted { attempts, last } => StoreError::ConnectionError {
                    attempts,
                    error: last,
                },
            })?;

        // The server answered, further connections are opened on demand up to the limit.
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(
                settings
                    .acquire_timeout
                    .unwrap_or(UNBOUNDED_ACQUIRE_TIMEOUT),
            )
            .max_lifetime(settings.max_lifetime)
            .connect_lazy_with(options);

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `users` table if needed and insert any missing seed rows.
    /// Rows already present are left untouched, so running this twice is harmless.
    /// Concurrent bootstraps against one database are serialized with an advisory lock.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        let query_error = |command: &str| {
            let command = command.to_owned();
            move |error| StoreError::QueryError { command, error }
        };

        let mut tx = self.pool.begin().await.map_err(query_error("BEGIN"))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(query_error("LOCK"))?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGINT PRIMARY KEY,
    profile_data VARCHAR(255) NOT NULL
)
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(query_error("CREATE TABLE"))?;

        let mut inserted = 0;
        for (id, profile) in SEED_PROFILES {
            let result = sqlx::query(
                "INSERT INTO users (id, profile_data) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
            )
            .bind(id)
            .bind(profile)
            .execute(&mut *tx)
            .await
            .map_err(query_error("INSERT"))?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(query_error("COMMIT"))?;

        info!(
            "profile store initialized, {} of {} seed rows inserted",
            inserted,
            SEED_PROFILES.len()
        );

        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    #[instrument(skip(self))]
    async fn lookup(&self, id: i64) -> Result<String, StoreError> {
        // The pooled connection is returned when the query future completes or is dropped.
        let row: Option<String> =
            sqlx::query_scalar("SELECT profile_data FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|error| {
                    metrics::counter!("workload_profile_lookups_total", "outcome" => "error")
                        .increment(1);
                    StoreError::QueryError {
                        command: "SELECT".to_owned(),
                        error,
                    }
                })?;

        match row {
            Some(profile) => {
                metrics::counter!("workload_profile_lookups_total", "outcome" => "hit")
                    .increment(1);
                Ok(profile)
            }
            None => {
                metrics::counter!("workload_profile_lookups_total", "outcome" => "fallback")
                    .increment(1);
                Ok(mock_profile(id))
            }
        }
    }
}
