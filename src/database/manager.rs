use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

use super::access::DataAccess;
use super::executor::MySqlExecutor;

/// Errors from the data access layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid field name: {0}")]
    InvalidFieldName(String),

    #[error("Possible SQL injection in fragment: {0}")]
    InjectionSuspected(String),

    #[error("No table selected")]
    TableNotSet,

    #[error("Refusing to {0} without a condition")]
    EmptyCondition(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Input rejected before any SQL was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DatabaseError::InvalidFieldName(_)
                | DatabaseError::InjectionSuspected(_)
                | DatabaseError::TableNotSet
                | DatabaseError::EmptyCondition(_)
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// The pool could not hand out a connection.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlx(sqlx::Error::PoolTimedOut)
                | DatabaseError::Sqlx(sqlx::Error::PoolClosed)
                | DatabaseError::Sqlx(sqlx::Error::Io(_))
        )
    }

    /// Collapse driver query failures into `QueryError`, keeping the message.
    /// Validation and pool-availability errors pass through untouched.
    pub fn into_query_error(self) -> Self {
        if self.is_unavailable() {
            return self;
        }
        match self {
            DatabaseError::Sqlx(e) => DatabaseError::QueryError(e.to_string()),
            other => other,
        }
    }
}

/// Hands out the process-wide MySQL pool, creating it on first use.
///
/// Cloning is cheap; every clone shares the same pool.
#[derive(Clone)]
pub struct ConnectionProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    config: DatabaseConfig,
    pool: OnceLock<MySqlPool>,
}

impl ConnectionProvider {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                config,
                pool: OnceLock::new(),
            }),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn database_name(&self) -> &str {
        &self.inner.config.name
    }

    /// Existing pool, or a new lazily-connecting one. Connections are opened
    /// on demand, up to the configured maximum.
    pub fn get_connection(&self) -> Result<MySqlPool, DatabaseError> {
        if let Some(pool) = self.inner.pool.get() {
            return Ok(pool.clone());
        }

        let pool = Self::build_pool(&self.inner.config)?;
        // A concurrent caller may have won; its pool is kept and ours dropped
        let _ = self.inner.pool.set(pool);
        info!(
            "Created database pool for {}@{}:{}/{}",
            self.inner.config.user, self.inner.config.host, self.inner.config.port, self.inner.config.name
        );
        self.inner
            .pool
            .get()
            .cloned()
            .ok_or(DatabaseError::ConfigMissing("database pool"))
    }

    fn build_pool(config: &DatabaseConfig) -> Result<MySqlPool, DatabaseError> {
        let options = Self::connect_options(config)?;
        Ok(MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .idle_timeout(config.idle_timeout())
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy_with(options))
    }

    fn connect_options(config: &DatabaseConfig) -> Result<MySqlConnectOptions, DatabaseError> {
        if config.host.is_empty() {
            return Err(DatabaseError::ConfigMissing("DB_HOST"));
        }
        if config.user.is_empty() {
            return Err(DatabaseError::ConfigMissing("DB_USER"));
        }
        if config.name.is_empty() {
            return Err(DatabaseError::ConfigMissing("DB_NAME"));
        }
        super::guard::validate_identifier(&config.name)?;

        Ok(MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .timezone(Some(String::from("+00:00"))))
    }

    pub fn executor(&self) -> Result<MySqlExecutor, DatabaseError> {
        let pool = self.get_connection()?;
        Ok(MySqlExecutor::new(pool)
            .with_query_logging(self.inner.config.enable_query_logging)
            .with_slow_query_threshold(self.inner.config.slow_query_threshold()))
    }

    /// A data access core with no table bound yet.
    pub fn data_access(&self) -> Result<DataAccess<MySqlExecutor>, DatabaseError> {
        Ok(DataAccess::new(self.executor()?, self.database_name()))
    }

    /// A data access core bound to `table` in the configured database.
    pub fn table(&self, table: &str) -> Result<DataAccess<MySqlExecutor>, DatabaseError> {
        DataAccess::for_table(self.executor()?, self.database_name(), table)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        let pool = self.get_connection()?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Close the pool if it was ever created (e.g., on shutdown)
    pub async fn close(&self) {
        if let Some(pool) = self.inner.pool.get() {
            pool.close().await;
            info!("Closed database pool: {}", self.inner.config.name);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.pool.get().is_some()
    }
}
