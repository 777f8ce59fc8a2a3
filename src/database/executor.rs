use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::manager::DatabaseError;
use super::query_builder::quote_identifier;
use super::types::{ExecResult, Row, SqlResult};

/// Runs generated statements. The data access core only talks to this
/// trait, so tests can swap the pool for a recording double.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn fetch_all(&self, statement: &SqlResult) -> Result<Vec<Row>, DatabaseError>;

    async fn execute(&self, statement: &SqlResult) -> Result<ExecResult, DatabaseError>;

    /// Resets `sql_mode`, selects `database`, then runs `statement` on that
    /// same connection.
    async fn fetch_all_in_session(&self, database: &str, statement: &SqlResult) -> Result<Vec<Row>, DatabaseError>;
}

#[async_trait]
impl<T: SqlExecutor + ?Sized> SqlExecutor for Arc<T> {
    async fn fetch_all(&self, statement: &SqlResult) -> Result<Vec<Row>, DatabaseError> {
        (**self).fetch_all(statement).await
    }

    async fn execute(&self, statement: &SqlResult) -> Result<ExecResult, DatabaseError> {
        (**self).execute(statement).await
    }

    async fn fetch_all_in_session(&self, database: &str, statement: &SqlResult) -> Result<Vec<Row>, DatabaseError> {
        (**self).fetch_all_in_session(database, statement).await
    }
}

/// Executor backed by the shared MySQL pool.
#[derive(Clone, Debug)]
pub struct MySqlExecutor {
    pool: MySqlPool,
    log_queries: bool,
    slow_query_threshold: Option<Duration>,
}

impl MySqlExecutor {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            log_queries: false,
            slow_query_threshold: None,
        }
    }

    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    fn before(&self, statement: &SqlResult) -> Instant {
        if self.log_queries {
            tracing::debug!(params = statement.params.len(), "SQL: {}", statement.query);
        }
        Instant::now()
    }

    fn after(&self, statement: &SqlResult, started: Instant) {
        let elapsed = started.elapsed();
        if let Some(threshold) = self.slow_query_threshold {
            if elapsed > threshold {
                tracing::warn!("Slow query ({}ms): {}", elapsed.as_millis(), statement.query);
            }
        }
    }
}

#[async_trait]
impl SqlExecutor for MySqlExecutor {
    async fn fetch_all(&self, statement: &SqlResult) -> Result<Vec<Row>, DatabaseError> {
        let started = self.before(statement);
        let rows = bind_params(sqlx::query(&statement.query), &statement.params)
            .fetch_all(&self.pool)
            .await?;
        self.after(statement, started);
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(&self, statement: &SqlResult) -> Result<ExecResult, DatabaseError> {
        let started = self.before(statement);
        let result = bind_params(sqlx::query(&statement.query), &statement.params)
            .execute(&self.pool)
            .await?;
        self.after(statement, started);
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        })
    }

    async fn fetch_all_in_session(&self, database: &str, statement: &SqlResult) -> Result<Vec<Row>, DatabaseError> {
        super::guard::validate_identifier(database)?;
        let mut conn = self.pool.acquire().await?;

        // Session preamble goes over the text protocol; USE cannot be prepared.
        // The sql_mode change stays on this pooled connection after release.
        sqlx::Executor::execute(&mut *conn, "SET SESSION sql_mode=''").await?;
        let use_database = format!("USE {}", quote_identifier(database));
        sqlx::Executor::execute(&mut *conn, use_database.as_str()).await?;

        let started = self.before(statement);
        let rows = bind_params(sqlx::query(&statement.query), &statement.params)
            .fetch_all(&mut *conn)
            .await?;
        self.after(statement, started);
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn bind_params<'q>(
    mut q: Query<'q, MySql, MySqlArguments>,
    params: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for p in params {
        q = bind_param(q, p);
    }
    q
}

fn bind_param<'q>(q: Query<'q, MySql, MySqlArguments>, v: &'q Value) -> Query<'q, MySql, MySqlArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                q.bind(u)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        // Composite values travel as JSON text
        Value::Array(_) | Value::Object(_) => q.bind(v.to_string()),
    }
}

fn row_to_json(row: &MySqlRow) -> Row {
    let mut map = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, i, column.type_info().name()));
    }
    map
}

fn column_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match type_name {
        "NULL" => Value::Null,
        "BOOLEAN" => opt(row.try_get::<Option<bool>, _>(index), Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            opt(row.try_get::<Option<i64>, _>(index), |n| Value::Number(n.into()))
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED" | "BIGINT UNSIGNED" => {
            opt(row.try_get::<Option<u64>, _>(index), |n| Value::Number(n.into()))
        }
        "FLOAT" | "DOUBLE" => opt(row.try_get::<Option<f64>, _>(index), |f| {
            serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }),
        "DECIMAL" => opt(row.try_get::<Option<bigdecimal::BigDecimal>, _>(index), |d| {
            Value::String(d.to_string())
        }),
        "DATETIME" => opt(row.try_get::<Option<chrono::NaiveDateTime>, _>(index), |t| {
            Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string())
        }),
        "TIMESTAMP" => opt(row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index), |t| {
            Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string())
        }),
        "DATE" => opt(row.try_get::<Option<chrono::NaiveDate>, _>(index), |d| Value::String(d.to_string())),
        "TIME" => opt(row.try_get::<Option<chrono::NaiveTime>, _>(index), |t| Value::String(t.to_string())),
        "JSON" => row
            .try_get::<Option<Value>, _>(index)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        _ => {
            // VARCHAR/CHAR/TEXT/ENUM/SET decode as strings; binary falls back to lossy UTF-8
            if let Ok(s) = row.try_get::<Option<String>, _>(index) {
                s.map(Value::String).unwrap_or(Value::Null)
            } else if let Ok(bytes) = row.try_get::<Option<Vec<u8>>, _>(index) {
                bytes
                    .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned()))
                    .unwrap_or(Value::Null)
            } else {
                tracing::warn!("Unhandled MySQL type: {}, returning null", type_name);
                Value::Null
            }
        }
    }
}

fn opt<T>(decoded: Result<Option<T>, sqlx::Error>, f: impl FnOnce(T) -> Value) -> Value {
    match decoded {
        Ok(Some(v)) => f(v),
        Ok(None) => Value::Null,
        Err(e) => {
            tracing::warn!("Column decode failed: {}", e);
            Value::Null
        }
    }
}
