use serde_json::Value;

use super::executor::SqlExecutor;
use super::guard::validate_identifier;
use super::manager::DatabaseError;
use super::query_builder::QueryBuilder;
use super::types::{Conditions, ExecResult, Payload, Row, SelectOptions, SqlResult};

const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

/// Table-agnostic CRUD bound to one `database.table` at a time.
///
/// Each call is its own unit of work on the pool: there is no transaction
/// spanning calls, and concurrent updates to the same row are
/// last-writer-wins.
pub struct DataAccess<E> {
    executor: E,
    database: String,
    table: Option<String>,
}

impl<E: SqlExecutor> DataAccess<E> {
    pub fn new(executor: E, database: impl Into<String>) -> Self {
        Self {
            executor,
            database: database.into(),
            table: None,
        }
    }

    pub fn for_table(executor: E, database: impl Into<String>, table: &str) -> Result<Self, DatabaseError> {
        let mut access = Self::new(executor, database);
        access.set_table(table)?;
        Ok(access)
    }

    /// Bind the handle to `table`; unqualified names are prefixed with the
    /// database this instance was created for.
    pub fn set_table(&mut self, table: &str) -> Result<&mut Self, DatabaseError> {
        validate_identifier(table)?;
        let qualified = if table.contains('.') {
            table.to_string()
        } else {
            format!("{}.{}", self.database, table)
        };
        self.table = Some(qualified);
        Ok(self)
    }

    pub fn get_table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn builder(&self) -> Result<QueryBuilder, DatabaseError> {
        let table = self.table.as_deref().ok_or(DatabaseError::TableNotSet)?;
        QueryBuilder::new(table)
    }

    /// Rows matching every condition, ordered per `options`. Never `None`:
    /// no match is an empty vec.
    pub async fn get(&self, conditions: &Conditions, options: &SelectOptions) -> Result<Vec<Row>, DatabaseError> {
        let statement = self.builder()?.select(conditions, options)?;
        self.executor
            .fetch_all(&statement)
            .await
            .map_err(DatabaseError::into_query_error)
    }

    /// `get` with default select list and ordering.
    pub async fn find(&self, conditions: &Conditions) -> Result<Vec<Row>, DatabaseError> {
        self.get(conditions, &SelectOptions::default()).await
    }

    /// First row under the requested ordering, fetched with `LIMIT 1`.
    pub async fn first(&self, conditions: &Conditions, options: &SelectOptions) -> Result<Option<Row>, DatabaseError> {
        let options = options.clone().limit(1);
        Ok(self.get(conditions, &options).await?.into_iter().next())
    }

    pub async fn get_404(&self, conditions: &Conditions) -> Result<Row, DatabaseError> {
        self.first(conditions, &SelectOptions::default())
            .await?
            .ok_or_else(|| DatabaseError::NotFound("Record not found".to_string()))
    }

    pub async fn count(&self, conditions: &Conditions) -> Result<i64, DatabaseError> {
        let statement = self.builder()?.count(conditions, None)?;
        let rows = self
            .executor
            .fetch_all(&statement)
            .await
            .map_err(DatabaseError::into_query_error)?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Insert one row, stamping `created_at`/`updated_at` when not supplied.
    /// Returns the generated key, or `None` when the table has none.
    /// Driver errors come back unchanged so unique violations can be matched.
    pub async fn insert(&self, payload: &Payload) -> Result<Option<u64>, DatabaseError> {
        let builder = self.builder()?;
        let mut payload = payload.clone();
        let now = timestamp_now();
        if !payload.has_value(CREATED_AT) {
            payload.insert(CREATED_AT, now.clone());
        }
        if !payload.has_value(UPDATED_AT) {
            payload.insert(UPDATED_AT, now);
        }

        let statement = builder.insert(&payload)?;
        let result = self.executor.execute(&statement).await?;
        Ok((result.last_insert_id > 0).then_some(result.last_insert_id))
    }

    pub async fn update(&self, payload: &Payload, id: u64) -> Result<ExecResult, DatabaseError> {
        let builder = self.builder()?;
        let statement = builder.update(&Self::touch(payload), id)?;
        self.run(&statement).await
    }

    pub async fn update_where(&self, payload: &Payload, conditions: &Conditions) -> Result<ExecResult, DatabaseError> {
        let builder = self.builder()?;
        let statement = builder.update_where(&Self::touch(payload), conditions)?;
        self.run(&statement).await
    }

    /// Delete the row with `id` that also matches every condition.
    pub async fn delete(&self, conditions: &Conditions, id: u64) -> Result<ExecResult, DatabaseError> {
        let statement = self.builder()?.delete(conditions, id)?;
        self.run(&statement).await
    }

    pub async fn delete_where(&self, conditions: &Conditions) -> Result<ExecResult, DatabaseError> {
        let statement = self.builder()?.delete_where(conditions)?;
        self.run(&statement).await
    }

    /// Escape hatch for joins, aggregates and non-equality predicates.
    ///
    /// `sql` is sent as-is with no fragment or identifier checks, after the
    /// session is reset to an empty `sql_mode` and switched to this
    /// instance's database. Callers must keep every caller-supplied value in
    /// `params` (bound to `?` placeholders in order) and never format it
    /// into `sql`. Does not need a table handle.
    pub async fn raw_query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DatabaseError> {
        let statement = SqlResult::new(sql, params);
        self.executor
            .fetch_all_in_session(&self.database, &statement)
            .await
            .map_err(DatabaseError::into_query_error)
    }

    fn touch(payload: &Payload) -> Payload {
        let mut payload = payload.clone();
        if !payload.has_value(UPDATED_AT) {
            payload.insert(UPDATED_AT, timestamp_now());
        }
        payload
    }

    async fn run(&self, statement: &SqlResult) -> Result<ExecResult, DatabaseError> {
        self.executor
            .execute(statement)
            .await
            .map_err(DatabaseError::into_query_error)
    }
}

/// Server-local wall clock in MySQL DATETIME format.
fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
