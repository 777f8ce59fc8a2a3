use serde_json::Value;

use super::guard::{check_raw_fragment, validate_identifier};
use super::manager::DatabaseError;
use super::types::{Conditions, Payload, SelectOptions, SqlResult};

/// Backtick-quote an already validated identifier, one segment per dot.
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|segment| format!("`{}`", segment))
        .collect::<Vec<_>>()
        .join(".")
}

/// Builds parameterized statements for a single table.
///
/// Every value goes into the bind sequence as a `?` placeholder, in the
/// order the payload or conditions were iterated. Column names are checked
/// against the identifier allowlist before they are written into the text.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>) -> Result<Self, DatabaseError> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    pub fn select(&self, conditions: &Conditions, options: &SelectOptions) -> Result<SqlResult, DatabaseError> {
        check_raw_fragment(&options.select)?;
        validate_identifier(&options.order_by)?;
        let (where_clause, mut params) = Self::where_clause(conditions, options.where_raw.as_deref())?;

        let mut query = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} {}",
            options.select,
            quote_identifier(&self.table),
            where_clause,
            quote_identifier(&options.order_by),
            options.direction.to_sql()
        );
        if let Some(limit) = options.limit {
            query.push_str(" LIMIT ?");
            params.push(Value::from(limit));
        }
        Ok(SqlResult { query, params })
    }

    pub fn count(&self, conditions: &Conditions, where_raw: Option<&str>) -> Result<SqlResult, DatabaseError> {
        let (where_clause, params) = Self::where_clause(conditions, where_raw)?;
        let query = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE {}",
            quote_identifier(&self.table),
            where_clause
        );
        Ok(SqlResult { query, params })
    }

    pub fn insert(&self, payload: &Payload) -> Result<SqlResult, DatabaseError> {
        let mut columns = Vec::new();
        let mut params = Vec::new();
        for (column, value) in payload.defined() {
            validate_identifier(column)?;
            columns.push(quote_identifier(column));
            params.push(value.clone());
        }
        let placeholders = vec!["?"; columns.len()].join(", ");

        let query = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&self.table),
            columns.join(", "),
            placeholders
        );
        Ok(SqlResult { query, params })
    }

    /// `UPDATE … WHERE id = ?`, with the id bound like every other value.
    pub fn update(&self, payload: &Payload, id: u64) -> Result<SqlResult, DatabaseError> {
        let (set_clause, mut params) = Self::set_clause(payload, false)?;
        params.push(Value::from(id));
        let query = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_identifier(&self.table),
            set_clause,
            quote_identifier("id")
        );
        Ok(SqlResult { query, params })
    }

    /// Composite payload values are written as JSON text so they can land in
    /// TEXT/JSON columns.
    pub fn update_where(&self, payload: &Payload, conditions: &Conditions) -> Result<SqlResult, DatabaseError> {
        if conditions.is_empty() {
            return Err(DatabaseError::EmptyCondition("update"));
        }
        let (set_clause, mut params) = Self::set_clause(payload, true)?;
        let (where_clause, where_params) = Self::where_clause(conditions, None)?;
        params.extend(where_params);

        let query = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_identifier(&self.table),
            set_clause,
            where_clause
        );
        Ok(SqlResult { query, params })
    }

    pub fn delete(&self, conditions: &Conditions, id: u64) -> Result<SqlResult, DatabaseError> {
        let mut terms = vec![format!("{} = ?", quote_identifier("id"))];
        let mut params = vec![Value::from(id)];
        for (column, value) in conditions.iter() {
            validate_identifier(column)?;
            terms.push(format!("{} = ?", quote_identifier(column)));
            params.push(value.clone());
        }

        let query = format!(
            "DELETE FROM {} WHERE {}",
            quote_identifier(&self.table),
            terms.join(" AND ")
        );
        Ok(SqlResult { query, params })
    }

    pub fn delete_where(&self, conditions: &Conditions) -> Result<SqlResult, DatabaseError> {
        if conditions.is_empty() {
            return Err(DatabaseError::EmptyCondition("delete"));
        }
        let (where_clause, params) = Self::where_clause(conditions, None)?;
        let query = format!("DELETE FROM {} WHERE {}", quote_identifier(&self.table), where_clause);
        Ok(SqlResult { query, params })
    }

    fn set_clause(payload: &Payload, encode_composites: bool) -> Result<(String, Vec<Value>), DatabaseError> {
        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (column, value) in payload.defined() {
            validate_identifier(column)?;
            assignments.push(format!("{} = ?", quote_identifier(column)));
            let value = match value {
                Value::Array(_) | Value::Object(_) if encode_composites => Value::String(value.to_string()),
                _ => value.clone(),
            };
            params.push(value);
        }
        Ok((assignments.join(", "), params))
    }

    /// Equality terms for each condition, then the raw fragment if any.
    /// With neither, the clause is the always-true `1`.
    fn where_clause(conditions: &Conditions, where_raw: Option<&str>) -> Result<(String, Vec<Value>), DatabaseError> {
        let mut terms = Vec::with_capacity(conditions.len() + 1);
        let mut params = Vec::with_capacity(conditions.len());

        for (column, value) in conditions.iter() {
            validate_identifier(column)?;
            terms.push(format!("{} = ?", quote_identifier(column)));
            params.push(value.clone());
        }
        if terms.is_empty() {
            terms.push("1".to_string());
        }
        if let Some(fragment) = where_raw {
            check_raw_fragment(fragment)?;
            terms.push(format!("({})", fragment));
        }
        Ok((terms.join(" AND "), params))
    }
}
