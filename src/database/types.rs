use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// One result row, column name to JSON value, in select-list order.
pub type Row = Map<String, Value>;

/// A generated statement: SQL text plus its positional bind sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}

impl SqlResult {
    pub fn new(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self { query: query.into(), params }
    }
}

/// What the driver reports back for INSERT/UPDATE/DELETE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

/// Ordered column -> value mapping used for INSERT and UPDATE.
///
/// A column can be present but *unset*: it is carried along (so callers can
/// build payloads from optional inputs without branching) yet never reaches
/// the generated SQL or the bind sequence. An explicit `Value::Null` is a
/// real value and is bound as SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: Vec<(String, Option<Value>)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Payload::insert`].
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Builder that keeps the column only when `value` is `Some`.
    pub fn set_opt<V: Into<Value>>(mut self, column: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.insert(column, v),
            None => self.unset(column),
        }
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.put(column.into(), Some(value.into()));
    }

    /// Mark a column as unset; it is skipped when SQL is generated.
    pub fn unset(&mut self, column: impl Into<String>) {
        self.put(column.into(), None);
    }

    fn put(&mut self, column: String, value: Option<Value>) {
        match self.fields.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .and_then(|(_, v)| v.as_ref())
    }

    /// True when the column carries a value (`Null` included).
    pub fn has_value(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Columns with a value, in insertion order.
    pub fn defined(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            fields: map.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}

/// Ordered column -> value equality filter, AND-joined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    terms: Vec<(String, Value)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.terms.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.terms.push((column, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.terms.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl From<Map<String, Value>> for Conditions {
    fn from(map: Map<String, Value>) -> Self {
        Self { terms: map.into_iter().collect() }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Conditions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut conditions = Conditions::new();
        for (k, v) in iter {
            conditions.push(k, v);
        }
        conditions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(format!("Invalid sort direction: {}", s))
        }
    }
}

/// Shape of a `get`: select list, ordering, an optional raw predicate and
/// an optional row limit.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOptions {
    pub select: String,
    pub order_by: String,
    pub direction: SortDirection,
    pub where_raw: Option<String>,
    pub limit: Option<u64>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            select: "*".to_string(),
            order_by: "id".to_string(),
            direction: SortDirection::Desc,
            where_raw: None,
            limit: None,
        }
    }
}

impl SelectOptions {
    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = select.into();
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = column.into();
        self.direction = direction;
        self
    }

    /// Raw predicate appended verbatim (after the fragment check) to the WHERE clause.
    pub fn where_raw(mut self, fragment: impl Into<String>) -> Self {
        self.where_raw = Some(fragment.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_columns_are_not_defined() {
        let payload = Payload::new()
            .set("name", "Test")
            .set_opt::<String>("description", None)
            .set("archived_at", Value::Null);

        assert_eq!(payload.len(), 3);
        let defined: Vec<_> = payload.defined().map(|(k, _)| k).collect();
        assert_eq!(defined, vec!["name", "archived_at"]);
        assert!(payload.has_value("archived_at"));
        assert!(!payload.has_value("description"));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut payload = Payload::new().set("a", 1).set("b", 2);
        payload.insert("a", 3);
        let defined: Vec<_> = payload.defined().collect();
        assert_eq!(defined, vec![("a", &json!(3)), ("b", &json!(2))]);
    }

    #[test]
    fn conditions_keep_iteration_order() {
        let conditions = Conditions::new().and("user_id", 7).and("community_id", 3);
        let keys: Vec<_> = conditions.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["user_id", "community_id"]);
    }

    #[test]
    fn sort_direction_parses_case_insensitively() {
        assert_eq!("desc".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert_eq!("ASC".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}
