use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::database::{DatabaseError, ExecResult, Row, SqlExecutor, SqlResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Fetch,
    Execute,
    Session,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub database: Option<String>,
    pub statement: SqlResult,
}

/// Scripted executor that records every statement it is handed.
///
/// Fetches pop queued result sets (empty once the queue runs dry); executes
/// return the configured `ExecResult`. With `failing`, every call errors
/// with a driver-style error carrying the given message.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    rows: Mutex<VecDeque<Vec<Row>>>,
    exec_result: ExecResult,
    failure: Option<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one result set for the next fetch.
    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        if let Ok(mut queue) = self.rows.lock() {
            queue.push_back(rows);
        }
        self
    }

    pub fn with_exec_result(mut self, result: ExecResult) -> Self {
        self.exec_result = result;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn record(&self, kind: CallKind, database: Option<&str>, statement: &SqlResult) -> Result<(), DatabaseError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind,
                database: database.map(str::to_string),
                statement: statement.clone(),
            });
        }
        match &self.failure {
            Some(message) => Err(DatabaseError::Sqlx(sqlx::Error::Protocol(message.clone()))),
            None => Ok(()),
        }
    }

    fn next_rows(&self) -> Vec<Row> {
        self.rows
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn fetch_all(&self, statement: &SqlResult) -> Result<Vec<Row>, DatabaseError> {
        self.record(CallKind::Fetch, None, statement)?;
        Ok(self.next_rows())
    }

    async fn execute(&self, statement: &SqlResult) -> Result<ExecResult, DatabaseError> {
        self.record(CallKind::Execute, None, statement)?;
        Ok(self.exec_result)
    }

    async fn fetch_all_in_session(&self, database: &str, statement: &SqlResult) -> Result<Vec<Row>, DatabaseError> {
        self.record(CallKind::Session, Some(database), statement)?;
        Ok(self.next_rows())
    }
}
