//! Checks that run before any SQL text is assembled.
//!
//! Identifiers (table and column names) cannot be bound, so every one that
//! reaches SQL text passes the allowlist. Raw fragments (select list, extra
//! WHERE predicate) only pass a substring denylist, which rejects some
//! legitimate input such as a column named `from_date`.

use super::manager::DatabaseError;

const FRAGMENT_DENYLIST: &[&str] = &["union", "from", "`", "--", "++", ";"];

/// Reject a raw fragment containing any denylisted token (case-insensitive).
pub fn check_raw_fragment(fragment: &str) -> Result<(), DatabaseError> {
    let lowered = fragment.to_lowercase();
    if let Some(token) = FRAGMENT_DENYLIST.iter().find(|t| lowered.contains(*t)) {
        tracing::warn!("Rejected SQL fragment containing '{}'", token);
        return Err(DatabaseError::InjectionSuspected(fragment.to_string()));
    }
    Ok(())
}

/// Identifiers may only use `[A-Za-z0-9_.]` and must not be empty.
pub fn validate_identifier(name: &str) -> Result<(), DatabaseError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(DatabaseError::InvalidFieldName(name.to_string()));
    }
    Ok(())
}
