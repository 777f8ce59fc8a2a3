pub mod access;
pub mod executor;
pub mod guard;
pub mod manager;
pub mod query_builder;
pub mod types;

pub use access::DataAccess;
pub use executor::{MySqlExecutor, SqlExecutor};
pub use manager::{ConnectionProvider, DatabaseError};
pub use query_builder::QueryBuilder;
pub use types::{Conditions, ExecResult, Payload, Row, SelectOptions, SortDirection, SqlResult};
