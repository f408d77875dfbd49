//! Connection boundary used by the statement pipeline.
//!
//! The pipeline never talks to a driver directly: it creates a [`Command`]
//! from a [`Connection`] and drives it through configure, bind and execute.
//! Driver failures must surface as [`Error::SqlxError`] so callers can tell
//! them apart from pipeline errors.

use std::time::Duration;

use crate::{Error, Row, Value, mapping::{ResultSetType, StatementKind}};

mod db_type;
pub use db_type::*;

#[cfg(feature = "any")]
pub mod any;

/// How generated keys should be requested when a command is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GeneratedKeys {
    #[default]
    None,
    /// Ask the driver to return whatever keys it generated.
    Returned,
    /// Ask for the named key columns.
    Columns(Vec<String>),
}

/// Options a command is instantiated with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    pub kind: StatementKind,
    pub generated_keys: GeneratedKeys,
    pub result_set_type: Option<ResultSetType>,
}

pub trait Connection: Send {
    /// Backend name understood by [`DBType::new`].
    fn backend_name(&self) -> &str;

    fn create_command(
        &mut self,
        sql: &str,
        options: &CommandOptions,
    ) -> Result<Box<dyn Command>, Error>;
}

/// A prepared-or-plain statement handle owned by the caller.
pub trait Command: Send {
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), Error>;

    fn set_fetch_size(&mut self, fetch_size: u32) -> Result<(), Error>;

    /// Binds the parameter at 1-based `index`.
    fn set_parameter(&mut self, index: usize, value: &Value) -> Result<(), Error>;

    fn execute(&mut self) -> Result<(), Error>;

    /// Rows affected by the last execution, `None` when it produced rows.
    fn update_count(&mut self) -> Result<Option<u64>, Error>;

    fn next_row(&mut self) -> Result<Option<Row>, Error>;

    /// Keys generated by the last execution, one row per affected row.
    fn generated_keys(&mut self) -> Result<Vec<Row>, Error>;

    /// Queues the currently bound parameters as one batch entry.
    fn add_batch(&mut self) -> Result<(), Error>;

    fn execute_batch(&mut self) -> Result<Vec<u64>, Error>;

    fn close(&mut self) -> Result<(), Error>;
}
