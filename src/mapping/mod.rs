use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use crate::{
    Error,
    executor::{KeyGenerator, NoKeyGenerator},
};

mod builder;
mod sql_source;
mod statements;
pub use builder::*;
pub use sql_source::*;
pub use statements::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlCommandType {
    Unknown,
    Select,
    Insert,
    Update,
    Delete,
    Flush,
}

/// Execution style of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatementKind {
    /// Raw SQL without parameter binding.
    Plain,
    #[default]
    Prepared,
    Callable,
}

impl FromStr for StatementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STATEMENT" | "PLAIN" => Ok(Self::Plain),
            "PREPARED" => Ok(Self::Prepared),
            "CALLABLE" => Ok(Self::Callable),
            _ => Err(Error::executor(format!("Unknown statement type: {s}"))),
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "STATEMENT",
            Self::Prepared => "PREPARED",
            Self::Callable => "CALLABLE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultSetType {
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

/// Immutable, fully built statement registered under its qualified id.
#[derive(Debug)]
pub struct MappedStatement {
    id: String,
    command_type: SqlCommandType,
    kind: StatementKind,
    sql_source: SqlSource,
    timeout: Option<Duration>,
    fetch_size: Option<u32>,
    result_set_type: Option<ResultSetType>,
    key_generator: Arc<dyn KeyGenerator>,
    key_properties: Vec<String>,
    key_columns: Vec<String>,
}

impl MappedStatement {
    pub fn builder(
        id: impl Into<String>,
        command_type: SqlCommandType,
        sql_source: SqlSource,
    ) -> MappedStatementBuilder {
        MappedStatementBuilder {
            statement: MappedStatement {
                id: id.into(),
                command_type,
                kind: StatementKind::default(),
                sql_source,
                timeout: None,
                fetch_size: None,
                result_set_type: None,
                key_generator: Arc::new(NoKeyGenerator),
                key_properties: Vec::new(),
                key_columns: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command_type(&self) -> SqlCommandType {
        self.command_type
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn sql_source(&self) -> &SqlSource {
        &self.sql_source
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    pub fn result_set_type(&self) -> Option<ResultSetType> {
        self.result_set_type
    }

    pub fn key_generator(&self) -> &Arc<dyn KeyGenerator> {
        &self.key_generator
    }

    pub fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }
}

pub struct MappedStatementBuilder {
    statement: MappedStatement,
}

impl MappedStatementBuilder {
    pub fn kind(mut self, kind: StatementKind) -> Self {
        self.statement.kind = kind;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement.timeout = timeout;
        self
    }

    pub fn fetch_size(mut self, fetch_size: Option<u32>) -> Self {
        self.statement.fetch_size = fetch_size;
        self
    }

    pub fn result_set_type(mut self, result_set_type: Option<ResultSetType>) -> Self {
        self.statement.result_set_type = result_set_type;
        self
    }

    pub fn key_generator(mut self, key_generator: Arc<dyn KeyGenerator>) -> Self {
        self.statement.key_generator = key_generator;
        self
    }

    pub fn key_properties(mut self, key_properties: Vec<String>) -> Self {
        self.statement.key_properties = key_properties;
        self
    }

    pub fn key_columns(mut self, key_columns: Vec<String>) -> Self {
        self.statement.key_columns = key_columns;
        self
    }

    pub fn build(self) -> MappedStatement {
        self.statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_kind_parses_known_names_only() {
        assert_eq!("statement".parse::<StatementKind>().unwrap(), StatementKind::Plain);
        assert_eq!("CALLABLE".parse::<StatementKind>().unwrap(), StatementKind::Callable);
        let err = "SCRIPT".parse::<StatementKind>().unwrap_err();
        assert!(matches!(err, Error::Executor { ref message, .. } if message == "Unknown statement type: SCRIPT"));
    }

    #[test]
    fn builder_defaults_to_prepared_without_keys() {
        let statement = MappedStatement::builder(
            "ns.find",
            SqlCommandType::Select,
            SqlSource::new("select 1").unwrap(),
        )
        .fetch_size(Some(50))
        .build();
        assert_eq!(statement.kind(), StatementKind::Prepared);
        assert_eq!(statement.fetch_size(), Some(50));
        assert!(!statement.key_generator().uses_generated_keys());
    }
}
