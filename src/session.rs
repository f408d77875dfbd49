use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    Configuration, Error, Value,
    binding::MapperInterface,
    db_adapter::Connection,
    executor::{
        BatchExecutor, BatchResult, DefaultResultHandler, Executor, ResultHandler, RowBounds,
        SimpleExecutor,
    },
    mapping::{MappedStatement, StatementRegistry},
};

/// Execution context handed to mapper proxies.
pub trait SqlSession: Send + Sync {
    fn configuration(&self) -> &Configuration;

    fn select_with_handler(
        &self,
        statement: &str,
        parameter: &Value,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<(), Error>;

    fn update(&self, statement: &str, parameter: &mut Value) -> Result<u64, Error>;

    fn flush_statements(&self) -> Result<Vec<BatchResult>, Error>;

    fn select_list(&self, statement: &str, parameter: &Value) -> Result<Vec<Value>, Error> {
        self.select_list_bounded(statement, parameter, RowBounds::default())
    }

    /// Only the rows inside `row_bounds`; the SQL is not rewritten.
    fn select_list_bounded(
        &self,
        statement: &str,
        parameter: &Value,
        row_bounds: RowBounds,
    ) -> Result<Vec<Value>, Error> {
        let mut handler = DefaultResultHandler::new();
        self.select_with_handler(statement, parameter, row_bounds, &mut handler)?;
        Ok(handler.into_results())
    }

    /// At most one row; more is [`Error::TooManyResults`].
    fn select_one(&self, statement: &str, parameter: &Value) -> Result<Option<Value>, Error> {
        let mut list = self.select_list(statement, parameter)?;
        match list.len() {
            0 | 1 => Ok(list.pop()),
            n => Err(Error::TooManyResults(n)),
        }
    }

    fn insert(&self, statement: &str, parameter: &mut Value) -> Result<u64, Error> {
        self.update(statement, parameter)
    }

    fn delete(&self, statement: &str, parameter: &mut Value) -> Result<u64, Error> {
        self.update(statement, parameter)
    }
}

/// Session over a single executor, serialized with a mutex.
pub struct DefaultSqlSession {
    configuration: Arc<Configuration>,
    executor: Mutex<Box<dyn Executor>>,
}

impl DefaultSqlSession {
    pub fn new(configuration: Arc<Configuration>, executor: Box<dyn Executor>) -> Self {
        Self {
            configuration,
            executor: Mutex::new(executor),
        }
    }

    pub fn simple(configuration: Arc<Configuration>, connection: Box<dyn Connection>) -> Self {
        let executor = SimpleExecutor::new(configuration.clone(), connection);
        Self::new(configuration, Box::new(executor))
    }

    pub fn batch(configuration: Arc<Configuration>, connection: Box<dyn Connection>) -> Self {
        let executor = BatchExecutor::new(configuration.clone(), connection);
        Self::new(configuration, Box::new(executor))
    }

    /// Mapper proxy bound to this session.
    pub fn get_mapper<M: ?Sized + MapperInterface>(self: &Arc<Self>) -> Result<Box<M>, Error> {
        let session: Arc<dyn SqlSession> = self.clone();
        self.configuration.get_mapper::<M>(session)
    }

    pub fn close(&self) {
        debug!("closing session");
        self.executor.lock().close();
    }

    fn mapped_statement(&self, id: &str) -> Result<Arc<MappedStatement>, Error> {
        self.configuration
            .statements()
            .statement(id)
            .ok_or_else(|| {
                Error::Message(format!(
                    "Mapped Statements collection does not contain value for {id}"
                ))
            })
    }
}

impl SqlSession for DefaultSqlSession {
    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn select_with_handler(
        &self,
        statement: &str,
        parameter: &Value,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<(), Error> {
        let statement = self.mapped_statement(statement)?;
        let mut parameter = parameter.clone();
        self.executor
            .lock()
            .query(statement, &mut parameter, row_bounds, handler)
    }

    fn update(&self, statement: &str, parameter: &mut Value) -> Result<u64, Error> {
        let statement = self.mapped_statement(statement)?;
        self.executor.lock().update(statement, parameter)
    }

    fn flush_statements(&self) -> Result<Vec<BatchResult>, Error> {
        self.executor.lock().flush_statements()
    }
}
