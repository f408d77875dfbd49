use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    BatchKeyGeneration, Configuration, Error, Value,
    db_adapter::{Command, Connection},
    mapping::MappedStatement,
};

mod keygen;
mod parameter;
mod result;
mod statement;
pub use keygen::*;
pub use parameter::*;
pub use result::*;
pub use statement::*;

/// Returned by a batched update; the real counts arrive on flush.
pub const BATCH_UPDATE_RETURN_VALUE: u64 = 0;

/// Outcome of one flushed batch command.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub statement_id: String,
    pub sql: String,
    /// Parameter copies in queue order, with keys filled in when batch key
    /// generation runs after flush.
    pub parameters: Vec<Value>,
    pub update_counts: Vec<u64>,
}

/// Runs mapped statements over one connection.
pub trait Executor: Send {
    fn update(&mut self, statement: Arc<MappedStatement>, parameter: &mut Value) -> Result<u64, Error>;

    fn query(
        &mut self,
        statement: Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<(), Error>;

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>, Error>;

    /// Releases pending commands without executing them.
    fn close(&mut self);
}

fn handle_rows(
    pipeline: &StatementPipeline<'_>,
    command: &mut dyn Command,
    handler: &mut dyn ResultHandler,
) -> Result<(), Error> {
    pipeline.parameterize(command)?;
    let mut context = ResultContext::default();
    for row in pipeline.query(command)? {
        context.next_result(row?);
        handler.handle_result(&mut context);
        if context.is_stopped() {
            break;
        }
    }
    Ok(())
}

fn run_query(
    configuration: &Configuration,
    connection: &mut dyn Connection,
    statement: Arc<MappedStatement>,
    parameter: &mut Value,
    row_bounds: RowBounds,
    handler: &mut dyn ResultHandler,
) -> Result<(), Error> {
    let mut pipeline =
        StatementPipeline::new(configuration, statement, parameter, None).set_row_bounds(row_bounds);
    let mut command = pipeline.prepare(connection)?;
    let result = handle_rows(&pipeline, command.as_mut(), handler);
    close_command(command);
    result
}

/// One command per call, closed before the call returns.
pub struct SimpleExecutor {
    configuration: Arc<Configuration>,
    connection: Box<dyn Connection>,
}

impl SimpleExecutor {
    pub fn new(configuration: Arc<Configuration>, connection: Box<dyn Connection>) -> Self {
        Self {
            configuration,
            connection,
        }
    }
}

impl Executor for SimpleExecutor {
    fn update(&mut self, statement: Arc<MappedStatement>, parameter: &mut Value) -> Result<u64, Error> {
        let connection = self.connection.as_mut();
        let mut pipeline = StatementPipeline::new(&self.configuration, statement, parameter, None);
        let mut command = pipeline.prepare(connection)?;
        let result = match pipeline.parameterize(command.as_mut()) {
            Ok(()) => pipeline.update(connection, command.as_mut()),
            Err(e) => Err(e),
        };
        close_command(command);
        result
    }

    fn query(
        &mut self,
        statement: Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<(), Error> {
        run_query(
            &self.configuration,
            self.connection.as_mut(),
            statement,
            parameter,
            row_bounds,
            handler,
        )
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>, Error> {
        Ok(Vec::new())
    }

    fn close(&mut self) {}
}

struct QueuedBatch {
    statement: Arc<MappedStatement>,
    sql: String,
    command: Box<dyn Command>,
    parameters: Vec<Value>,
}

/// Queues updates and sends them on flush.
///
/// Consecutive updates with the same SQL and statement share one command.
/// Queries flush the queue first.
pub struct BatchExecutor {
    configuration: Arc<Configuration>,
    connection: Box<dyn Connection>,
    queued: Vec<QueuedBatch>,
}

impl BatchExecutor {
    pub fn new(configuration: Arc<Configuration>, connection: Box<dyn Connection>) -> Self {
        Self {
            configuration,
            connection,
            queued: Vec::new(),
        }
    }

    pub fn queued_statement_count(&self) -> usize {
        self.queued.len()
    }
}

impl Executor for BatchExecutor {
    fn update(&mut self, statement: Arc<MappedStatement>, parameter: &mut Value) -> Result<u64, Error> {
        let connection = self.connection.as_mut();
        let mut pipeline =
            StatementPipeline::new(&self.configuration, statement.clone(), parameter, None);
        let sql = pipeline.resolve_bound_sql(connection)?.sql().to_string();
        let reuse = matches!(
            self.queued.last(),
            Some(last) if last.sql == sql && last.statement.id() == statement.id()
        );
        if !reuse {
            let command = pipeline.prepare(connection)?;
            debug!(statement = statement.id(), "new batch command");
            self.queued.push(QueuedBatch {
                statement,
                sql,
                command,
                parameters: Vec::new(),
            });
        }
        let queued = self
            .queued
            .last_mut()
            .ok_or_else(|| Error::executor("no batch command to queue into"))?;
        pipeline.parameterize(queued.command.as_mut())?;
        pipeline.batch(queued.command.as_mut())?;
        queued.parameters.push(pipeline.parameter().clone());
        Ok(BATCH_UPDATE_RETURN_VALUE)
    }

    fn query(
        &mut self,
        statement: Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<(), Error> {
        self.flush_statements()?;
        run_query(
            &self.configuration,
            self.connection.as_mut(),
            statement,
            parameter,
            row_bounds,
            handler,
        )
    }

    /// Sends every queued batch in order and closes its command.
    ///
    /// The first failure stops execution of the remaining batches, which are
    /// closed unsent; the returned [`Error::Batch`] carries the results of the
    /// batches that did run.
    fn flush_statements(&mut self) -> Result<Vec<BatchResult>, Error> {
        let queued = std::mem::take(&mut self.queued);
        let connection = self.connection.as_mut();
        let mut results = Vec::with_capacity(queued.len());
        let mut failure = None;
        for mut batch in queued {
            if failure.is_none() {
                match batch.command.execute_batch() {
                    Ok(update_counts) => {
                        let mut result = BatchResult {
                            statement_id: batch.statement.id().to_string(),
                            sql: batch.sql,
                            parameters: batch.parameters,
                            update_counts,
                        };
                        if self.configuration.batch_key_generation() == BatchKeyGeneration::AfterFlush {
                            if let Err(e) = batch.statement.key_generator().process_after_batch(
                                &self.configuration,
                                connection,
                                &batch.statement,
                                batch.command.as_mut(),
                                &mut result.parameters,
                            ) {
                                failure = Some((batch.statement.id().to_string(), e));
                            }
                        }
                        results.push(result);
                    }
                    Err(e) => failure = Some((batch.statement.id().to_string(), e)),
                }
            }
            close_command(batch.command);
        }
        match failure {
            Some((statement_id, source)) => {
                warn!(statement = %statement_id, executed = results.len(), error = %source, "batch flush failed");
                Err(Error::Batch {
                    statement_id,
                    successful: results,
                    source: Box::new(source),
                })
            }
            None => Ok(results),
        }
    }

    fn close(&mut self) {
        for batch in self.queued.drain(..) {
            close_command(batch.command);
        }
    }
}

impl Drop for BatchExecutor {
    fn drop(&mut self) {
        self.close();
    }
}
