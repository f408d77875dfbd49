use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::{MappedRows, RowBounds};
use crate::{
    Configuration, Error, Value,
    db_adapter::{Command, CommandOptions, Connection, DBType, GeneratedKeys},
    mapping::{BoundSql, MappedStatement, StatementKind},
};

/// Drives one statement invocation through
/// create → configure → parameterize → execute.
///
/// The kind of command is fixed when the pipeline is built. The pipeline
/// owns nothing but borrowed state; the command it creates belongs to the
/// caller, who must hand it back to [`close_command`] when done.
///
/// # Example
/// ```ignore
/// let mut pipeline = StatementPipeline::new(&configuration, statement, &mut parameter, None);
/// let mut command = pipeline.prepare(connection)?;
/// pipeline.parameterize(command.as_mut())?;
/// let rows = pipeline.update(connection, command.as_mut());
/// close_command(command);
/// ```
pub struct StatementPipeline<'p> {
    configuration: &'p Configuration,
    statement: Arc<MappedStatement>,
    parameter: &'p mut Value,
    bound_sql: Option<BoundSql>,
    row_bounds: RowBounds,
    kind: StatementKind,
}

impl<'p> StatementPipeline<'p> {
    /// A pre-computed `bound_sql` skips the before-key hook.
    pub fn new(
        configuration: &'p Configuration,
        statement: Arc<MappedStatement>,
        parameter: &'p mut Value,
        bound_sql: Option<BoundSql>,
    ) -> Self {
        let kind = statement.kind();
        Self {
            configuration,
            statement,
            parameter,
            bound_sql,
            row_bounds: RowBounds::default(),
            kind,
        }
    }

    pub fn set_row_bounds(mut self, row_bounds: RowBounds) -> Self {
        self.row_bounds = row_bounds;
        self
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn statement(&self) -> &Arc<MappedStatement> {
        &self.statement
    }

    pub fn parameter(&self) -> &Value {
        self.parameter
    }

    pub fn bound_sql(&self) -> Option<&BoundSql> {
        self.bound_sql.as_ref()
    }

    /// Runs the before-key hook and renders the SQL, once.
    pub fn resolve_bound_sql(&mut self, connection: &mut dyn Connection) -> Result<&BoundSql, Error> {
        if self.bound_sql.is_none() {
            let statement = self.statement.clone();
            statement.key_generator().process_before(
                self.configuration,
                connection,
                &statement,
                &mut *self.parameter,
            )?;
            let db_type = DBType::new(connection.backend_name())?;
            self.bound_sql = Some(statement.sql_source().bound_sql(&db_type));
        }
        self.bound_sql
            .as_ref()
            .ok_or_else(|| Error::executor("statement has no bound SQL"))
    }

    /// Creates and configures the command.
    ///
    /// A command that fails configuration is closed before the error is
    /// returned. Database errors come back unchanged, anything else is
    /// wrapped in an executor error.
    pub fn prepare(&mut self, connection: &mut dyn Connection) -> Result<Box<dyn Command>, Error> {
        let sql = self.resolve_bound_sql(connection)?.sql().to_string();
        let options = self.command_options();
        debug!(statement = self.statement.id(), kind = %self.kind, "creating command");
        let mut command = connection
            .create_command(&sql, &options)
            .map_err(preparing_error)?;
        if let Err(e) = self.configure(command.as_mut()) {
            close_command(command);
            return Err(preparing_error(e));
        }
        Ok(command)
    }

    fn command_options(&self) -> CommandOptions {
        let statement = &self.statement;
        let generated_keys = match self.kind {
            StatementKind::Plain | StatementKind::Prepared
                if statement.key_generator().uses_generated_keys() =>
            {
                if statement.key_columns().is_empty() {
                    GeneratedKeys::Returned
                } else {
                    GeneratedKeys::Columns(statement.key_columns().to_vec())
                }
            }
            _ => GeneratedKeys::None,
        };
        let result_set_type = match generated_keys {
            GeneratedKeys::None => statement.result_set_type(),
            _ => None,
        };
        CommandOptions {
            kind: self.kind,
            generated_keys,
            result_set_type,
        }
    }

    fn configure(&self, command: &mut dyn Command) -> Result<(), Error> {
        let timeout = self
            .statement
            .timeout()
            .or(self.configuration.default_statement_timeout());
        if let Some(timeout) = timeout {
            command.set_query_timeout(timeout)?;
        }
        let fetch_size = self
            .statement
            .fetch_size()
            .or(self.configuration.default_fetch_size());
        if let Some(fetch_size) = fetch_size {
            command.set_fetch_size(fetch_size)?;
        }
        Ok(())
    }

    /// Binds the parameter object; plain commands take no parameters.
    pub fn parameterize(&self, command: &mut dyn Command) -> Result<(), Error> {
        if self.kind == StatementKind::Plain {
            return Ok(());
        }
        let bound_sql = self
            .bound_sql
            .as_ref()
            .ok_or_else(|| Error::executor("statement must be prepared before it is parameterized"))?;
        self.configuration
            .parameter_handler()
            .set_parameters(command, bound_sql, self.parameter)
    }

    /// Executes the command, then runs the after-key hook with the caller's
    /// parameter object.
    pub fn update(
        &mut self,
        connection: &mut dyn Connection,
        command: &mut dyn Command,
    ) -> Result<u64, Error> {
        command.execute()?;
        let rows = command.update_count()?.unwrap_or(0);
        trace!(statement = self.statement.id(), rows, "update executed");
        let statement = self.statement.clone();
        statement.key_generator().process_after(
            self.configuration,
            connection,
            &statement,
            command,
            &mut *self.parameter,
        )?;
        Ok(rows)
    }

    /// Rows outside the pipeline's [`RowBounds`] are skipped unmapped.
    pub fn query<'c>(&'c self, command: &'c mut dyn Command) -> Result<MappedRows<'c>, Error> {
        command.execute()?;
        Ok(MappedRows::new(
            command,
            self.configuration.result_mapper(),
            &self.statement,
            self.row_bounds,
        ))
    }

    /// Queues the bound parameters; execution and key hooks happen on flush.
    pub fn batch(&self, command: &mut dyn Command) -> Result<(), Error> {
        command.add_batch()
    }
}

fn preparing_error(e: Error) -> Error {
    if e.is_database_error() {
        e
    } else {
        Error::executor_caused_by(format!("Error preparing statement.  Cause: {e}"), e)
    }
}

/// Closes a command, logging instead of returning any failure.
pub fn close_command(mut command: Box<dyn Command>) {
    if let Err(e) = command.close() {
        warn!(error = %e, "failed to close command");
    }
}
