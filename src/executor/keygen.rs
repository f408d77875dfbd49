use std::{fmt, sync::Arc};

use tracing::debug;

use super::{StatementPipeline, close_command};
use crate::{
    Configuration, Error, Row, Value,
    db_adapter::{Command, Connection},
    mapping::MappedStatement,
};

/// Before/after hooks that fill key properties of the parameter object.
pub trait KeyGenerator: Send + Sync + fmt::Debug {
    /// Runs before the command is created and its SQL finalized.
    fn process_before(
        &self,
        configuration: &Configuration,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        parameter: &mut Value,
    ) -> Result<(), Error>;

    /// Runs after an update has executed.
    fn process_after(
        &self,
        configuration: &Configuration,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        command: &mut dyn Command,
        parameter: &mut Value,
    ) -> Result<(), Error>;

    /// Runs once per flushed batch, with the parameters in queue order.
    fn process_after_batch(
        &self,
        configuration: &Configuration,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        command: &mut dyn Command,
        parameters: &mut [Value],
    ) -> Result<(), Error> {
        for parameter in parameters {
            self.process_after(configuration, connection, statement, command, parameter)?;
        }
        Ok(())
    }

    /// Whether commands must be created with generated keys requested.
    fn uses_generated_keys(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeyGenerator;

impl KeyGenerator for NoKeyGenerator {
    fn process_before(
        &self,
        _configuration: &Configuration,
        _connection: &mut dyn Connection,
        _statement: &MappedStatement,
        _parameter: &mut Value,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn process_after(
        &self,
        _configuration: &Configuration,
        _connection: &mut dyn Connection,
        _statement: &MappedStatement,
        _command: &mut dyn Command,
        _parameter: &mut Value,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn process_after_batch(
        &self,
        _configuration: &Configuration,
        _connection: &mut dyn Connection,
        _statement: &MappedStatement,
        _command: &mut dyn Command,
        _parameters: &mut [Value],
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Copies keys reported by the driver into the key properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseKeyGenerator;

impl KeyGenerator for DatabaseKeyGenerator {
    fn process_before(
        &self,
        _configuration: &Configuration,
        _connection: &mut dyn Connection,
        _statement: &MappedStatement,
        _parameter: &mut Value,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn process_after(
        &self,
        _configuration: &Configuration,
        _connection: &mut dyn Connection,
        statement: &MappedStatement,
        command: &mut dyn Command,
        parameter: &mut Value,
    ) -> Result<(), Error> {
        if statement.key_properties().is_empty() {
            return Ok(());
        }
        let keys = command.generated_keys()?;
        match keys.first() {
            Some(row) => assign_keys(statement, row, parameter),
            None => Ok(()),
        }
    }

    fn process_after_batch(
        &self,
        _configuration: &Configuration,
        _connection: &mut dyn Connection,
        statement: &MappedStatement,
        command: &mut dyn Command,
        parameters: &mut [Value],
    ) -> Result<(), Error> {
        if statement.key_properties().is_empty() {
            return Ok(());
        }
        let keys = command.generated_keys()?;
        if keys.len() > parameters.len() {
            return Err(Error::executor(format!(
                "Too many keys are generated. There are only {} target objects.",
                parameters.len()
            )));
        }
        for (row, parameter) in keys.iter().zip(parameters.iter_mut()) {
            assign_keys(statement, row, parameter)?;
        }
        Ok(())
    }

    fn uses_generated_keys(&self) -> bool {
        true
    }
}

/// Runs a separate key statement on the same connection.
#[derive(Debug, Clone)]
pub struct SelectKeyGenerator {
    key_statement: Arc<MappedStatement>,
    execute_before: bool,
}

impl SelectKeyGenerator {
    pub fn new(key_statement: Arc<MappedStatement>, execute_before: bool) -> Self {
        Self {
            key_statement,
            execute_before,
        }
    }

    pub fn key_statement(&self) -> &Arc<MappedStatement> {
        &self.key_statement
    }

    pub fn execute_before(&self) -> bool {
        self.execute_before
    }

    fn process_generated_keys(
        &self,
        configuration: &Configuration,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        parameter: &mut Value,
    ) -> Result<(), Error> {
        if parameter.is_null() || statement.key_properties().is_empty() {
            return Ok(());
        }
        let mut key_parameter = parameter.clone();
        let mut pipeline = StatementPipeline::new(
            configuration,
            self.key_statement.clone(),
            &mut key_parameter,
            None,
        );
        let mut command = pipeline.prepare(connection)?;
        let rows = fetch_at_most_two(&pipeline, command.as_mut());
        close_command(command);
        let mut rows = rows?;
        if rows.len() > 1 {
            return Err(Error::executor("SelectKey returned more than one value."));
        }
        let row = rows
            .pop()
            .ok_or_else(|| Error::executor("SelectKey returned no data."))?;
        debug!(statement = statement.id(), key_statement = self.key_statement.id(), "select key assigned");
        assign_keys(statement, &row, parameter)
    }
}

fn fetch_at_most_two(
    pipeline: &StatementPipeline<'_>,
    command: &mut dyn Command,
) -> Result<Vec<Row>, Error> {
    pipeline.parameterize(command)?;
    command.execute()?;
    let mut rows = Vec::new();
    while rows.len() < 2 {
        match command.next_row()? {
            Some(row) => rows.push(row),
            None => break,
        }
    }
    Ok(rows)
}

impl KeyGenerator for SelectKeyGenerator {
    fn process_before(
        &self,
        configuration: &Configuration,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        parameter: &mut Value,
    ) -> Result<(), Error> {
        if self.execute_before {
            self.process_generated_keys(configuration, connection, statement, parameter)?;
        }
        Ok(())
    }

    fn process_after(
        &self,
        configuration: &Configuration,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        _command: &mut dyn Command,
        parameter: &mut Value,
    ) -> Result<(), Error> {
        if !self.execute_before {
            self.process_generated_keys(configuration, connection, statement, parameter)?;
        }
        Ok(())
    }
}

/// Writes the key columns of `row` into the key properties of `parameter`.
///
/// Property `i` takes key column `i` when key columns are declared and the
/// `i`-th column of the row otherwise.
pub(crate) fn assign_keys(
    statement: &MappedStatement,
    row: &Row,
    parameter: &mut Value,
) -> Result<(), Error> {
    match parameter {
        Value::Null => return Ok(()),
        Value::Map(_) => {}
        other => {
            return Err(Error::executor(format!(
                "Error getting generated key or setting result to parameter object. \
                 A {} parameter has no key properties.",
                other.type_name()
            )));
        }
    }
    for (i, property) in statement.key_properties().iter().enumerate() {
        let value = match statement.key_columns().get(i) {
            Some(column) => row.get(column),
            None => row.get_index(i),
        }
        .ok_or_else(|| {
            Error::executor(format!("No generated key column found for property '{property}'"))
        })?;
        parameter.set_path(property, value.clone())?;
    }
    Ok(())
}
