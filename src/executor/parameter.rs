use tracing::trace;

use crate::{Error, Value, db_adapter::Command, mapping::BoundSql};

/// Binds a parameter object to the placeholders of a prepared command.
pub trait ParameterHandler: Send + Sync {
    fn set_parameters(
        &self,
        command: &mut dyn Command,
        bound_sql: &BoundSql,
        parameter: &Value,
    ) -> Result<(), Error>;
}

/// Resolves each mapping from, in order: the bound SQL's additional
/// parameters, a dotted path into a map parameter, or a scalar parameter
/// itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParameterHandler;

impl DefaultParameterHandler {
    fn resolve<'v>(
        bound_sql: &'v BoundSql,
        parameter: &'v Value,
        property: &str,
    ) -> Result<&'v Value, Error> {
        if let Some(value) = bound_sql.additional_parameter(property) {
            return Ok(value);
        }
        match parameter {
            Value::Map(_) => parameter.get_path(property).ok_or_else(|| {
                Error::Message(format!(
                    "There is no property named '{property}' in the parameter map"
                ))
            }),
            scalar => Ok(scalar),
        }
    }
}

impl ParameterHandler for DefaultParameterHandler {
    fn set_parameters(
        &self,
        command: &mut dyn Command,
        bound_sql: &BoundSql,
        parameter: &Value,
    ) -> Result<(), Error> {
        for (i, mapping) in bound_sql.parameter_mappings().iter().enumerate() {
            let value = Self::resolve(bound_sql, parameter, &mapping.property)?;
            trace!(index = i + 1, property = %mapping.property, kind = value.type_name(), "binding parameter");
            command.set_parameter(i + 1, value)?;
        }
        Ok(())
    }
}
