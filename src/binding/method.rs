use std::collections::BTreeMap;

use tracing::debug;

use super::{MapperDescriptor, MethodSignature, ReturnKind};
use crate::{
    Configuration, Error, Value,
    executor::BatchResult,
    mapping::{SqlCommandType, StatementRegistry},
    session::SqlSession,
};

const GENERIC_NAME_PREFIX: &str = "param";

/// A mapper method resolved to its statement.
#[derive(Debug)]
pub struct MapperMethod {
    statement_id: String,
    command_type: SqlCommandType,
    returns: ReturnKind,
    parameter_names: &'static [&'static str],
}

impl MapperMethod {
    pub fn new(
        descriptor: &MapperDescriptor,
        signature: &MethodSignature,
        configuration: &Configuration,
    ) -> Result<Self, Error> {
        let statement_id = format!("{}.{}", descriptor.namespace, signature.name);
        let statement = configuration
            .statements()
            .statement(&statement_id)
            .ok_or_else(|| {
                Error::binding(format!("Invalid bound statement (not found): {statement_id}"))
            })?;
        let command_type = statement.command_type();
        if command_type == SqlCommandType::Unknown {
            return Err(Error::binding(format!(
                "Unknown execution method for: {statement_id}"
            )));
        }
        debug!(statement = %statement_id, "mapper method resolved");
        Ok(Self {
            statement_id,
            command_type,
            returns: signature.returns,
            parameter_names: signature.parameters,
        })
    }

    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    pub fn command_type(&self) -> SqlCommandType {
        self.command_type
    }

    pub fn execute(&self, session: &dyn SqlSession, args: &mut [Value]) -> Result<Value, Error> {
        let mut parameter = self.convert_args_to_parameter(args);
        let id = self.statement_id.as_str();
        let result = match self.command_type {
            SqlCommandType::Insert => self.row_count(session.insert(id, &mut parameter)?),
            SqlCommandType::Update => self.row_count(session.update(id, &mut parameter)?),
            SqlCommandType::Delete => self.row_count(session.delete(id, &mut parameter)?),
            SqlCommandType::Select => match self.returns {
                ReturnKind::Many => Value::List(session.select_list(id, &parameter)?),
                ReturnKind::Unit => {
                    session.select_list(id, &parameter)?;
                    Value::Null
                }
                ReturnKind::One | ReturnKind::Optional => {
                    session.select_one(id, &parameter)?.unwrap_or_default()
                }
            },
            SqlCommandType::Flush => Value::List(
                session
                    .flush_statements()?
                    .into_iter()
                    .map(batch_result_value)
                    .collect(),
            ),
            SqlCommandType::Unknown => {
                return Err(Error::binding(format!("Unknown execution method for: {id}")));
            }
        };
        self.write_back(parameter, args);
        Ok(result)
    }

    fn row_count(&self, count: u64) -> Value {
        match self.returns {
            ReturnKind::Unit => Value::Null,
            _ => Value::Int(count as i64),
        }
    }

    /// No argument → null, one → itself, several → a map keyed by the
    /// parameter names and by `param1..n`.
    fn convert_args_to_parameter(&self, args: &[Value]) -> Value {
        match args {
            [] => Value::Null,
            [single] => single.clone(),
            many => {
                let mut map = BTreeMap::new();
                for (i, value) in many.iter().enumerate() {
                    if let Some(name) = self.parameter_names.get(i) {
                        map.insert(name.to_string(), value.clone());
                    }
                    let generic = format!("{GENERIC_NAME_PREFIX}{}", i + 1);
                    map.entry(generic).or_insert_with(|| value.clone());
                }
                Value::Map(map)
            }
        }
    }

    fn write_back(&self, parameter: Value, args: &mut [Value]) {
        match args {
            [] => {}
            [single] => *single = parameter,
            many => {
                if let Value::Map(map) = parameter {
                    for (i, arg) in many.iter_mut().enumerate() {
                        if let Some(value) = self.parameter_names.get(i).and_then(|n| map.get(*n)) {
                            *arg = value.clone();
                        }
                    }
                }
            }
        }
    }
}

fn batch_result_value(result: BatchResult) -> Value {
    Value::Map(BTreeMap::from([
        ("statement_id".to_string(), Value::Text(result.statement_id)),
        ("sql".to_string(), Value::Text(result.sql)),
        ("parameters".to_string(), Value::List(result.parameters)),
        (
            "update_counts".to_string(),
            Value::List(result.update_counts.into_iter().map(|c| Value::Int(c as i64)).collect()),
        ),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(names: &'static [&'static str]) -> MapperMethod {
        MapperMethod {
            statement_id: "users.find".to_string(),
            command_type: SqlCommandType::Select,
            returns: ReturnKind::Many,
            parameter_names: names,
        }
    }

    #[test]
    fn arguments_become_one_parameter_object() {
        let m = method(&["name", "age"]);
        assert_eq!(m.convert_args_to_parameter(&[]), Value::Null);
        assert_eq!(m.convert_args_to_parameter(&[Value::Int(3)]), Value::Int(3));
        let many = m.convert_args_to_parameter(&[Value::from("ann"), Value::Int(30)]);
        assert_eq!(many.get_path("name"), Some(&Value::from("ann")));
        assert_eq!(many.get_path("param2"), Some(&Value::Int(30)));
    }

    #[test]
    fn named_entries_are_written_back() {
        let m = method(&["user", "flag"]);
        let mut args = vec![Value::map(), Value::Bool(true)];
        let mut parameter = m.convert_args_to_parameter(&args);
        parameter.set_path("user.id", Value::Int(7)).unwrap();
        m.write_back(parameter, &mut args);
        assert_eq!(args[0].get_path("id"), Some(&Value::Int(7)));
        assert_eq!(args[1], Value::Bool(true));
    }
}
