use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures_util::TryStreamExt;
use parking_lot::Mutex;
use sqlx::{
    Arguments, AnyConnection, Column, Connection as _, Either, Executor, Row as _, TypeInfo,
    ValueRef,
    any::{AnyArguments, AnyRow},
};
use tokio::runtime::Runtime;
use tracing::{debug, trace};

use super::{Command, CommandOptions, Connection, DBType, GeneratedKeys};
use crate::{Error, Row, Value};

const DEFAULT_KEY_COLUMN: &str = "GENERATED_KEY";

/// Blocking [`Connection`] over a sqlx [`AnyConnection`].
///
/// Every command created from it shares the connection and a private
/// current-thread runtime, so it must not be used from inside another
/// async runtime.
pub struct AnyDbConnection {
    runtime: Arc<Runtime>,
    conn: Arc<Mutex<AnyConnection>>,
    db_type: DBType,
}

impl AnyDbConnection {
    pub fn connect(url: &str) -> Result<Self, Error> {
        sqlx::any::install_default_drivers();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(sqlx::Error::Io)?;
        let conn = runtime.block_on(AnyConnection::connect(url))?;
        let db_type = DBType::new(conn.backend_name())?;
        debug!(backend = db_type.backend_name(), "connected");
        Ok(Self {
            runtime: Arc::new(runtime),
            conn: Arc::new(Mutex::new(conn)),
            db_type,
        })
    }

    pub fn db_type(&self) -> DBType {
        self.db_type
    }
}

impl Connection for AnyDbConnection {
    fn backend_name(&self) -> &str {
        self.db_type.backend_name()
    }

    fn create_command(
        &mut self,
        sql: &str,
        options: &CommandOptions,
    ) -> Result<Box<dyn Command>, Error> {
        let key_column = match &options.generated_keys {
            GeneratedKeys::None => None,
            GeneratedKeys::Returned => Some(DEFAULT_KEY_COLUMN.to_string()),
            GeneratedKeys::Columns(columns) => Some(
                columns
                    .first()
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_KEY_COLUMN.to_string()),
            ),
        };
        Ok(Box::new(AnyCommand {
            runtime: self.runtime.clone(),
            conn: self.conn.clone(),
            sql: sql.to_string(),
            parameters: Vec::new(),
            pending_batch: Vec::new(),
            rows: VecDeque::new(),
            update_count: None,
            key_column,
            generated_keys: Vec::new(),
            timeout: None,
            fetch_size: None,
            closed: false,
        }))
    }
}

struct AnyCommand {
    runtime: Arc<Runtime>,
    conn: Arc<Mutex<AnyConnection>>,
    sql: String,
    parameters: Vec<Value>,
    pending_batch: Vec<Vec<Value>>,
    rows: VecDeque<Row>,
    update_count: Option<u64>,
    key_column: Option<String>,
    generated_keys: Vec<Row>,
    timeout: Option<Duration>,
    // recorded only; sqlx streams rows without a fetch size
    fetch_size: Option<u32>,
    closed: bool,
}

struct Outcome {
    rows: Vec<Row>,
    rows_affected: u64,
    last_insert_id: Option<i64>,
    produced_rows: bool,
}

impl AnyCommand {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed {
            return Err(sqlx::Error::Protocol("command is closed".to_string()).into());
        }
        Ok(())
    }

    fn run(&self, parameters: &[Value]) -> Result<Outcome, Error> {
        let mut arguments = AnyArguments::default();
        for value in parameters {
            add_argument(&mut arguments, value)?;
        }
        trace!(sql = %self.sql, parameters = parameters.len(), fetch_size = ?self.fetch_size, "executing");

        let query = sqlx::query_with(self.sql.as_str(), arguments);
        let mut conn = self.conn.lock();
        #[allow(deprecated)]
        let stream = (&mut *conn).fetch_many(query);
        let results = match self.timeout {
            Some(timeout) => self
                .runtime
                .block_on(async { tokio::time::timeout(timeout, stream.try_collect::<Vec<_>>()).await })
                .map_err(|_| {
                    sqlx::Error::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("statement timed out after {timeout:?}"),
                    ))
                })??,
            None => self.runtime.block_on(stream.try_collect::<Vec<_>>())?,
        };

        let mut outcome = Outcome {
            rows: Vec::new(),
            rows_affected: 0,
            last_insert_id: None,
            produced_rows: false,
        };
        for result in results {
            match result {
                Either::Left(done) => {
                    outcome.rows_affected += done.rows_affected();
                    if let Some(id) = done.last_insert_id() {
                        outcome.last_insert_id = Some(id);
                    }
                }
                Either::Right(row) => {
                    outcome.produced_rows = true;
                    outcome.rows.push(convert_row(&row)?);
                }
            }
        }
        Ok(outcome)
    }

    fn key_row(&self, outcome: &Outcome) -> Option<Row> {
        let column = self.key_column.as_ref()?;
        let id = outcome.last_insert_id?;
        Some(Row::new(vec![(column.clone(), Value::Int(id))]))
    }
}

impl Command for AnyCommand {
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        self.ensure_open()?;
        self.timeout = Some(timeout);
        Ok(())
    }

    fn set_fetch_size(&mut self, fetch_size: u32) -> Result<(), Error> {
        self.ensure_open()?;
        self.fetch_size = Some(fetch_size);
        Ok(())
    }

    fn set_parameter(&mut self, index: usize, value: &Value) -> Result<(), Error> {
        self.ensure_open()?;
        if index == 0 {
            return Err(sqlx::Error::Protocol("parameter indexes start at 1".to_string()).into());
        }
        if self.parameters.len() < index {
            self.parameters.resize(index, Value::Null);
        }
        self.parameters[index - 1] = value.clone();
        Ok(())
    }

    fn execute(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        let outcome = self.run(&self.parameters)?;
        self.generated_keys = self.key_row(&outcome).into_iter().collect();
        self.update_count = (!outcome.produced_rows).then_some(outcome.rows_affected);
        self.rows = outcome.rows.into();
        Ok(())
    }

    fn update_count(&mut self) -> Result<Option<u64>, Error> {
        Ok(self.update_count)
    }

    fn next_row(&mut self) -> Result<Option<Row>, Error> {
        Ok(self.rows.pop_front())
    }

    fn generated_keys(&mut self) -> Result<Vec<Row>, Error> {
        Ok(self.generated_keys.clone())
    }

    fn add_batch(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        self.pending_batch.push(std::mem::take(&mut self.parameters));
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, Error> {
        self.ensure_open()?;
        let batch = std::mem::take(&mut self.pending_batch);
        let mut counts = Vec::with_capacity(batch.len());
        self.generated_keys.clear();
        for parameters in &batch {
            let outcome = self.run(parameters)?;
            if let Some(key) = self.key_row(&outcome) {
                self.generated_keys.push(key);
            }
            counts.push(outcome.rows_affected);
        }
        Ok(counts)
    }

    fn close(&mut self) -> Result<(), Error> {
        self.closed = true;
        self.rows.clear();
        self.pending_batch.clear();
        Ok(())
    }
}

fn add_argument(arguments: &mut AnyArguments<'static>, value: &Value) -> Result<(), Error> {
    let result = match value {
        Value::Null => arguments.add(Option::<String>::None),
        Value::Bool(v) => arguments.add(*v),
        Value::Int(v) => arguments.add(*v),
        Value::Float(v) => arguments.add(*v),
        Value::Text(v) => arguments.add(v.clone()),
        Value::Bytes(v) => arguments.add(v.clone()),
        Value::List(_) | Value::Map(_) => {
            return Err(Error::Message(format!(
                "cannot bind a {} value as a statement parameter",
                value.type_name()
            )));
        }
    };
    result.map_err(sqlx::Error::Encode)?;
    Ok(())
}

fn convert_row(row: &AnyRow) -> Result<Row, Error> {
    let mut columns = Vec::with_capacity(row.len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal())?;
        columns.push((column.name().to_string(), value));
    }
    Ok(Row::new(columns))
}

fn decode_column(row: &AnyRow, index: usize) -> Result<Value, Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(Value::Int(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(Value::Float(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(Value::Text(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Ok(Value::Bool(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(Value::Bytes(v));
    }
    Err(Error::Message(format!(
        "unsupported column type {} at index {}",
        row.column(index).type_info().name(),
        index
    )))
}
