#![allow(dead_code)]

use std::{collections::VecDeque, sync::Arc, time::Duration};

use parking_lot::Mutex;
use sqlx_template_mapper::{
    Error, Row, Value,
    db_adapter::{Command, CommandOptions, Connection, GeneratedKeys},
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn db_error(message: &str) -> Error {
    Error::SqlxError(sqlx::Error::Protocol(message.to_string()))
}

/// What the scripted database does and what it saw.
#[derive(Default)]
pub struct MockState {
    pub events: Vec<String>,
    pub created: Vec<(String, CommandOptions)>,
    pub closes: usize,
    /// Rows returned by queries whose SQL contains the pattern.
    pub rows: Vec<(String, Vec<Row>)>,
    pub update_count: u64,
    /// Next key handed out when a command asked for generated keys.
    pub next_key: i64,
    pub fail_create: Option<Error>,
    pub fail_timeout: Option<Error>,
    /// Fails `execute_batch` on the first command whose SQL contains the pattern.
    pub fail_batch: Option<(String, Error)>,
    pub fail_close: bool,
}

impl MockState {
    pub fn count(&self, prefix: &str) -> usize {
        self.events.iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[derive(Clone)]
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
    backend: &'static str,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::with_backend("SQLite")
    }

    pub fn with_backend(backend: &'static str) -> Self {
        let state = MockState {
            update_count: 1,
            next_key: 1,
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            backend,
        }
    }

    pub fn returning(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.state.lock().rows.push((pattern.to_string(), rows));
        self
    }
}

pub fn row(columns: &[(&str, Value)]) -> Row {
    Row::new(
        columns
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect(),
    )
}

impl Connection for MockConnection {
    fn backend_name(&self) -> &str {
        self.backend
    }

    fn create_command(
        &mut self,
        sql: &str,
        options: &CommandOptions,
    ) -> Result<Box<dyn Command>, Error> {
        let mut state = self.state.lock();
        if let Some(e) = state.fail_create.take() {
            return Err(e);
        }
        state.events.push(format!("create:{sql}"));
        state.created.push((sql.to_string(), options.clone()));
        Ok(Box::new(MockCommand {
            state: self.state.clone(),
            sql: sql.to_string(),
            options: options.clone(),
            parameters: Vec::new(),
            pending: Vec::new(),
            rows: VecDeque::new(),
            update_count: None,
            keys: Vec::new(),
        }))
    }
}

pub struct MockCommand {
    state: Arc<Mutex<MockState>>,
    sql: String,
    options: CommandOptions,
    parameters: Vec<Value>,
    pending: Vec<Vec<Value>>,
    rows: VecDeque<Row>,
    update_count: Option<u64>,
    keys: Vec<Row>,
}

impl MockCommand {
    fn key_row(&self, state: &mut MockState) -> Option<Row> {
        let column = match &self.options.generated_keys {
            GeneratedKeys::None => return None,
            GeneratedKeys::Returned => "GENERATED_KEY".to_string(),
            GeneratedKeys::Columns(columns) => columns.first()?.clone(),
        };
        let key = state.next_key;
        state.next_key += 1;
        Some(Row::new(vec![(column, Value::Int(key))]))
    }
}

impl Command for MockCommand {
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        let mut state = self.state.lock();
        if let Some(e) = state.fail_timeout.take() {
            return Err(e);
        }
        state.events.push(format!("timeout:{}", timeout.as_secs()));
        Ok(())
    }

    fn set_fetch_size(&mut self, fetch_size: u32) -> Result<(), Error> {
        self.state.lock().events.push(format!("fetch:{fetch_size}"));
        Ok(())
    }

    fn set_parameter(&mut self, index: usize, value: &Value) -> Result<(), Error> {
        self.state.lock().events.push(format!("bind:{index}={value:?}"));
        if self.parameters.len() < index {
            self.parameters.resize(index, Value::Null);
        }
        self.parameters[index - 1] = value.clone();
        Ok(())
    }

    fn execute(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.events.push(format!("execute:{}", self.sql));
        let rows = state
            .rows
            .iter()
            .find(|(pattern, _)| self.sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone());
        match rows {
            Some(rows) => {
                self.rows = rows.into();
                self.update_count = None;
            }
            None => {
                self.update_count = Some(state.update_count);
                self.keys = self.key_row(&mut state).into_iter().collect();
            }
        }
        Ok(())
    }

    fn update_count(&mut self) -> Result<Option<u64>, Error> {
        Ok(self.update_count)
    }

    fn next_row(&mut self) -> Result<Option<Row>, Error> {
        Ok(self.rows.pop_front())
    }

    fn generated_keys(&mut self) -> Result<Vec<Row>, Error> {
        Ok(self.keys.clone())
    }

    fn add_batch(&mut self) -> Result<(), Error> {
        self.state.lock().events.push("add_batch".to_string());
        self.pending.push(std::mem::take(&mut self.parameters));
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, Error> {
        let mut state = self.state.lock();
        state.events.push(format!("execute_batch:{}", self.pending.len()));
        if matches!(&state.fail_batch, Some((pattern, _)) if self.sql.contains(pattern.as_str())) {
            if let Some((_, e)) = state.fail_batch.take() {
                return Err(e);
            }
        }
        let pending = std::mem::take(&mut self.pending);
        self.keys.clear();
        for _ in &pending {
            if let Some(key) = self.key_row(&mut state) {
                self.keys.push(key);
            }
        }
        Ok(vec![state.update_count; pending.len()])
    }

    fn close(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.closes += 1;
        state.events.push("close".to_string());
        if state.fail_close {
            return Err(db_error("close failed"));
        }
        Ok(())
    }
}
