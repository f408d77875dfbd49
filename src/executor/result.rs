use tracing::trace;

use crate::{Error, Row, Value, db_adapter::Command, mapping::MappedStatement};

/// Turns one database row into the object handed back to callers.
pub trait ResultMapper: Send + Sync {
    fn map_row(&self, statement: &MappedStatement, row: Row) -> Result<Value, Error>;
}

/// Maps a row to a column-name → value map.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResultMapper;

impl ResultMapper for DefaultResultMapper {
    fn map_row(&self, _statement: &MappedStatement, row: Row) -> Result<Value, Error> {
        Ok(row.into_value())
    }
}

/// Window over the rows of a query, applied while reading the cursor.
///
/// The SQL is sent as written; skipped rows are fetched and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    offset: usize,
    limit: usize,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: usize = 0;
    pub const NO_ROW_LIMIT: usize = usize::MAX;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::new(Self::NO_ROW_OFFSET, Self::NO_ROW_LIMIT)
    }
}

/// Lazily mapped rows of an executed query command.
///
/// The sequence is finite and cannot be restarted; it ends for good after
/// the first error.
pub struct MappedRows<'c> {
    command: &'c mut dyn Command,
    mapper: &'c dyn ResultMapper,
    statement: &'c MappedStatement,
    skip: usize,
    remaining: usize,
    done: bool,
}

impl<'c> MappedRows<'c> {
    pub(crate) fn new(
        command: &'c mut dyn Command,
        mapper: &'c dyn ResultMapper,
        statement: &'c MappedStatement,
        row_bounds: RowBounds,
    ) -> Self {
        Self {
            command,
            mapper,
            statement,
            skip: row_bounds.offset(),
            remaining: row_bounds.limit(),
            done: false,
        }
    }

    fn skip_offset(&mut self) -> Result<bool, Error> {
        while self.skip > 0 {
            if self.command.next_row()?.is_none() {
                return Ok(false);
            }
            self.skip -= 1;
        }
        Ok(true)
    }
}

impl Iterator for MappedRows<'_> {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.skip_offset() {
            Ok(true) if self.remaining > 0 => {}
            Ok(_) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        }
        let mapped = match self.command.next_row() {
            Ok(Some(row)) => {
                self.remaining -= 1;
                self.mapper.map_row(self.statement, row)
            }
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };
        if mapped.is_err() {
            self.done = true;
        }
        Some(mapped)
    }
}

impl std::iter::FusedIterator for MappedRows<'_> {}

/// State handed to a [`ResultHandler`] for every mapped row.
#[derive(Debug, Default)]
pub struct ResultContext {
    result_object: Value,
    result_count: usize,
    stopped: bool,
}

impl ResultContext {
    pub(crate) fn next_result(&mut self, result_object: Value) {
        self.result_count += 1;
        self.result_object = result_object;
    }

    pub fn result_object(&self) -> &Value {
        &self.result_object
    }

    pub fn take_result_object(&mut self) -> Value {
        std::mem::take(&mut self.result_object)
    }

    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// Stops fetching after the current row.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

pub trait ResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext);
}

/// Collects every mapped row.
#[derive(Debug, Default)]
pub struct DefaultResultHandler {
    list: Vec<Value>,
}

impl DefaultResultHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[Value] {
        &self.list
    }

    pub fn into_results(self) -> Vec<Value> {
        self.list
    }
}

impl ResultHandler for DefaultResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext) {
        trace!(count = context.result_count(), "row collected");
        self.list.push(context.take_result_object());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FirstOnly(Option<Value>);

    impl ResultHandler for FirstOnly {
        fn handle_result(&mut self, context: &mut ResultContext) {
            self.0 = Some(context.take_result_object());
            context.stop();
        }
    }

    #[test]
    fn context_counts_and_stops() {
        let mut context = ResultContext::default();
        let mut handler = FirstOnly(None);
        context.next_result(Value::Int(1));
        handler.handle_result(&mut context);
        assert_eq!(context.result_count(), 1);
        assert!(context.is_stopped());
        assert_eq!(handler.0, Some(Value::Int(1)));
    }

    #[test]
    fn default_handler_collects_in_order() {
        let mut context = ResultContext::default();
        let mut handler = DefaultResultHandler::new();
        for i in 0..3 {
            context.next_result(Value::Int(i));
            handler.handle_result(&mut context);
        }
        assert_eq!(handler.into_results(), vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
    }
}
