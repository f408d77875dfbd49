use std::{sync::Arc, time::Duration};

use tracing::trace;

use super::{MappedStatement, ResultSetType, SqlCommandType, SqlSource, StatementKind};
use crate::{
    Configuration, Error,
    executor::{DatabaseKeyGenerator, KeyGenerator, NoKeyGenerator, SelectKeyGenerator},
    template::Document,
};

const SELECT_KEY_SUFFIX: &str = "!selectKey";

/// How a statement fills in generated keys.
#[derive(Debug, Clone, Default)]
pub enum KeyGeneration {
    #[default]
    None,
    /// Keys reported by the driver after execution.
    Database,
    /// Keys produced by a nested select, before or after the main statement.
    Select {
        template: Box<StatementTemplate>,
        execute_before: bool,
    },
}

/// Unbuilt statement: an include-bearing template plus its options.
///
/// Building clones the document, so a template can be retried after a
/// missing fragment shows up.
#[derive(Debug, Clone)]
pub struct StatementTemplate {
    namespace: String,
    id: String,
    command_type: SqlCommandType,
    document: Document,
    kind: StatementKind,
    timeout: Option<Duration>,
    fetch_size: Option<u32>,
    result_set_type: Option<ResultSetType>,
    key_generation: KeyGeneration,
    key_properties: Vec<String>,
    key_columns: Vec<String>,
}

impl StatementTemplate {
    pub fn new(
        namespace: impl Into<String>,
        id: impl Into<String>,
        command_type: SqlCommandType,
        document: Document,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            command_type,
            document,
            kind: StatementKind::default(),
            timeout: None,
            fetch_size: None,
            result_set_type: None,
            key_generation: KeyGeneration::None,
            key_properties: Vec::new(),
            key_columns: Vec::new(),
        }
    }

    /// Template holding a single text node.
    pub fn from_sql(
        namespace: impl Into<String>,
        id: impl Into<String>,
        command_type: SqlCommandType,
        sql: impl Into<String>,
    ) -> Self {
        let mut document = Document::new(command_tag(command_type));
        let root = document.root();
        document.append_text(root, sql);
        Self::new(namespace, id, command_type, document)
    }

    pub fn set_kind(mut self, kind: StatementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn set_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    pub fn set_result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.result_set_type = Some(result_set_type);
        self
    }

    pub fn set_key_generation(mut self, key_generation: KeyGeneration) -> Self {
        self.key_generation = key_generation;
        self
    }

    /// Comma separated lists are accepted, as in `"id,version"`.
    pub fn set_key_properties(mut self, key_properties: &str) -> Self {
        self.key_properties = split_names(key_properties);
        self
    }

    pub fn set_key_columns(mut self, key_columns: &str) -> Self {
        self.key_columns = split_names(key_columns);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn qualified_id(&self) -> String {
        if self.namespace.is_empty() || self.id.contains('.') {
            self.id.clone()
        } else {
            format!("{}.{}", self.namespace, self.id)
        }
    }

    /// Expands includes and builds the statement, preceded by its select-key
    /// statement when it has one.
    pub(crate) fn build(
        &self,
        configuration: &Configuration,
    ) -> Result<Vec<Arc<MappedStatement>>, Error> {
        let id = self.qualified_id();
        let mut built = Vec::with_capacity(2);
        let key_generator: Arc<dyn KeyGenerator> = match &self.key_generation {
            KeyGeneration::None => Arc::new(NoKeyGenerator),
            KeyGeneration::Database => Arc::new(DatabaseKeyGenerator),
            KeyGeneration::Select {
                template,
                execute_before,
            } => {
                let mut key_template = (**template).clone();
                key_template.namespace = self.namespace.clone();
                key_template.id = format!("{id}{SELECT_KEY_SUFFIX}");
                key_template.command_type = SqlCommandType::Select;
                let key_statement = key_template.build_one(configuration, Arc::new(NoKeyGenerator))?;
                built.push(key_statement.clone());
                Arc::new(SelectKeyGenerator::new(key_statement, *execute_before))
            }
        };
        built.push(self.build_one(configuration, key_generator)?);
        Ok(built)
    }

    fn build_one(
        &self,
        configuration: &Configuration,
        key_generator: Arc<dyn KeyGenerator>,
    ) -> Result<Arc<MappedStatement>, Error> {
        let id = self.qualified_id();
        let mut document = self.document.clone();
        configuration
            .include_expander(&self.namespace)
            .apply_includes(&mut document)?;
        let sql_source = SqlSource::from_document(&document, configuration.shrink_whitespaces_in_sql())?;
        trace!(statement = %id, "statement built");
        Ok(Arc::new(
            MappedStatement::builder(id, self.command_type, sql_source)
                .kind(self.kind)
                .timeout(self.timeout)
                .fetch_size(self.fetch_size)
                .result_set_type(self.result_set_type)
                .key_generator(key_generator)
                .key_properties(self.key_properties.clone())
                .key_columns(self.key_columns.clone())
                .build(),
        ))
    }
}

fn command_tag(command_type: SqlCommandType) -> &'static str {
    match command_type {
        SqlCommandType::Select => "select",
        SqlCommandType::Insert => "insert",
        SqlCommandType::Update => "update",
        SqlCommandType::Delete => "delete",
        SqlCommandType::Flush | SqlCommandType::Unknown => "statement",
    }
}

fn split_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
