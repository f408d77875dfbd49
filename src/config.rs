use std::{collections::BTreeMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    Error,
    binding::{AnnotationParser, MapperInterface, MapperRegistry},
    executor::{DefaultParameterHandler, DefaultResultMapper, ParameterHandler, ResultMapper},
    mapping::{StatementTemplate, Statements},
    session::SqlSession,
    template::{Fragment, IncludeExpander, PlaceholderPolicy, PropertyParser, Scope},
};

/// What the batch executor does with key generators of queued statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchKeyGeneration {
    /// Queued statements never run their after-execution key hook.
    #[default]
    Skip,
    /// Run the after-execution hook when the batch is flushed, against the
    /// parameter copies returned in the batch results.
    AfterFlush,
}

/// Shared, mostly read-only settings and registries.
///
/// Settings are fixed with the `set_*` builders before the configuration is
/// shared; the registries it owns are safe to use concurrently.
pub struct Configuration {
    variables: Scope,
    default_statement_timeout: Option<Duration>,
    default_fetch_size: Option<u32>,
    placeholder_policy: PlaceholderPolicy,
    default_value_separator: Option<String>,
    shrink_whitespaces_in_sql: bool,
    batch_key_generation: BatchKeyGeneration,
    parameter_handler: Arc<dyn ParameterHandler>,
    result_mapper: Arc<dyn ResultMapper>,
    statements: Statements,
    incomplete_statements: Mutex<Vec<StatementTemplate>>,
    mapper_registry: MapperRegistry,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            variables: Scope::default(),
            default_statement_timeout: None,
            default_fetch_size: None,
            placeholder_policy: PlaceholderPolicy::default(),
            default_value_separator: None,
            shrink_whitespaces_in_sql: false,
            batch_key_generation: BatchKeyGeneration::default(),
            parameter_handler: Arc::new(DefaultParameterHandler),
            result_mapper: Arc::new(DefaultResultMapper),
            statements: Statements::new(),
            incomplete_statements: Mutex::new(Vec::new()),
            mapper_registry: MapperRegistry::new(),
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide `${}` variables, visible to every include expansion.
    pub fn set_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = Scope::new(variables);
        self
    }

    pub fn set_variable(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let declared = BTreeMap::from([(name.into(), value.into())]);
        let variables = self.variables.with_overrides(declared);
        Self { variables, ..self }
    }

    pub fn set_default_statement_timeout(mut self, timeout: Duration) -> Self {
        self.default_statement_timeout = Some(timeout);
        self
    }

    pub fn set_default_fetch_size(mut self, fetch_size: u32) -> Self {
        self.default_fetch_size = Some(fetch_size);
        self
    }

    pub fn set_placeholder_policy(mut self, policy: PlaceholderPolicy) -> Self {
        self.placeholder_policy = policy;
        self
    }

    /// Enables `${name:default}` placeholders with the given separator.
    pub fn set_default_value_separator(mut self, separator: impl Into<String>) -> Self {
        self.default_value_separator = Some(separator.into());
        self
    }

    pub fn set_shrink_whitespaces_in_sql(mut self, shrink: bool) -> Self {
        self.shrink_whitespaces_in_sql = shrink;
        self
    }

    pub fn set_batch_key_generation(mut self, batch_key_generation: BatchKeyGeneration) -> Self {
        self.batch_key_generation = batch_key_generation;
        self
    }

    pub fn set_parameter_handler(mut self, handler: Arc<dyn ParameterHandler>) -> Self {
        self.parameter_handler = handler;
        self
    }

    pub fn set_result_mapper(mut self, mapper: Arc<dyn ResultMapper>) -> Self {
        self.result_mapper = mapper;
        self
    }

    pub fn variables(&self) -> &Scope {
        &self.variables
    }

    pub fn default_statement_timeout(&self) -> Option<Duration> {
        self.default_statement_timeout
    }

    pub fn default_fetch_size(&self) -> Option<u32> {
        self.default_fetch_size
    }

    pub fn shrink_whitespaces_in_sql(&self) -> bool {
        self.shrink_whitespaces_in_sql
    }

    pub fn batch_key_generation(&self) -> BatchKeyGeneration {
        self.batch_key_generation
    }

    pub fn parameter_handler(&self) -> &dyn ParameterHandler {
        self.parameter_handler.as_ref()
    }

    pub fn result_mapper(&self) -> &dyn ResultMapper {
        self.result_mapper.as_ref()
    }

    pub fn statements(&self) -> &Statements {
        &self.statements
    }

    pub fn mapper_registry(&self) -> &MapperRegistry {
        &self.mapper_registry
    }

    pub fn property_parser(&self) -> PropertyParser {
        PropertyParser::new(self.placeholder_policy, self.default_value_separator.clone())
    }

    pub fn include_expander<'a>(&'a self, namespace: &'a str) -> IncludeExpander<'a> {
        IncludeExpander::new(
            &self.statements,
            namespace,
            self.variables.clone(),
            self.property_parser(),
        )
    }

    pub fn add_fragment(&self, id: impl Into<String>, fragment: Fragment) -> Result<(), Error> {
        self.statements.add_fragment(id, fragment)
    }

    /// Builds and registers a statement template.
    ///
    /// A template whose includes reference fragments that are not registered
    /// yet is parked instead of failing; [`Configuration::build_all_statements`]
    /// retries it.
    pub fn add_statement_template(&self, template: StatementTemplate) -> Result<(), Error> {
        match template.build(self) {
            Ok(statements) => self.statements.add_statements(statements),
            Err(e) if e.is_incomplete() => {
                debug!(statement = %template.qualified_id(), error = %e, "statement parked until its fragments exist");
                self.incomplete_statements.lock().push(template);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Retries parked templates until no more progress is made.
    ///
    /// Templates that still cannot be built are reported together and stay
    /// parked.
    pub fn build_all_statements(&self) -> Result<(), Error> {
        let mut pending = std::mem::take(&mut *self.incomplete_statements.lock());
        loop {
            let before = pending.len();
            let mut still_pending = Vec::new();
            let mut errors = Vec::new();
            for template in pending {
                match template.build(self) {
                    Ok(statements) => {
                        if let Err(e) = self.statements.add_statements(statements) {
                            errors.push(e);
                        }
                    }
                    Err(e) if e.is_incomplete() => still_pending.push((template, e)),
                    Err(e) => errors.push(e),
                }
            }
            if still_pending.len() == before || still_pending.is_empty() || !errors.is_empty() {
                let mut parked = self.incomplete_statements.lock();
                for (template, e) in still_pending {
                    warn!(statement = %template.qualified_id(), error = %e, "statement is still incomplete");
                    errors.push(e);
                    parked.push(template);
                }
                return match errors.len() {
                    0 => Ok(()),
                    _ => Err(Error::MultipleErrors(errors)),
                };
            }
            pending = still_pending.into_iter().map(|(template, _)| template).collect();
        }
    }

    pub fn incomplete_statement_count(&self) -> usize {
        self.incomplete_statements.lock().len()
    }

    /// Registers mapper `M`, building its annotated statements.
    pub fn add_mapper<M: ?Sized + MapperInterface>(&self) -> Result<(), Error> {
        self.mapper_registry
            .add_mapper_with::<M>(&AnnotationParser::new(self))
    }

    pub fn has_mapper<M: ?Sized + MapperInterface>(&self) -> bool {
        self.mapper_registry.has_mapper::<M>()
    }

    pub fn get_mapper<M: ?Sized + MapperInterface>(
        &self,
        session: Arc<dyn SqlSession>,
    ) -> Result<Box<M>, Error> {
        self.mapper_registry.get_mapper::<M>(session)
    }
}
