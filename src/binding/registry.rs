use std::{
    any::{TypeId, type_name},
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{MapperDescriptor, MapperInterface, MapperProxyFactory};
use crate::{
    Configuration, Error,
    mapping::{KeyGeneration, SqlCommandType, StatementKind, StatementTemplate},
    session::SqlSession,
};

/// Turns the statement bindings declared on a mapper into registered
/// statements. Must register everything or nothing.
pub trait MapperParser {
    fn parse(&self, descriptor: &MapperDescriptor) -> Result<(), Error>;
}

/// Builds statements from `#[select]`/`#[insert]`/`#[update]`/`#[delete]`
/// method annotations.
pub struct AnnotationParser<'c> {
    configuration: &'c Configuration,
}

impl<'c> AnnotationParser<'c> {
    pub fn new(configuration: &'c Configuration) -> Self {
        Self { configuration }
    }
}

impl MapperParser for AnnotationParser<'_> {
    fn parse(&self, descriptor: &MapperDescriptor) -> Result<(), Error> {
        let mut statements = Vec::new();
        for method in &descriptor.methods {
            let Some(annotation) = &method.annotation else {
                continue;
            };
            let options = &annotation.options;
            let mut template = StatementTemplate::from_sql(
                descriptor.namespace,
                method.signature.name,
                annotation.command,
                annotation.sql,
            );
            if let Some(statement_type) = options.statement_type {
                template = template.set_kind(statement_type.parse::<StatementKind>()?);
            }
            if let Some(timeout) = options.timeout_secs {
                template = template.set_timeout(Duration::from_secs(timeout));
            }
            if let Some(fetch_size) = options.fetch_size {
                template = template.set_fetch_size(fetch_size);
            }
            let writes = matches!(
                annotation.command,
                SqlCommandType::Insert | SqlCommandType::Update
            );
            if options.use_generated_keys && writes {
                template = template.set_key_generation(KeyGeneration::Database);
            }
            if let Some(key_property) = options.key_property {
                template = template.set_key_properties(key_property);
            }
            if let Some(key_column) = options.key_column {
                template = template.set_key_columns(key_column);
            }
            statements.extend(template.build(self.configuration)?);
        }
        self.configuration.statements().add_statements(statements)
    }
}

/// Registry of bound mapper types.
#[derive(Default)]
pub struct MapperRegistry {
    known: RwLock<HashMap<TypeId, Arc<MapperProxyFactory>>>,
    loading: Mutex<HashSet<TypeId>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `M`, letting `parser` build its statements first.
    ///
    /// Registering a type twice is a binding error. A failing parser leaves
    /// the registry as it was.
    pub fn add_mapper_with<M: ?Sized + MapperInterface>(
        &self,
        parser: &dyn MapperParser,
    ) -> Result<(), Error> {
        let type_id = TypeId::of::<M>();
        let descriptor = M::descriptor();
        {
            let mut loading = self.loading.lock();
            if loading.contains(&type_id) || self.known.read().contains_key(&type_id) {
                return Err(Error::binding(format!(
                    "Type {} is already known to the MapperRegistry.",
                    descriptor.type_name
                )));
            }
            loading.insert(type_id);
        }

        let parsed = parser.parse(&descriptor);

        let mut loading = self.loading.lock();
        if parsed.is_ok() {
            debug!(mapper = descriptor.type_name, methods = descriptor.methods.len(), "mapper registered");
            self.known
                .write()
                .insert(type_id, Arc::new(MapperProxyFactory::new(descriptor)));
        }
        loading.remove(&type_id);
        parsed
    }

    pub fn has_mapper<M: ?Sized + MapperInterface>(&self) -> bool {
        self.known.read().contains_key(&TypeId::of::<M>())
    }

    pub fn get_mapper<M: ?Sized + MapperInterface>(
        &self,
        session: Arc<dyn SqlSession>,
    ) -> Result<Box<M>, Error> {
        let factory = self
            .known
            .read()
            .get(&TypeId::of::<M>())
            .cloned()
            .ok_or_else(|| {
                Error::binding(format!(
                    "Type {} is not known to the MapperRegistry.",
                    type_name::<M>()
                ))
            })?;
        Ok(M::new_proxy(factory.new_instance(session)))
    }

    /// Type names of the registered mappers, sorted.
    pub fn mappers(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .known
            .read()
            .values()
            .map(|factory| factory.descriptor().type_name)
            .collect();
        names.sort_unstable();
        names
    }

    pub fn proxy_factory<M: ?Sized + MapperInterface>(&self) -> Option<Arc<MapperProxyFactory>> {
        self.known.read().get(&TypeId::of::<M>()).cloned()
    }
}
