use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::trace;

use super::{MapperDescriptor, MapperMethod, MethodSignature};
use crate::{Error, Value, session::SqlSession};

type MethodCache = Arc<RwLock<HashMap<MethodSignature, Arc<MapperMethod>>>>;

/// Creates proxies of one mapper type; every proxy shares its method cache.
pub struct MapperProxyFactory {
    descriptor: Arc<MapperDescriptor>,
    method_cache: MethodCache,
}

impl MapperProxyFactory {
    pub fn new(descriptor: MapperDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            method_cache: Arc::default(),
        }
    }

    pub fn descriptor(&self) -> &MapperDescriptor {
        &self.descriptor
    }

    pub fn cached_method_count(&self) -> usize {
        self.method_cache.read().len()
    }

    pub fn new_instance(&self, session: Arc<dyn SqlSession>) -> MapperProxy {
        MapperProxy {
            session,
            descriptor: self.descriptor.clone(),
            method_cache: self.method_cache.clone(),
        }
    }
}

/// Single entry point behind every generated mapper method.
#[derive(Clone)]
pub struct MapperProxy {
    session: Arc<dyn SqlSession>,
    descriptor: Arc<MapperDescriptor>,
    method_cache: MethodCache,
}

impl MapperProxy {
    /// Dispatches one call. Changes the statement makes to the parameter
    /// object (generated keys) are written back into `args`.
    pub fn invoke(&self, signature: &MethodSignature, args: &mut [Value]) -> Result<Value, Error> {
        let method = self.cached_mapper_method(signature)?;
        trace!(mapper = self.descriptor.type_name, method = signature.name, "invoking");
        method
            .execute(self.session.as_ref(), args)
            .map_err(|e| match e {
                Error::SqlxError(_)
                | Error::Binding { .. }
                | Error::Executor { .. }
                | Error::Batch { .. }
                | Error::TooManyResults(_) => e,
                other => Error::binding_caused_by(
                    format!(
                        "Error invoking mapper method {}.{}",
                        self.descriptor.type_name, signature.name
                    ),
                    other,
                ),
            })
    }

    /// The resolved method for `signature`, computed on first use.
    ///
    /// Racing first calls may each resolve the method, but only the first
    /// stored value is ever returned.
    pub fn cached_mapper_method(&self, signature: &MethodSignature) -> Result<Arc<MapperMethod>, Error> {
        if let Some(method) = self.method_cache.read().get(signature) {
            return Ok(method.clone());
        }
        let resolved = Arc::new(MapperMethod::new(
            &self.descriptor,
            signature,
            self.session.configuration(),
        )?);
        let mut cache = self.method_cache.write();
        Ok(cache.entry(signature.clone()).or_insert(resolved).clone())
    }

    pub fn descriptor(&self) -> &MapperDescriptor {
        &self.descriptor
    }

    pub fn session(&self) -> &Arc<dyn SqlSession> {
        &self.session
    }
}

impl fmt::Debug for MapperProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperProxy")
            .field("mapper", &self.descriptor.type_name)
            .field("namespace", &self.descriptor.namespace)
            .finish_non_exhaustive()
    }
}
