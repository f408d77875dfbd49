//! Mapper interfaces bound to mapped statements.
//!
//! A mapper is a trait annotated with `#[mapper]`. The macro generates a
//! proxy type that implements the trait by forwarding every abstract method
//! to [`MapperProxy::invoke`] together with a static [`MethodSignature`].
//! The proxy resolves the signature to a [`MapperMethod`] once and caches it
//! in a table shared by every proxy of the same mapper type.

mod method;
mod proxy;
mod registry;
pub use method::*;
pub use proxy::*;
pub use registry::*;

use crate::mapping::SqlCommandType;

/// Shape of a mapper method's successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// `()`: the result is discarded.
    Unit,
    /// A single value that must be present.
    One,
    /// `Option<T>`.
    Optional,
    /// `Vec<T>`.
    Many,
}

/// Identity of one mapper method; the key of the method cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: &'static str,
    pub parameters: &'static [&'static str],
    pub parameter_types: &'static [&'static str],
    pub return_type: &'static str,
    pub returns: ReturnKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementOptions {
    pub use_generated_keys: bool,
    pub key_property: Option<&'static str>,
    pub key_column: Option<&'static str>,
    pub timeout_secs: Option<u64>,
    pub fetch_size: Option<u32>,
    pub statement_type: Option<&'static str>,
}

/// Statement declared directly on a mapper method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementAnnotation {
    pub command: SqlCommandType,
    pub sql: &'static str,
    pub options: StatementOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub signature: MethodSignature,
    pub annotation: Option<StatementAnnotation>,
}

/// Static description of a mapper trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperDescriptor {
    pub type_name: &'static str,
    /// Statement ids of the mapper are `namespace.method`.
    pub namespace: &'static str,
    pub methods: Vec<MethodDescriptor>,
}

/// Implemented for `dyn Trait` by `#[mapper]`; the registry is keyed by the
/// `TypeId` of that trait object type.
pub trait MapperInterface: 'static {
    fn descriptor() -> MapperDescriptor;

    fn new_proxy(proxy: MapperProxy) -> Box<Self>;
}
