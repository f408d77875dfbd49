use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::debug;

use super::MappedStatement;
use crate::{
    Error,
    template::{Fragment, FragmentSource},
};

/// Read side of the statement registry, as seen by the binder and sessions.
pub trait StatementRegistry: Send + Sync {
    fn statement(&self, id: &str) -> Option<Arc<MappedStatement>>;

    fn has_statement(&self, id: &str) -> bool {
        self.statement(id).is_some()
    }
}

/// In-memory registry of built statements and reusable fragments.
#[derive(Debug, Default)]
pub struct Statements {
    statements: RwLock<HashMap<String, Arc<MappedStatement>>>,
    fragments: RwLock<BTreeMap<String, Fragment>>,
}

impl Statements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fragment(&self, id: impl Into<String>, fragment: Fragment) -> Result<(), Error> {
        let id = id.into();
        let mut fragments = self.fragments.write();
        if fragments.contains_key(&id) {
            return Err(Error::Builder(format!("fragment '{id}' is already defined")));
        }
        debug!(fragment = %id, "fragment registered");
        fragments.insert(id, fragment);
        Ok(())
    }

    pub fn add_statement(&self, statement: MappedStatement) -> Result<(), Error> {
        self.add_statements(vec![Arc::new(statement)])
    }

    /// Registers all statements or none of them.
    pub fn add_statements(&self, statements: Vec<Arc<MappedStatement>>) -> Result<(), Error> {
        let mut registered = self.statements.write();
        for (i, statement) in statements.iter().enumerate() {
            let duplicate_in_batch = statements[..i].iter().any(|s| s.id() == statement.id());
            if duplicate_in_batch || registered.contains_key(statement.id()) {
                return Err(Error::Builder(format!(
                    "statement '{}' is already defined",
                    statement.id()
                )));
            }
        }
        for statement in statements {
            debug!(statement = statement.id(), "statement registered");
            registered.insert(statement.id().to_string(), statement);
        }
        Ok(())
    }

    pub fn statement_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.statements.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl StatementRegistry for Statements {
    fn statement(&self, id: &str) -> Option<Arc<MappedStatement>> {
        self.statements.read().get(id).cloned()
    }
}

impl FragmentSource for Statements {
    fn fragment(&self, id: &str) -> Option<Fragment> {
        self.fragments.read().get(id).cloned()
    }
}
