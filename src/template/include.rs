use std::{collections::BTreeMap, sync::Arc};

use tracing::{debug, trace};

use super::{Document, NodeId, NodeKind, Property, PropertyParser, Scope};
use crate::Error;

/// A reusable `<sql>` subtree living in its own (immutable) document.
#[derive(Debug, Clone)]
pub struct Fragment {
    document: Arc<Document>,
    node: NodeId,
}

impl Fragment {
    /// The fragment node must be an element; its children are what gets grafted.
    pub fn new(document: Arc<Document>, node: NodeId) -> Result<Self, Error> {
        if !document.contains(node) {
            return Err(Error::Builder("fragment node does not belong to its document".into()));
        }
        if !matches!(document.kind(node), NodeKind::Element { .. }) {
            return Err(Error::Builder("a fragment must be an element node".into()));
        }
        Ok(Self { document, node })
    }

    /// Uses the root element of `document` as the fragment.
    pub fn from_document(document: Document) -> Self {
        let node = document.root();
        Self {
            document: Arc::new(document),
            node,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// Lookup of namespace-qualified fragment ids.
pub trait FragmentSource {
    fn fragment(&self, id: &str) -> Option<Fragment>;
}

impl FragmentSource for BTreeMap<String, Fragment> {
    fn fragment(&self, id: &str) -> Option<Fragment> {
        self.get(id).cloned()
    }
}

/// Expands `include` nodes into the fragments they reference.
///
/// Each include gets its own deep copy of the fragment, expanded with a
/// child scope made of the inherited entries plus the include's own
/// properties. Property values are substituted against the inherited scope
/// only, so sibling declarations never see each other.
pub struct IncludeExpander<'a> {
    fragments: &'a dyn FragmentSource,
    namespace: &'a str,
    variables: Scope,
    parser: PropertyParser,
}

impl<'a> IncludeExpander<'a> {
    /// `variables` is a read-only snapshot of the process-wide variables.
    pub fn new(
        fragments: &'a dyn FragmentSource,
        namespace: &'a str,
        variables: Scope,
        parser: PropertyParser,
    ) -> Self {
        Self {
            fragments,
            namespace,
            variables,
            parser,
        }
    }

    pub fn apply_includes(&self, document: &mut Document) -> Result<(), Error> {
        debug!(
            namespace = self.namespace,
            document = ?document.id(),
            "applying includes"
        );
        let root = document.root();
        self.apply(document, root, &self.variables, &mut Vec::new())
    }

    /// `chain` holds the fragment ids currently being expanded, outermost first.
    fn apply(
        &self,
        document: &mut Document,
        node: NodeId,
        scope: &Scope,
        chain: &mut Vec<String>,
    ) -> Result<(), Error> {
        match document.kind(node).clone() {
            NodeKind::Include { refid, properties } => {
                self.expand_include(document, node, &refid, &properties, scope, chain)
            }
            NodeKind::Element { .. } => {
                if !scope.is_empty() {
                    if let NodeKind::Element { attributes, .. } = document.kind_mut(node) {
                        for attribute in attributes.iter_mut() {
                            attribute.value = self.parser.parse(&attribute.value, scope)?;
                        }
                    }
                }
                // snapshot: grafted nodes replace includes in place and must not be revisited
                let children = document.children(node).to_vec();
                for child in children {
                    self.apply(document, child, scope, chain)?;
                }
                Ok(())
            }
            NodeKind::Text(text) => {
                if !scope.is_empty() {
                    let substituted = self.parser.parse(&text, scope)?;
                    *document.kind_mut(node) = NodeKind::Text(substituted);
                }
                Ok(())
            }
        }
    }

    fn expand_include(
        &self,
        document: &mut Document,
        include: NodeId,
        refid: &str,
        properties: &[Property],
        scope: &Scope,
        chain: &mut Vec<String>,
    ) -> Result<(), Error> {
        let refid = self.parser.parse(refid, scope)?;
        let refid = self.apply_current_namespace(&refid);
        if chain.contains(&refid) {
            return Err(Error::Builder(format!(
                "Circular include of '{refid}': {} -> {refid}",
                chain.join(" -> ")
            )));
        }
        let fragment = self.fragments.fragment(&refid).ok_or_else(|| {
            Error::IncompleteElement(format!(
                "Could not find SQL statement to include with refid '{refid}'"
            ))
        })?;
        let child_scope = self.child_scope(properties, scope)?;

        if fragment.document().id() != document.id() {
            debug!(refid = %refid, from = ?fragment.document().id(), "importing fragment from another document");
        }
        let copy = document.import_subtree(fragment.document(), fragment.node());
        chain.push(refid.clone());
        let expanded = self.apply(document, copy, &child_scope, chain);
        chain.pop();
        expanded?;
        document.replace_with_children(include, copy)?;
        trace!(refid = %refid, variables = child_scope.len(), "include expanded");
        Ok(())
    }

    fn child_scope(&self, properties: &[Property], inherited: &Scope) -> Result<Scope, Error> {
        let mut declared = BTreeMap::new();
        for property in properties {
            let value = self.parser.parse(&property.value, inherited)?;
            if declared.insert(property.name.clone(), value).is_some() {
                return Err(Error::Builder(format!(
                    "Variable {} defined twice in the same include definition",
                    property.name
                )));
            }
        }
        Ok(inherited.with_overrides(declared))
    }

    fn apply_current_namespace(&self, refid: &str) -> String {
        if refid.contains('.') || self.namespace.is_empty() {
            refid.to_string()
        } else {
            format!("{}.{}", self.namespace, refid)
        }
    }
}
