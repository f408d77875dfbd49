//! SQL template trees and the include expander.
//!
//! A [`Document`] is an arena: every node belongs to exactly one document
//! and is addressed by a [`NodeId`] that is only meaningful inside it.
//! Moving a subtree between documents always goes through
//! [`Document::import_subtree`], which deep-clones it into the destination.

mod include;
mod property_parser;

use std::sync::atomic::{AtomicU64, Ordering};

pub use include::*;
pub use property_parser::*;

use crate::Error;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A `name`/`value` variable declared inside an include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: Vec<Attribute>,
    },
    /// Reference to a fragment; `refid` is raw text that may contain `${}`.
    Include {
        refid: String,
        properties: Vec<Property>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-owned SQL template tree.
///
/// Clones keep the [`DocumentId`]: a clone is a snapshot of the same document.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Document {
    /// Creates a document whose root is an element with the given tag.
    pub fn new(root_tag: impl Into<String>) -> Self {
        Self::with_root_attributes(root_tag, Vec::new())
    }

    pub fn with_root_attributes(root_tag: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        let root = NodeData {
            kind: NodeKind::Element {
                tag: root_tag.into(),
                attributes,
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            id: DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed)),
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn kind_mut(&mut self, node: NodeId) -> &mut NodeKind {
        &mut self.nodes[node.0].kind
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.0 < self.nodes.len()
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: impl Into<String>,
        attributes: Vec<Attribute>,
    ) -> NodeId {
        self.append(
            parent,
            NodeKind::Element {
                tag: tag.into(),
                attributes,
            },
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.append(parent, NodeKind::Text(text.into()))
    }

    pub fn append_include(
        &mut self,
        parent: NodeId,
        refid: impl Into<String>,
        properties: Vec<Property>,
    ) -> NodeId {
        self.append(
            parent,
            NodeKind::Include {
                refid: refid.into(),
                properties,
            },
        )
    }

    fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.push_detached(kind);
        self.nodes[id.0].parent = Some(parent);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_detached(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Deep-clones `node` of `source` into this arena and returns the
    /// detached copy. `source` may be any document, including a snapshot of
    /// this one; no node is ever shared between arenas.
    pub fn import_subtree(&mut self, source: &Document, node: NodeId) -> NodeId {
        let copy = self.push_detached(source.kind(node).clone());
        for &child in source.children(node) {
            let child_copy = self.import_subtree(source, child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// Puts the children of `wrapper` where `target` sits in its parent,
    /// preserving order. `target` and `wrapper` end up detached.
    pub fn replace_with_children(&mut self, target: NodeId, wrapper: NodeId) -> Result<(), Error> {
        let parent = self.parent(target).ok_or_else(|| {
            Error::Builder("cannot replace a node that has no parent".to_string())
        })?;
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == target)
            .ok_or_else(|| Error::Builder("node is not a child of its parent".to_string()))?;
        let grafted = std::mem::take(&mut self.nodes[wrapper.0].children);
        for &child in &grafted {
            self.nodes[child.0].parent = Some(parent);
        }
        let siblings = &mut self.nodes[parent.0].children;
        siblings.remove(position);
        for (offset, child) in grafted.into_iter().enumerate() {
            siblings.insert(position + offset, child);
        }
        self.nodes[target.0].parent = None;
        self.nodes[wrapper.0].parent = None;
        Ok(())
    }

    /// Concatenated text of every text node below `node`, in document order.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element { .. } | NodeKind::Include { .. } => {
                for &child in self.children(node) {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Nodes reachable from the root, depth first.
    pub fn descendants(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    pub fn has_includes(&self) -> bool {
        self.descendants()
            .into_iter()
            .any(|n| matches!(self.kind(n), NodeKind::Include { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_copies_into_the_destination_arena() {
        let mut fragment = Document::new("sql");
        let root = fragment.root();
        fragment.append_text(root, "id, name");

        let mut target = Document::new("select");
        let copy = target.import_subtree(&fragment, fragment.root());
        assert_ne!(fragment.id(), target.id());
        assert_eq!(target.text_content(copy), "id, name");
        assert_eq!(target.parent(copy), None);

        if let NodeKind::Text(text) = target.kind_mut(target.children(copy)[0]) {
            text.push_str(", email");
        }
        assert_eq!(fragment.text_content(fragment.root()), "id, name");
    }

    #[test]
    fn replace_with_children_splices_in_place() {
        let mut doc = Document::new("select");
        let root = doc.root();
        doc.append_text(root, "select ");
        let include = doc.append_include(root, "cols", Vec::new());
        doc.append_text(root, " from t");

        let wrapper = doc.append_element(root, "sql", Vec::new());
        doc.append_text(wrapper, "a");
        doc.append_text(wrapper, ", b");
        // detach the wrapper from the root again; it stands in for an imported copy
        doc.nodes[root.0].children.pop();
        doc.nodes[wrapper.0].parent = None;

        doc.replace_with_children(include, wrapper).unwrap();
        assert_eq!(doc.text_content(root), "select a, b from t");
        assert_eq!(doc.children(root).len(), 4);
        assert!(!doc.has_includes());
    }

    #[test]
    fn replacing_a_detached_node_fails() {
        let mut doc = Document::new("sql");
        let root = doc.root();
        let wrapper = doc.push_detached(NodeKind::Text(String::new()));
        assert!(matches!(doc.replace_with_children(root, wrapper), Err(Error::Builder(_))));
    }
}
