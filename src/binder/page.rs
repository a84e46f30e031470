//! Minimal element tree standing in for a rendered schedule page.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Every attribute
//! write is recorded as an [`AttributeMutation`], tagged with who made it, and
//! kept until drained with [`Page::take_mutations`].

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationSource {
    /// Scripts or user agents other than the binder.
    Page,
    /// The bookmark binder reflecting model state.
    Binder,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeMutation {
    pub target: NodeId,
    pub attribute: String,
    pub old_value: Option<String>,
    pub source: MutationSource,
}

#[derive(Debug)]
struct Node {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, String>,
    classes: Vec<String>,
    disabled: bool,
}

impl Node {
    fn new(tag: &str, parent: Option<NodeId>) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            parent,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            classes: Vec::new(),
            disabled: false,
        }
    }
}

#[derive(Debug)]
pub struct Page {
    nodes: Vec<Node>,
    mutations: Vec<AttributeMutation>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// Creates a page holding only a `body` root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("body", None)],
            mutations: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn create_element(&mut self, parent: NodeId, tag: &str) -> Result<NodeId, PageError> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(tag, Some(parent)));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn tag(&self, node: NodeId) -> Result<&str, PageError> {
        Ok(&self.node(node)?.tag)
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>, PageError> {
        Ok(self.node(node)?.parent)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Result<Option<&str>, PageError> {
        Ok(self.node(node)?.attributes.get(name).map(String::as_str))
    }

    /// Sets an attribute on behalf of the page itself.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), PageError> {
        self.set_attribute_from(node, name, value, MutationSource::Page)
    }

    pub fn set_attribute_from(
        &mut self,
        node: NodeId,
        name: &str,
        value: &str,
        source: MutationSource,
    ) -> Result<(), PageError> {
        let old_value = self
            .node_mut(node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        self.mutations.push(AttributeMutation {
            target: node,
            attribute: name.to_string(),
            old_value,
            source,
        });
        Ok(())
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> Result<bool, PageError> {
        Ok(self.node(node)?.classes.iter().any(|c| c == class))
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<(), PageError> {
        let classes = &mut self.node_mut(node)?.classes;
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
        Ok(())
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) -> Result<(), PageError> {
        self.node_mut(node)?.classes.retain(|c| c != class);
        Ok(())
    }

    pub fn is_disabled(&self, node: NodeId) -> Result<bool, PageError> {
        Ok(self.node(node)?.disabled)
    }

    pub fn set_disabled(&mut self, node: NodeId, disabled: bool) -> Result<(), PageError> {
        self.node_mut(node)?.disabled = disabled;
        Ok(())
    }

    /// All elements carrying the class, in document order.
    pub fn query_by_class(&self, class: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.classes.iter().any(|c| c == class) {
                found.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }

    /// The node itself or its nearest ancestor carrying the attribute.
    pub fn closest_with_attribute(
        &self,
        node: NodeId,
        attribute: &str,
    ) -> Result<Option<NodeId>, PageError> {
        let mut current = Some(node);
        while let Some(id) = current {
            let node = self.node(id)?;
            if node.attributes.contains_key(attribute) {
                return Ok(Some(id));
            }
            current = node.parent;
        }
        Ok(None)
    }

    /// Drains the attribute mutations recorded so far, oldest first.
    pub fn take_mutations(&mut self) -> Vec<AttributeMutation> {
        std::mem::take(&mut self.mutations)
    }

    fn node(&self, id: NodeId) -> Result<&Node, PageError> {
        self.nodes.get(id.0).ok_or(PageError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, PageError> {
        self.nodes.get_mut(id.0).ok_or(PageError::UnknownNode(id))
    }
}
