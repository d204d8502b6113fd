//! Arena-backed document tree.
//!
//! The tree is the in-process stand-in for a rendered page: element nodes
//! carry a tag name, ordered attributes and ordered children, text nodes carry
//! a character run. Nodes are addressed by [`NodeId`] handles into the arena,
//! so detaching, re-parenting or splitting a node never invalidates a handle
//! another caller is holding. Detached nodes stay in the arena until they are
//! handed back with [`Document::release`], after which their slot is reused.
//!
//! Text lengths and offsets are counted in UTF-16 code units, the unit the
//! resolver reports symbol offsets in.
//!
//! Handles are only meaningful for the document that created them; passing a
//! foreign handle panics on the index.

use std::fmt::Write as _;

/// Handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Element payload: tag name plus attributes in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// True when the whitespace-separated `class` attribute contains `class`
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0:?} is not a text node")]
    NotText(NodeId),
    #[error("node {0:?} is not an element")]
    NotElement(NodeId),
    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },
    #[error("cannot insert {child:?} below itself or its descendant {parent:?}")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("split offset {offset} is past the end of a {len}-unit text node")]
    SplitOutOfRange { offset: usize, len: usize },
    #[error("node {0:?} is still attached or has children")]
    InUse(NodeId),
}

/// Mutable document tree with a single root element
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    free: Vec<NodeId>,
    root: NodeId,
}

impl Document {
    /// Create a document whose root element has the given tag
    pub fn new(root_tag: &str) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.create_element(root_tag);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Arena slots in use or waiting for reuse
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeKind::Element(Element {
            tag: tag.to_string(),
            attrs: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_string()))
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let data = NodeData {
            parent: None,
            children: Vec::new(),
            kind,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = data;
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    /// Hand a detached, childless node back for reuse. Its handle must not be
    /// used afterwards.
    pub fn release(&mut self, id: NodeId) -> Result<(), DomError> {
        if id == self.root || self.parent(id).is_some() || self.has_children(id) {
            return Err(DomError::InUse(id));
        }
        self.free.push(id);
        Ok(())
    }

    /// Create an element with attributes and attach it as the last child of `parent`
    pub fn append_element<'a>(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: impl IntoIterator<Item = (&'a str, String)>,
    ) -> NodeId {
        let id = self.create_element(tag);
        if let NodeKind::Element(element) = &mut self.nodes[id.0].kind {
            element.attrs = attrs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect();
        }
        self.attach_last(parent, id);
        id
    }

    /// Create a text node and attach it as the last child of `parent`
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.attach_last(parent, id);
        id
    }

    // Only valid for freshly created, detached nodes.
    fn attach_last(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text(_))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    /// Length of a text node in UTF-16 code units
    pub fn text_len(&self, id: NodeId) -> Option<usize> {
        self.text(id).map(|text| text.encode_utf16().count())
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            NodeKind::Element(element) => Some(element),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attr(name))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|element| element.has_class(class))
    }

    /// Set or overwrite an attribute, keeping the position of an existing one
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let NodeKind::Element(element) = &mut self.nodes[id.0].kind else {
            return Err(DomError::NotElement(id));
        };
        match element.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => element.attrs.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.nodes[id.0].children.is_empty()
    }

    fn element_siblings(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.parent(id)
            .map(|parent| self.children(parent))
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|&sibling| self.element(sibling).is_some())
    }

    /// Previous sibling that is an element, skipping text nodes
    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.element_siblings(id)
            .take_while(|&sibling| sibling != id)
            .last()
    }

    /// Element siblings that come before `id`, nearest last
    pub fn preceding_element_siblings(&self, id: NodeId) -> Vec<NodeId> {
        self.element_siblings(id)
            .take_while(|&sibling| sibling != id)
            .collect()
    }

    /// True when `id` is an element and no element sibling precedes it
    pub fn is_first_element_child(&self, id: NodeId) -> bool {
        self.element(id).is_some()
            && self.parent(id).is_some()
            && self.previous_element_sibling(id).is_none()
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.parent(node) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != child);
        }
    }

    fn position(&self, parent: NodeId, child: NodeId) -> Result<usize, DomError> {
        self.children(parent)
            .iter()
            .position(|&c| c == child)
            .ok_or(DomError::NotAChild { parent, child })
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.is_text(parent) {
            return Err(DomError::NotElement(parent));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(DomError::Cycle { parent, child });
        }
        Ok(())
    }

    /// Move `child` to the end of `parent`'s children, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insertable(parent, child)?;
        self.detach(child);
        self.attach_last(parent, child);
        Ok(())
    }

    /// Move `child` directly before `reference` in `parent`'s children
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError> {
        self.check_insertable(parent, child)?;
        self.position(parent, reference)?;
        if child == reference {
            return Ok(());
        }
        self.detach(child);
        let index = self.position(parent, reference)?;
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.position(parent, child)?;
        self.detach(child);
        Ok(())
    }

    /// Put `new` where `old` was; `old` ends up detached
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new: NodeId,
        old: NodeId,
    ) -> Result<(), DomError> {
        self.position(parent, old)?;
        if new == old {
            return Ok(());
        }
        self.check_insertable(parent, new)?;
        self.detach(new);
        let index = self.position(parent, old)?;
        self.nodes[parent.0].children[index] = new;
        self.nodes[new.0].parent = Some(parent);
        self.nodes[old.0].parent = None;
        Ok(())
    }

    /// Split a text node at a UTF-16 offset.
    ///
    /// The node keeps the text before `offset`; a new text node holding the
    /// remainder is returned and, when the node has a parent, inserted right
    /// after it. An offset inside a surrogate pair keeps the whole character
    /// in the head.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, DomError> {
        let NodeKind::Text(text) = &mut self.nodes[id.0].kind else {
            return Err(DomError::NotText(id));
        };
        let len = text.encode_utf16().count();
        if offset > len {
            return Err(DomError::SplitOutOfRange { offset, len });
        }
        let tail = text.split_off(utf16_to_byte(text, offset));

        let right = self.create_text(&tail);
        if let Some(parent) = self.parent(id) {
            let index = self.position(parent, id)?;
            self.nodes[parent.0].children.insert(index + 1, right);
            self.nodes[right.0].parent = Some(parent);
        }
        Ok(right)
    }

    /// Pre-order traversal starting at (and including) `id`
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![id],
        }
    }

    /// First attached element whose `id` attribute equals `value`
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .find(|&node| self.attr(node, "id") == Some(value))
    }

    /// Concatenated text of all text nodes under `id`
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .filter_map(|node| self.text(node))
            .collect()
    }

    /// Serialize the subtree rooted at `id` as HTML
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text(text) => out.push_str(&html_escape::encode_text(text)),
            NodeKind::Element(element) => {
                let _ = write!(out, "<{}", element.tag);
                for (name, value) in &element.attrs {
                    let _ = write!(
                        out,
                        " {name}=\"{}\"",
                        html_escape::encode_double_quoted_attribute(value)
                    );
                }
                out.push('>');
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{}>", element.tag);
            }
        }
    }
}

/// Byte index of the first character starting at or after UTF-16 `offset`
fn utf16_to_byte(text: &str, offset: usize) -> usize {
    let mut units = 0;
    for (index, ch) in text.char_indices() {
        if units >= offset {
            return index;
        }
        units += ch.len_utf16();
    }
    text.len()
}

/// Iterator returned by [`Document::descendants`]
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        self.stack.extend(self.doc.children(node).iter().rev().copied());
        Some(node)
    }
}
