//! Document abstraction and an in-memory document over `ego_tree`
//!
//! The core only touches the live document through [`Document`]. Hosts
//! embedding flagcache implement it over their own tree; [`Dom`] is the
//! implementation used by the CLI and the tests.

use ego_tree::{NodeRef, Tree};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Opaque node identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(ego_tree::NodeId);

/// Node type as seen by the batcher and parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
}

/// Replacement content for a text node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Image { class: String, alt: String, src: String },
}

/// Kind of change carried by a [`MutationRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    CharacterData,
    Attributes,
}

/// A single document-change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
}

/// Document shared between the batcher, the resolver and fetch tasks
pub type SharedDocument = Arc<Mutex<dyn Document>>;

/// Live document operations required by the core
pub trait Document: Send {
    /// The node scans start from (the body)
    fn root(&self) -> NodeId;

    fn kind(&self, node: NodeId) -> Option<NodeKind>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn tag_name(&self, node: NodeId) -> Option<&str>;

    fn text(&self, node: NodeId) -> Option<&str>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);

    /// `root` and everything below it, in document order
    fn descendants(&self, root: NodeId) -> Vec<NodeId>;

    /// Replace a text node in place with the given fragments
    fn replace_text(&mut self, node: NodeId, fragments: Vec<Fragment>);

    /// Whether the node is still reachable from the root
    fn is_attached(&self, node: NodeId) -> bool {
        self.contains(self.root(), node)
    }

    /// Inclusive ancestry check: a node contains itself
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn text_nodes_within(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.kind(*id) == Some(NodeKind::Text))
            .collect()
    }

    fn elements_with_class(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| {
                self.attribute(*id, "class")
                    .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
            })
            .collect()
    }

    /// Attached placeholders with `class` whose `alt` is `original_text`
    fn placeholders_with_text(&self, class: &str, original_text: &str) -> Vec<NodeId> {
        self.elements_with_class(self.root(), class)
            .into_iter()
            .filter(|id| self.attribute(*id, "alt") == Some(original_text))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
}

impl Payload {
    fn element(tag: &str) -> Self {
        Payload::Element {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    fn from_fragment(fragment: Fragment) -> Self {
        match fragment {
            Fragment::Text(text) => Payload::Text(text),
            Fragment::Image { class, alt, src } => Payload::Element {
                tag: "img".to_string(),
                attributes: BTreeMap::from([
                    ("draggable".to_string(), "false".to_string()),
                    ("class".to_string(), class),
                    ("alt".to_string(), alt),
                    ("src".to_string(), src),
                ]),
            },
        }
    }
}

/// In-memory document tree rooted at a `body` element
///
/// Nodes are never freed: removing one only detaches it, so a stale
/// [`NodeId`] still resolves and reports itself as detached.
#[derive(Debug, Clone)]
pub struct Dom {
    tree: Tree<Payload>,
}

impl Dom {
    pub fn new() -> Self {
        Self {
            tree: Tree::new(Payload::element("body")),
        }
    }

    /// Wrap in the shared handle the core expects
    pub fn into_shared(self) -> Arc<Mutex<Dom>> {
        Arc::new(Mutex::new(self))
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        NodeId(self.tree.orphan(Payload::element(tag)).id())
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        NodeId(self.tree.orphan(Payload::Text(text.to_string())).id())
    }

    /// Append `child` under `parent`, moving it if already attached
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> MutationRecord {
        if parent != child {
            if let Some(mut node) = self.tree.get_mut(parent.0) {
                node.append_id(child.0);
            }
        }
        MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
            added_nodes: vec![child],
        }
    }

    /// Detach a node from its parent
    pub fn remove(&mut self, node: NodeId) -> Option<MutationRecord> {
        let parent = self.parent(node)?;
        self.tree.get_mut(node.0)?.detach();
        Some(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
            added_nodes: Vec::new(),
        })
    }

    /// Replace the contents of a text node
    pub fn set_text(&mut self, node: NodeId, text: &str) -> Option<MutationRecord> {
        let mut target = self.tree.get_mut(node.0)?;
        match target.value() {
            Payload::Text(current) => {
                *current = text.to_string();
                Some(MutationRecord {
                    kind: MutationKind::CharacterData,
                    target: node,
                    added_nodes: Vec::new(),
                })
            }
            Payload::Element { .. } => None,
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .get(node.0)
            .map(|n| n.children().map(|child| NodeId(child.id())).collect())
            .unwrap_or_default()
    }

    /// Concatenated text below a node
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|id| self.text(id))
            .collect()
    }

    /// Serialize a subtree as HTML
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(node) = self.tree.get(node.0) {
            write_html(node, &mut out);
        }
        out
    }
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Document for Dom {
    fn root(&self) -> NodeId {
        NodeId(self.tree.root().id())
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.tree.get(node.0).map(|n| match n.value() {
            Payload::Element { .. } => NodeKind::Element,
            Payload::Text(_) => NodeKind::Text,
        })
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.get(node.0)?.parent().map(|p| NodeId(p.id()))
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        match self.tree.get(node.0)?.value() {
            Payload::Element { tag, .. } => Some(tag),
            Payload::Text(_) => None,
        }
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match self.tree.get(node.0)?.value() {
            Payload::Text(text) => Some(text),
            Payload::Element { .. } => None,
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.tree.get(node.0)?.value() {
            Payload::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            Payload::Text(_) => None,
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(mut target) = self.tree.get_mut(node.0) {
            if let Payload::Element { attributes, .. } = target.value() {
                attributes.insert(name.to_string(), value.to_string());
            }
        }
    }

    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        self.tree
            .get(root.0)
            .map(|n| n.descendants().map(|d| NodeId(d.id())).collect())
            .unwrap_or_default()
    }

    fn replace_text(&mut self, node: NodeId, fragments: Vec<Fragment>) {
        if self.parent(node).is_none() {
            return;
        }
        let Some(mut target) = self.tree.get_mut(node.0) else {
            return;
        };

        for fragment in fragments {
            target.insert_before(Payload::from_fragment(fragment));
        }
        target.detach();
    }
}

fn write_html(node: NodeRef<'_, Payload>, out: &mut String) {
    match node.value() {
        Payload::Text(text) => out.push_str(&html_escape::encode_text(text)),
        Payload::Element { tag, attributes } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                out.push_str(&format!(
                    " {}=\"{}\"",
                    name,
                    html_escape::encode_double_quoted_attribute(value)
                ));
            }
            if is_void(tag) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in node.children() {
                write_html(child, out);
            }
            out.push_str(&format!("</{}>", tag));
        }
    }
}

fn is_void(tag: &str) -> bool {
    matches!(tag, "img" | "br" | "hr" | "input" | "meta" | "link")
}
