//! Cfg document - an append-only node arena addressed by opaque handles.
//!
//! Nodes reference each other by [`NodeHandle`] only. Reading or writing a
//! node goes through a short-lived access guard, and the arena refuses to grow
//! while any guard is alive.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::num::NonZeroU32;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use derive_more::{Deref, From};
use lumen_core::collections::SmallVec;
use lumen_core::log::{error, warn};

static NEXT_DOCUMENT_ID: AtomicU32 = AtomicU32::new(1);

/// A name slice into the parsed text, `[A-Za-z_][A-Za-z0-9_.$-]*` or empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deref, From)]
pub struct Identifier<'a>(&'a str);

impl<'a> Identifier<'a> {
    pub fn new(value: &'a str) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// An empty filter matches every identifier.
    pub fn matches_filter(&self, filter: &str) -> bool {
        filter.is_empty() || self.0 == filter
    }

    pub fn is_valid_first_char(c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_'
    }

    pub fn is_valid_middle_char(c: u8) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, b'_' | b'.' | b'$' | b'-')
    }
}

impl PartialEq<str> for Identifier<'_> {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Invalid,
    String,
    Number,
    Boolean,
    Binary,
}

/// A positional or attribute value.
///
/// Numbers keep their source text; converting them is up to the consumer
/// through [`Literal::to_number`]. Binary values are recognized but carry no
/// payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Literal<'a> {
    #[default]
    Invalid,
    String(&'a str),
    Number(&'a str),
    Boolean(bool),
    Binary,
}

impl<'a> Literal<'a> {
    pub fn kind(&self) -> LiteralKind {
        match self {
            Literal::Invalid => LiteralKind::Invalid,
            Literal::String(_) => LiteralKind::String,
            Literal::Number(_) => LiteralKind::Number,
            Literal::Boolean(_) => LiteralKind::Boolean,
            Literal::Binary => LiteralKind::Binary,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Literal::Invalid)
    }

    /// Text of a string, or the unparsed source text of a number.
    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            Literal::String(text) | Literal::Number(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Literal::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_number<T: FromStr>(&self) -> Option<T> {
        match *self {
            Literal::Number(text) => text.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub name: Identifier<'a>,
    pub value: Literal<'a>,
}

pub type Values<'a> = SmallVec<[Literal<'a>; 2]>;
pub type Attributes<'a> = SmallVec<[Attribute<'a>; 2]>;

/// Opaque reference to a node of one specific [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    document: u32,
    // Arena index + 1.
    slot: NonZeroU32,
}

impl NodeHandle {
    fn index(&self) -> usize {
        self.slot.get() as usize - 1
    }
}

#[derive(Debug, Clone, Default)]
pub struct Node<'a> {
    pub name: Identifier<'a>,
    pub values: Values<'a>,
    pub attributes: Attributes<'a>,
    pub next: Option<NodeHandle>,
    pub previous: Option<NodeHandle>,
    pub first_child: Option<NodeHandle>,
    pub parent: Option<NodeHandle>,
}

impl<'a> Node<'a> {
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    /// Last attribute called `name`, if any.
    pub fn attribute(&self, name: &str) -> Option<Literal<'a>> {
        self.attributes
            .iter()
            .rev()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value)
    }
}

/// Owns every node of a parsed text. Not thread-safe.
pub struct Document<'a> {
    id: u32,
    nodes: RefCell<Vec<Node<'a>>>,
    outstanding_accesses: Cell<usize>,
    root: NodeHandle,
}

impl<'a> Document<'a> {
    /// Create a document holding only its root node.
    pub fn new() -> Self {
        let id = NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            nodes: RefCell::new(vec![Node::default()]),
            outstanding_accesses: Cell::new(0),
            root: NodeHandle { document: id, slot: NonZeroU32::MIN },
        }
    }

    #[inline]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Number of nodes in the arena, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Number of access guards currently alive.
    pub fn outstanding_accesses(&self) -> usize {
        self.outstanding_accesses.get()
    }

    /// Append a default node to the arena.
    ///
    /// Refused with an error log while any node access is outstanding.
    pub fn create_node(&self) -> Option<NodeHandle> {
        if self.outstanding_accesses.get() != 0 {
            error!(
                "Cannot create a node while {} node access(es) are still outstanding",
                self.outstanding_accesses.get()
            );
            return None;
        }

        let mut nodes = self.nodes.borrow_mut();
        let slot = u32::try_from(nodes.len() + 1).ok().and_then(NonZeroU32::new)?;
        nodes.push(Node::default());
        Some(NodeHandle { document: self.id, slot })
    }

    /// Clear a node slot and unlink it from its siblings and parent.
    ///
    /// The slot itself stays in the arena so other handles remain valid.
    pub fn destroy_node(&self, handle: NodeHandle) -> bool {
        if handle == self.root {
            error!("The root node cannot be destroyed");
            return false;
        }
        if self.outstanding_accesses.get() != 0 {
            error!("Cannot destroy a node while node accesses are outstanding");
            return false;
        }
        let mut nodes = self.nodes.borrow_mut();
        let Some(index) = self.resolve(handle, nodes.len()) else {
            return false;
        };
        let node = std::mem::take(&mut nodes[index]);

        if let Some(previous) = node.previous {
            nodes[previous.index()].next = node.next;
        } else if let Some(parent) = node.parent {
            nodes[parent.index()].first_child = node.next;
        }
        if let Some(next) = node.next {
            nodes[next.index()].previous = node.previous;
        }

        let mut child = node.first_child;
        while let Some(handle) = child {
            nodes[handle.index()].parent = None;
            child = nodes[handle.index()].next;
        }
        true
    }

    pub fn begin_node_access(&self, handle: NodeHandle) -> Option<NodeAccess<'_, 'a>> {
        let Ok(nodes) = self.nodes.try_borrow() else {
            error!("Node {:?} is being modified elsewhere", handle);
            return None;
        };
        let index = self.resolve(handle, nodes.len())?;

        self.outstanding_accesses.set(self.outstanding_accesses.get() + 1);
        Some(NodeAccess {
            document: self,
            node: Ref::map(nodes, |nodes| &nodes[index]),
        })
    }

    pub fn begin_node_access_mut(&self, handle: NodeHandle) -> Option<NodeAccessMut<'_, 'a>> {
        let Ok(nodes) = self.nodes.try_borrow_mut() else {
            error!("Node {:?} is already accessed elsewhere", handle);
            return None;
        };
        let index = self.resolve(handle, nodes.len())?;

        self.outstanding_accesses.set(self.outstanding_accesses.get() + 1);
        Some(NodeAccessMut {
            document: self,
            node: RefMut::map(nodes, |nodes| &mut nodes[index]),
        })
    }

    /// Explicit counterpart of dropping an access guard.
    pub fn end_node_access<A: EndAccess>(&self, access: A) {
        drop(access);
    }

    fn release_access(&self) {
        match self.outstanding_accesses.get() {
            0 => warn!("Ended a node access that was never begun"),
            count => self.outstanding_accesses.set(count - 1),
        }
    }

    fn resolve(&self, handle: NodeHandle, len: usize) -> Option<usize> {
        if handle.document != self.id {
            error!("Node handle {:?} belongs to another document", handle);
            return None;
        }

        let index = handle.index();
        if index >= len {
            error!("Node handle {:?} is out of range", handle);
            return None;
        }
        Some(index)
    }

    fn read<R>(&self, handle: NodeHandle, f: impl FnOnce(&Node<'a>) -> R) -> Option<R> {
        let node = self.begin_node_access(handle)?;
        Some(f(&node))
    }

    pub fn name(&self, handle: NodeHandle) -> Option<Identifier<'a>> {
        self.read(handle, |node| node.name)
    }

    pub fn values(&self, handle: NodeHandle) -> Values<'a> {
        self.read(handle, |node| node.values.clone()).unwrap_or_default()
    }

    pub fn attributes(&self, handle: NodeHandle) -> Attributes<'a> {
        self.read(handle, |node| node.attributes.clone()).unwrap_or_default()
    }

    /// Value of the last attribute called `name`.
    pub fn attribute(&self, handle: NodeHandle, name: &str) -> Option<Literal<'a>> {
        self.read(handle, |node| node.attribute(name)).flatten()
    }

    pub fn next(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.read(handle, |node| node.next).flatten()
    }

    pub fn previous(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.read(handle, |node| node.previous).flatten()
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.read(handle, |node| node.parent).flatten()
    }

    pub fn first_child(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.read(handle, |node| node.first_child).flatten()
    }

    pub fn children(&self, handle: NodeHandle) -> Children<'_, 'a> {
        Children {
            document: self,
            next: self.first_child(handle),
        }
    }

    pub fn root_children(&self) -> Children<'_, 'a> {
        self.children(self.root)
    }

    /// First direct child of `handle` whose name matches `name`.
    pub fn find_child(&self, handle: NodeHandle, name: &str) -> Option<NodeHandle> {
        self.children(handle)
            .find(|&child| self.name(child).is_some_and(|child_name| child_name.matches_filter(name)))
    }

    /// Drop every node past the first `len` slots. Refused while accesses are open.
    pub(crate) fn truncate(&self, len: usize) -> bool {
        if self.outstanding_accesses.get() != 0 {
            error!("Cannot truncate the node arena while {} node access(es) are open", self.outstanding_accesses.get());
            return false;
        }
        match self.nodes.try_borrow_mut() {
            Ok(mut nodes) => {
                nodes.truncate(len.max(1));
                true
            }
            Err(_) => {
                error!("Cannot truncate the node arena while it is borrowed");
                false
            }
        }
    }
}

impl Default for Document<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("node_count", &self.node_count())
            .finish()
    }
}

/// Marker for the access guards accepted by [`Document::end_node_access`].
pub trait EndAccess {}

impl EndAccess for NodeAccess<'_, '_> {}
impl EndAccess for NodeAccessMut<'_, '_> {}

/// Shared access to one node. Keeps the arena from growing while alive.
pub struct NodeAccess<'d, 'a> {
    document: &'d Document<'a>,
    node: Ref<'d, Node<'a>>,
}

impl<'a> Deref for NodeAccess<'_, 'a> {
    type Target = Node<'a>;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl Drop for NodeAccess<'_, '_> {
    fn drop(&mut self) {
        self.document.release_access();
    }
}

/// Exclusive access to one node.
pub struct NodeAccessMut<'d, 'a> {
    document: &'d Document<'a>,
    node: RefMut<'d, Node<'a>>,
}

impl<'a> Deref for NodeAccessMut<'_, 'a> {
    type Target = Node<'a>;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl DerefMut for NodeAccessMut<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.node
    }
}

impl Drop for NodeAccessMut<'_, '_> {
    fn drop(&mut self) {
        self.document.release_access();
    }
}

/// Iterator over a sibling list, following `next` links.
pub struct Children<'d, 'a> {
    document: &'d Document<'a>,
    next: Option<NodeHandle>,
}

impl Iterator for Children<'_, '_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.document.next(current);
        Some(current)
    }
}
