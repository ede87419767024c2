//! The tagged value model: scalars, ordered containers, opaque leaves.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Number, Value};

/// A value the engine treats as a leaf: it is never traversed, cloned, or
/// rendered by the core. Transform stages downcast via [`OpaqueValue::as_any`]
/// to claim the payload kinds they understand.
pub trait OpaqueValue: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Identity of one container or opaque allocation, valid while some `Node`
/// handle keeps the allocation alive. Scalars have no identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One value within a graph being serialized.
///
/// Records and sequences are shared, interior-mutable allocations: cloning a
/// `Node` clones the handle, not the container, so a container may be
/// reachable via more than one path (shared reference) or be an ancestor of
/// itself (cycle). Record keys are unique and insertion order is significant.
#[derive(Debug, Clone)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Record(Rc<RefCell<IndexMap<String, Node>>>),
    Sequence(Rc<RefCell<Vec<Node>>>),
    Opaque(Rc<dyn OpaqueValue>),
}

impl Node {
    /// Builds a record from entries, preserving their order.
    pub fn record<K, I>(entries: I) -> Node
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        let map: IndexMap<String, Node> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Node::Record(Rc::new(RefCell::new(map)))
    }

    /// Builds a sequence from values.
    pub fn sequence<I: IntoIterator<Item = Node>>(values: I) -> Node {
        Node::Sequence(Rc::new(RefCell::new(values.into_iter().collect())))
    }

    /// Wraps an opaque leaf value.
    pub fn opaque<V: OpaqueValue>(value: V) -> Node {
        Node::Opaque(Rc::new(value))
    }

    /// The allocation identity of a container or opaque leaf; `None` for
    /// scalars, which are compared and processed by value.
    pub fn identity(&self) -> Option<NodeId> {
        match self {
            Node::Record(map) => Some(NodeId(Rc::as_ptr(map) as *const () as usize)),
            Node::Sequence(seq) => Some(NodeId(Rc::as_ptr(seq) as *const () as usize)),
            Node::Opaque(rc) => Some(NodeId(Rc::as_ptr(rc) as *const () as usize)),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Node::Record(_) | Node::Sequence(_))
    }

    /// Identity comparison for containers/opaques, value comparison for
    /// scalars. This is the "did a child change" test used by the cycle
    /// resolver and the pipeline; unlike `==` it never recurses.
    pub fn same(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Number(a), Node::Number(b)) => a == b,
            (Node::String(a), Node::String(b)) => a == b,
            (Node::Record(a), Node::Record(b)) => Rc::ptr_eq(a, b),
            (Node::Sequence(a), Node::Sequence(b)) => Rc::ptr_eq(a, b),
            (Node::Opaque(a), Node::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Snapshot of a container's entries; sequence entries are keyed by
    /// their decimal index so paths stay uniform. Empty for leaves.
    pub fn entries(&self) -> Vec<(String, Node)> {
        match self {
            Node::Record(map) => map
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Node::Sequence(seq) => seq
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Writes one container entry. Record writes insert or replace by key;
    /// sequence writes replace an existing index only. Writes to leaves or
    /// out-of-range indices are ignored.
    pub fn set_entry(&self, key: &str, value: Node) {
        match self {
            Node::Record(map) => {
                map.borrow_mut().insert(key.to_string(), value);
            }
            Node::Sequence(seq) => {
                if let Ok(index) = key.parse::<usize>() {
                    let mut seq = seq.borrow_mut();
                    if index < seq.len() {
                        seq[index] = value;
                    }
                }
            }
            _ => {}
        }
    }

    /// Copies a container one level deep into a fresh allocation; entries
    /// are shared handles. Leaves are returned as-is.
    pub fn shallow_copy(&self) -> Node {
        match self {
            Node::Record(map) => Node::Record(Rc::new(RefCell::new(map.borrow().clone()))),
            Node::Sequence(seq) => Node::Sequence(Rc::new(RefCell::new(seq.borrow().clone()))),
            other => other.clone(),
        }
    }

    /// Builds a fresh node tree from a JSON document. Object member order is
    /// preserved.
    pub fn from_json(value: &Value) -> Node {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n.clone()),
            Value::String(s) => Node::String(s.clone()),
            Value::Array(items) => Node::sequence(items.iter().map(Node::from_json)),
            Value::Object(members) => {
                Node::record(members.iter().map(|(k, v)| (k.clone(), Node::from_json(v))))
            }
        }
    }
}

/// Structural equality. Opaque leaves compare by identity. Only meaningful
/// for acyclic values; comparing a cyclic graph recurses forever.
impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Record(a), Node::Record(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
            }
            (Node::Sequence(a), Node::Sequence(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            _ => self.same(other),
        }
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Node {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Node {
        Node::Number(Number::from(value))
    }
}

impl From<u64> for Node {
    fn from(value: u64) -> Node {
        Node::Number(Number::from(value))
    }
}

impl From<Number> for Node {
    fn from(value: Number) -> Node {
        Node::Number(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Node {
        Node::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Node {
        Node::String(value)
    }
}
