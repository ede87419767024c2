//! Graph flattening and restoration.
//!
//! [`replace`] converts a possibly-cyclic, possibly-shared node graph into
//! an acyclic tree: the second and later occurrences of any container or
//! opaque leaf become reference tokens carrying the path of the first visit.
//! [`restore`] reverses this by resolving each token against the live root,
//! rebuilding shared and cyclic identity.
//!
//! Reference tokens ride inside ordinary JSON strings via the tag codec, so
//! literal strings that happen to look like tokens survive a round trip.

use std::collections::HashMap;

use json_graft_tag_codec::{Decoded, PrefixCodec, TagCodecError};
use thiserror::Error;

use crate::node::{Node, NodeId};
use crate::path;

/// Prefix reserved for reference tokens.
pub const REFERENCE_PREFIX: &str = "$ref:";
/// Escape character for literal strings colliding with the prefix.
pub const REFERENCE_ESCAPE: char = '_';

#[derive(Debug, Error)]
pub enum CycleError {
    /// A reference token's path does not lead to a live node. Data-integrity
    /// failure; the whole parse is aborted.
    #[error("reference path {path:?} does not resolve to a value")]
    Unresolved { path: Vec<String> },
    #[error("malformed reference token")]
    Token(#[from] TagCodecError),
}

fn reference_codec() -> PrefixCodec<Vec<String>> {
    PrefixCodec::new(REFERENCE_PREFIX, REFERENCE_ESCAPE)
}

/// Flattens shared references and cycles into reference tokens.
///
/// Pure: the input graph is never mutated. Subtrees untouched by sharing or
/// cycles are returned by handle, not copied; a container is cloned only
/// when at least one child's processed value differs from the original.
///
/// # Example
///
/// ```
/// use json_graft_core::{cycle, Node};
///
/// let root = Node::record([("a", Node::from(1i64))]);
/// root.set_entry("self", root.clone());
/// let flat = cycle::replace(&root).unwrap();
/// let (_, token) = flat.entries().pop().unwrap();
/// assert_eq!(token, Node::from("$ref:[]"));
/// ```
pub fn replace(root: &Node) -> Result<Node, CycleError> {
    let codec = reference_codec();
    let mut state = ReplaceState {
        first_visit: HashMap::new(),
        tokens: HashMap::new(),
        codec,
    };
    let mut path = Vec::new();
    state.replace(root, &mut path)
}

struct ReplaceState {
    /// Identity of every node visited once, with its first-visit path. The
    /// path is fixed at first visit and never recomputed.
    first_visit: HashMap<NodeId, Vec<String>>,
    /// Reference tokens already produced, so third and later visits converge
    /// to the same token without re-encoding.
    tokens: HashMap<NodeId, Node>,
    codec: PrefixCodec<Vec<String>>,
}

impl ReplaceState {
    fn replace(&mut self, value: &Node, path: &mut Vec<String>) -> Result<Node, CycleError> {
        let Some(id) = value.identity() else {
            return Ok(match value {
                Node::String(s) => Node::String(self.codec.encode_str(s)),
                other => other.clone(),
            });
        };

        if let Some(token) = self.tokens.get(&id) {
            return Ok(token.clone());
        }
        if let Some(seen_at) = self.first_visit.get(&id) {
            // Second visit: a cycle through an ancestor, or a shared subtree
            // reached again. Emit the first-visit path instead of recursing.
            let token = Node::String(self.codec.encode_payload(seen_at)?);
            self.tokens.insert(id, token.clone());
            return Ok(token);
        }
        self.first_visit.insert(id, path.clone());

        if !value.is_container() {
            // Opaque leaf: never traversed, but it has an identity, so a
            // second occurrence still collapses into a reference token.
            return Ok(value.clone());
        }

        let entries = value.entries();
        let mut replaced = Vec::with_capacity(entries.len());
        let mut changed = false;
        for (key, child) in entries {
            path.push(key.clone());
            let new_child = self.replace(&child, path)?;
            path.pop();
            if !child.same(&new_child) {
                changed = true;
            }
            replaced.push((key, new_child));
        }
        if !changed {
            return Ok(value.clone());
        }
        Ok(match value {
            Node::Sequence(_) => Node::sequence(replaced.into_iter().map(|(_, v)| v)),
            _ => Node::record(replaced),
        })
    }
}

/// Restores shared and cyclic identity encoded by [`replace`].
///
/// Mutates the input in place in a single depth-first walk and returns it.
/// A container's identity is memoized immediately on entry, so a reference
/// encountered while recursing into its own subtree already resolves to the
/// live, in-progress container. Tokens are only ever emitted for nodes
/// earlier in document order, which is what makes the single pass correct:
/// the referenced position already holds its final identity at lookup time.
pub fn restore(root: &Node) -> Result<Node, CycleError> {
    let codec = reference_codec();
    let mut state = RestoreState {
        seen: HashMap::new(),
        strings: HashMap::new(),
        codec,
    };
    state.restore(root, root)
}

struct RestoreState {
    /// Containers already entered, keyed by identity; the stored handles
    /// also keep the allocations (and their addresses) alive for the call.
    seen: HashMap<NodeId, Node>,
    /// Decode cache keyed by the literal string value. Two distinct nodes
    /// carrying the same literal share one entry; decoding is idempotent so
    /// this is observationally safe, but a decode stage with side effects
    /// would see one invocation for N occurrences.
    strings: HashMap<String, Node>,
    codec: PrefixCodec<Vec<String>>,
}

impl RestoreState {
    fn restore(&mut self, value: &Node, root: &Node) -> Result<Node, CycleError> {
        let Some(id) = value.identity() else {
            if let Node::String(s) = value {
                return self.restore_string(s, root);
            }
            return Ok(value.clone());
        };
        if let Some(hit) = self.seen.get(&id) {
            return Ok(hit.clone());
        }
        self.seen.insert(id, value.clone());

        for (key, child) in value.entries() {
            let restored = self.restore(&child, root)?;
            if !child.same(&restored) {
                value.set_entry(&key, restored);
            }
        }
        Ok(value.clone())
    }

    fn restore_string(&mut self, s: &str, root: &Node) -> Result<Node, CycleError> {
        if let Some(hit) = self.strings.get(s) {
            return Ok(hit.clone());
        }
        let restored = match self.codec.decode(s)? {
            Decoded::Literal(literal) => Node::String(literal),
            Decoded::Payload(path) => {
                path::get(root, &path).ok_or(CycleError::Unresolved { path })?
            }
        };
        self.strings.insert(s.to_string(), restored.clone());
        Ok(restored)
    }
}
