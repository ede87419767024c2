//! json-graft-core — the value-graph model and cycle resolver.
//!
//! A [`Node`] is one value in a graph being serialized: a scalar, an
//! insertion-ordered record, a sequence, or an opaque leaf the engine never
//! traverses. Containers are reference-counted, so a graph may share
//! subtrees or contain cycles; [`cycle::replace`] flattens such a graph into
//! an acyclic tree of path-reference tokens and [`cycle::restore`] rebuilds
//! the shared/cyclic identities.

pub mod cycle;
pub mod node;
pub mod path;

pub use cycle::{replace, restore, CycleError, REFERENCE_ESCAPE, REFERENCE_PREFIX};
pub use node::{Node, NodeId, OpaqueValue};
