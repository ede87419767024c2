//! json-graft — extensible JSON value-graph serialization.
//!
//! Converts an in-memory value graph, including graphs with shared subtrees
//! and cycles, to flat JSON text and back, while an ordered list of
//! pluggable asynchronous [`Transform`] stages intercepts individual values
//! (binary payloads, error objects, remote-function proxies) without the
//! engine knowing those payload kinds.
//!
//! Three cooperating pieces:
//! - the tag codec (`json-graft-tag-codec`) embeds typed payloads inside
//!   ordinary JSON strings without ambiguity;
//! - the cycle resolver (`json-graft-core`) flattens shared/cyclic
//!   structure into path-reference tokens and restores it;
//! - the pipeline here drives every node through the stage list exactly
//!   once and speaks JSON text at the boundary.
//!
//! # Example
//!
//! ```
//! use futures_lite::future::block_on;
//! use json_graft::{parse, stringify, Node};
//!
//! // A graph with a shared subtree round-trips to one allocation.
//! let shared = Node::record([("v", Node::from(1i64))]);
//! let doc = Node::record([("a", shared.clone()), ("b", shared)]);
//!
//! let text = block_on(stringify(&doc, &[])).unwrap();
//! assert_eq!(text, r#"{"a":{"v":1},"b":"$ref:[\"a\"]"}"#);
//!
//! let back = block_on(parse(&text, &[])).unwrap();
//! let entries = back.entries();
//! assert!(entries[0].1.same(&entries[1].1));
//! ```

pub mod error;
pub mod pipeline;
pub mod transform;

pub use error::Error;
pub use json_graft_core::{cycle, path, CycleError, Node, NodeId, OpaqueValue};
pub use json_graft_tag_codec::{Decoded, PrefixCodec, TagCodecError};
pub use pipeline::{parse, stringify, stringify_pretty};
pub use transform::{BoxError, Transform};
