//! Root-relative path lookup over node graphs.

use crate::node::Node;

/// Check if a string is a valid non-negative sequence index.
///
/// Leading zeros are rejected except for `"0"` itself, so every in-range
/// index has exactly one spelling.
pub fn is_valid_index(index: &str) -> bool {
    if index.is_empty() {
        return false;
    }
    let bytes = index.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_digit())
}

/// Walk `root` through each key in order: records by member key, sequences
/// by decimal index. Returns `None` if any step fails to resolve or lands in
/// a leaf.
///
/// # Example
///
/// ```
/// use json_graft_core::{path, Node};
///
/// let doc = Node::record([("a", Node::sequence([Node::from("x")]))]);
/// let hit = path::get(&doc, &["a".to_string(), "0".to_string()]).unwrap();
/// assert_eq!(hit, Node::from("x"));
/// assert!(path::get(&doc, &["a".to_string(), "1".to_string()]).is_none());
/// ```
pub fn get(root: &Node, path: &[String]) -> Option<Node> {
    let mut current = root.clone();
    for step in path {
        let next = match &current {
            Node::Record(map) => map.borrow().get(step).cloned(),
            Node::Sequence(seq) => {
                if !is_valid_index(step) {
                    return None;
                }
                let index: usize = step.parse().ok()?;
                seq.borrow().get(index).cloned()
            }
            _ => None,
        };
        current = next?;
    }
    Some(current)
}
