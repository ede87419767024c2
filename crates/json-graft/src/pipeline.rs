//! The asynchronous encode/decode pipeline.
//!
//! `stringify` flattens the graph, drives every node through the stage list
//! exactly once (breadth-first, parents before children), then renders JSON
//! text. `parse` decodes JSON text bottom-up (children fully resolved before
//! their parent's stages run), then restores shared/cyclic identity.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;

use json_graft_core::{cycle, Node, NodeId};
use serde_json::Value;

use crate::error::Error;
use crate::transform::Transform;

/// Serializes a value graph to JSON text.
///
/// With an empty stage list the output matches the native `serde_json`
/// encoder for cycle-free, sharing-free input. The first stage failure
/// aborts the call; no partial text is returned.
pub async fn stringify(value: &Node, stages: &[&dyn Transform]) -> Result<String, Error> {
    let staged = encode_graph(value, stages).await?;
    Ok(serde_json::to_string(&render(&staged)?)?)
}

/// Like [`stringify`], with human-readable indentation.
pub async fn stringify_pretty(value: &Node, stages: &[&dyn Transform]) -> Result<String, Error> {
    let staged = encode_graph(value, stages).await?;
    Ok(serde_json::to_string_pretty(&render(&staged)?)?)
}

/// Deserializes JSON text back into a value graph.
///
/// Sibling decode failures are collected, not short-circuited: one failure
/// re-raises directly, several combine into [`Error::Aggregate`].
pub async fn parse(text: &str, stages: &[&dyn Transform]) -> Result<Node, Error> {
    let document: Value = serde_json::from_str(text)?;
    let node = Node::from_json(&document);
    let decoded = if stages.is_empty() {
        node
    } else {
        decode_node(node, String::new(), stages).await?
    };
    Ok(cycle::restore(&decoded)?)
}

async fn encode_graph(value: &Node, stages: &[&dyn Transform]) -> Result<Node, Error> {
    let replaced = cycle::replace(value)?;
    if stages.is_empty() {
        return Ok(replaced);
    }
    EncodePass {
        stages,
        memo: HashMap::new(),
        queue: VecDeque::new(),
    }
    .run(&replaced)
    .await
}

struct EncodePass<'a> {
    stages: &'a [&'a dyn Transform],
    /// Already-produced replacements keyed by the original node identity;
    /// guarantees at-most-once staging per identity and lets one shared
    /// node, transformed once, appear at every original occurrence.
    memo: HashMap<NodeId, Node>,
    /// Breadth-first work queue: (staged parent, key, raw child).
    queue: VecDeque<(Node, String, Node)>,
}

impl EncodePass<'_> {
    async fn run(mut self, root: &Node) -> Result<Node, Error> {
        let out = self.process("", root).await?;
        while let Some((parent, key, child)) = self.queue.pop_front() {
            let memoized = child.identity().and_then(|id| self.memo.get(&id).cloned());
            let staged = match memoized {
                Some(hit) => hit,
                None => self.process(&key, &child).await?,
            };
            parent.set_entry(&key, staged);
        }
        Ok(out)
    }

    /// Applies the stage list to one node. Container results are rebuilt
    /// into fresh allocations — the caller's containers are never mutated —
    /// and their entries are scheduled; opaque and scalar results are
    /// leaves.
    async fn process(&mut self, key: &str, raw: &Node) -> Result<Node, Error> {
        let staged = apply_stages(raw.clone(), key, self.stages, Direction::Encode).await?;
        let result = if staged.is_container() {
            let fresh = staged.shallow_copy();
            for (child_key, child) in fresh.entries() {
                self.queue.push_back((fresh.clone(), child_key, child));
            }
            fresh
        } else {
            staged
        };
        if let Some(id) = raw.identity() {
            self.memo.insert(id, result.clone());
        }
        Ok(result)
    }
}

/// Bottom-up decode: children first, sequentially, collecting their failures
/// rather than stopping at the first; then this node's own stages.
fn decode_node<'a>(
    value: Node,
    key: String,
    stages: &'a [&'a dyn Transform],
) -> Pin<Box<dyn Future<Output = Result<Node, Error>> + 'a>> {
    Box::pin(async move {
        if value.is_container() {
            let mut failures: Vec<Error> = Vec::new();
            for (child_key, child) in value.entries() {
                match decode_node(child.clone(), child_key.clone(), stages).await {
                    Ok(decoded) => {
                        if !child.same(&decoded) {
                            value.set_entry(&child_key, decoded);
                        }
                    }
                    Err(Error::Aggregate(nested)) => failures.extend(nested),
                    Err(failure) => failures.push(failure),
                }
            }
            if failures.len() == 1 {
                return Err(failures.remove(0));
            }
            if failures.len() > 1 {
                return Err(Error::Aggregate(failures));
            }
        }
        apply_stages(value, &key, stages, Direction::Decode).await
    })
}

#[derive(Clone, Copy)]
enum Direction {
    Encode,
    Decode,
}

/// The dispatch rule: first applicable stage, then continue down the
/// remaining list, testing each against the current value. Declared order
/// in both directions; each result is fully awaited before the next stage.
async fn apply_stages(
    value: Node,
    key: &str,
    stages: &[&dyn Transform],
    direction: Direction,
) -> Result<Node, Error> {
    let test = |stage: &dyn Transform, value: &Node| match direction {
        Direction::Encode => stage.test_encode(value, key),
        Direction::Decode => stage.test_decode(value, key),
    };
    let Some(first) = stages.iter().position(|stage| test(*stage, &value)) else {
        return Ok(value);
    };
    let mut current = value;
    for (index, stage) in stages.iter().enumerate().skip(first) {
        if index == first || test(*stage, &current) {
            current = match direction {
                Direction::Encode => stage.encode(current, key).await,
                Direction::Decode => stage.decode(current, key).await,
            }
            .map_err(Error::Stage)?;
        }
    }
    Ok(current)
}

/// Renders a staged, flattened graph as a JSON document. Shared (diamond)
/// results render at each occurrence; a true cycle means a stage misbehaved
/// and is rejected rather than recursed into.
fn render(node: &Node) -> Result<Value, Error> {
    let mut path = Vec::new();
    let mut visiting = HashSet::new();
    render_at(node, &mut path, &mut visiting)
}

fn render_at(
    node: &Node,
    path: &mut Vec<String>,
    visiting: &mut HashSet<NodeId>,
) -> Result<Value, Error> {
    // Mark containers as in-progress; revisiting one means a stage spliced
    // a node into its own subtree.
    let guard = node.identity().filter(|_| node.is_container());
    if let Some(id) = guard {
        if !visiting.insert(id) {
            return Err(Error::CyclicOutput { path: path.clone() });
        }
    }
    let rendered = match node {
        Node::Null => Value::Null,
        Node::Bool(b) => Value::Bool(*b),
        Node::Number(n) => Value::Number(n.clone()),
        Node::String(s) => Value::String(s.clone()),
        Node::Opaque(_) => return Err(Error::OpaqueBoundary { path: path.clone() }),
        Node::Record(map) => {
            let mut out = serde_json::Map::with_capacity(map.borrow().len());
            for (key, child) in map.borrow().iter() {
                path.push(key.clone());
                let rendered = render_at(child, path, visiting)?;
                path.pop();
                out.insert(key.clone(), rendered);
            }
            Value::Object(out)
        }
        Node::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.borrow().len());
            for (index, child) in seq.borrow().iter().enumerate() {
                path.push(index.to_string());
                let rendered = render_at(child, path, visiting)?;
                path.pop();
                out.push(rendered);
            }
            Value::Array(out)
        }
    };
    if let Some(id) = guard {
        visiting.remove(&id);
    }
    Ok(rendered)
}
