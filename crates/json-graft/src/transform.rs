//! The pluggable stage contract.

use async_trait::async_trait;
use json_graft_core::Node;

/// Failure owned by a stage, surfaced verbatim as [`crate::Error::Stage`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One ordered encode/decode pipeline stage.
///
/// A stage declares applicability with `test_encode`/`test_decode` and
/// rewrites nodes with `encode`/`decode`. The defaults make a stage inert in
/// a direction it does not implement, so encode-only and decode-only stages
/// override a single pair.
///
/// Dispatch rule, owned by the pipeline and never re-implemented by
/// adapters: for each node the engine finds the first stage whose test
/// passes and applies it, then continues down the remaining list, applying
/// each later stage whose test passes on the current (possibly rewritten)
/// value. Invocations are strictly sequential; every stage observes the
/// fully awaited output of the previous one.
///
/// Futures are `?Send`: the engine is single-threaded and re-entrant, never
/// parallel, so stage-owned registries need no locks.
#[async_trait(?Send)]
pub trait Transform {
    /// Applicability test for the encode direction.
    fn test_encode(&self, _value: &Node, _key: &str) -> bool {
        false
    }

    /// Rewrites one node during encode.
    async fn encode(&self, value: Node, _key: &str) -> Result<Node, BoxError> {
        Ok(value)
    }

    /// Applicability test for the decode direction.
    fn test_decode(&self, _value: &Node, _key: &str) -> bool {
        false
    }

    /// Rewrites one node during decode. Runs only after every child of the
    /// node has fully resolved.
    async fn decode(&self, value: Node, _key: &str) -> Result<Node, BoxError> {
        Ok(value)
    }
}
