//! Engine error taxonomy.

use json_graft_core::CycleError;
use thiserror::Error;

use crate::transform::BoxError;

#[derive(Debug, Error)]
pub enum Error {
    /// A transform stage threw or rejected; surfaced verbatim, aborting the
    /// whole call. No partial text is ever returned.
    #[error("transform stage failed: {0}")]
    Stage(BoxError),

    /// Two or more independent sibling decode branches failed. Nested
    /// aggregates are flattened, so no concurrent failure is masked.
    #[error("aggregate failure: {} stage errors", .0.len())]
    Aggregate(Vec<Error>),

    /// Reference-token resolution or encoding failed.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// The text boundary rejected the document.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An opaque value reached the text boundary without any stage claiming
    /// it. JSON has no rendering for it, and dropping data is not an option.
    #[error("opaque value at {path:?} reached the text boundary")]
    OpaqueBoundary { path: Vec<String> },

    /// A stage output is its own ancestor. Only a misbehaving stage can
    /// produce this; flattening guarantees the engine itself never does.
    #[error("stage produced a cyclic value at {path:?}")]
    CyclicOutput { path: Vec<String> },
}
