//! Render error types.

use crate::compositor::{Extent, TargetId};

/// Fatal render-target and pipeline failures.
///
/// Any of these leaves the compositor unable to produce a trustworthy frame;
/// the frame driver stops on the first one it sees.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// A render target could not be created or resized.
    #[error("failed to allocate {target} target at {width}x{height}: {reason}")]
    Allocation {
        target: TargetId,
        width: u32,
        height: u32,
        reason: String,
    },

    /// A target's extent does not match the viewport.
    #[error("{target} target is {actual} but the viewport is {expected}")]
    StaleTarget {
        target: TargetId,
        expected: Extent,
        actual: Extent,
    },

    /// A pass or the composite referenced a target that was never created.
    #[error("{0} target does not exist")]
    MissingTarget(TargetId),

    /// An earlier frame or resize failed; a full resize must succeed first.
    #[error("compositor is broken by an earlier failed frame or resize; resize before rendering again")]
    Broken,

    /// The pass list is not a valid frame description.
    #[error("invalid render pipeline: {0}")]
    InvalidPipeline(String),

    /// Copying the output target back to the CPU failed.
    #[error("output readback failed: {0}")]
    Readback(String),
}
