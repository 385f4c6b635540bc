//! Lifecycle hook pipeline.
//!
//! Runs a content type's hooks in a fixed order around a store write or a
//! response, stopping at the first failure.

mod pipeline;

pub use pipeline::{HookStage, PipelineError, WriteOp, run_after_response, run_response, run_write};
