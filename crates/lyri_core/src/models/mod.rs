//! Data models for Lyri.
//!
//! - Enums for production modes, input keys, artifact kinds, stages and
//!   failure classes
//! - Task metadata and the per-run task plan

mod enums;
mod plan;

pub use enums::{
    AlignStrategy, ArtifactKind, AspectRatio, FailureKind, InputKey, ProductionMode, Stage,
    StemRole,
};
pub use plan::{TaskMetadata, TaskPlan};
