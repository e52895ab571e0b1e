//! Stage contracts: separate, align, compose.
//!
//! Each stage either produces all of its outputs or none of them, and
//! reports failure as one `StageError` variant. Engines are behind traits
//! so tests and alternative backends can be swapped in.

pub mod align;
pub mod compose;
mod errors;
pub mod separate;

pub use align::{aligner_from_settings, write_subtitles, AlignRequest, Aligner, AlignmentOutcome};
pub use compose::{
    build_filter_graph, Background, ComposeOutcome, ComposeRequest, Composer, FfmpegComposer,
};
pub use errors::{StageEnv, StageError, StageResult};
pub use separate::{
    install_stems, select_stems, CommandSeparator, EngineStem, PooledEngine, SeparationEngine,
    SeparatorPool,
};
