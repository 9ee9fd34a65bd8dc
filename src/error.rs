use std::path::PathBuf;

use thiserror::Error;

use crate::state::Stage;

// ---------------------------------------------------------------------------
// Pipeline error taxonomy
// ---------------------------------------------------------------------------

/// Every way a visualization run can fail.  All variants are terminal: the
/// run stops at the stage that raised it and no artifact is written.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file {0} not found")]
    NotFound(PathBuf),

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("no concepts to visualize")]
    EmptyDataset,

    #[error(
        "record {index} has {found} vector words but the first record has {expected}"
    )]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("not enough concepts for the embedding: need at least 2, found {found}")]
    InsufficientData { found: usize },

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot move pipeline from {from:?} to {to:?}")]
    InvalidTransition { from: Stage, to: Stage },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
