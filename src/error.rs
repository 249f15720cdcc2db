//! # Error taxonomy
//!
//! Structured variants for the failure classes a caller might want to
//! pattern-match on: input validation, data-shape errors in base-call
//! streams, and invalid configuration. Worker-processing failures propagate
//! as plain `anyhow::Error` with fragment context attached at the call site,
//! since there's nothing to match on beyond "something downstream failed".
use std::path::PathBuf;

use thiserror::Error;

/// A fatal error raised by any pipeline stage.
///
/// Stage-local code should prefer `anyhow::Context` for ad-hoc messages and
/// reach for these variants only when a caller needs to pattern-match on the
/// failure class (e.g. the CLI's exit-code mapping).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("reference FASTA '{path}' contains {count} records, expected exactly 1")]
    MultiRecordReference { path: PathBuf, count: usize },

    #[error("no fragment files found in '{dir}'")]
    EmptyFragmentsDir { dir: PathBuf },

    #[error("output directory '{path}' already exists and is not empty")]
    NonEmptyOutputDir { path: PathBuf },

    #[error("{file}:{line}: {reason}")]
    MalformedRecord {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("unknown base '{symbol}' ({context})")]
    UnknownBase { symbol: String, context: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Tags a fatal error with the pipeline stage it originated in, matching the
/// "structured error containing stage name and cause" requirement on the CLI
/// boundary. Intermediate layers should propagate with `anyhow::Context`;
/// only the outermost boundary (the CLI binary) needs to reach for this.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: &'static str,
    #[source]
    pub source: anyhow::Error,
}

impl StageError {
    pub fn new(stage: &'static str, source: anyhow::Error) -> Self {
        Self { stage, source }
    }
}
