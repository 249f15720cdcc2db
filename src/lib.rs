//! Core of a variant-calling aggregation engine: turns many per-fragment
//! base-call streams into a per-position allele-frequency table and an
//! iteratively refined consensus sequence.
//!
//! The actual read alignment/base-calling step is treated as an external
//! collaborator (see [`fragment::FragmentProcessor`]); this crate owns
//! everything downstream of it: frequency aggregation, consensus
//! derivation, the refinement loop, read-id prefix compaction, and the
//! mutation index.
pub mod align;
pub mod base;
pub mod basecall;
pub mod cli;
pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod fragment;
pub mod freq;
pub mod mutation_index;
pub mod prefix;
pub mod reference;

use anyhow::Result;
use log::info;

use config::RunConfig;
use error::StageError;
use fragment::{FragmentInput, FragmentProcessor};
use reference::Reference;

/// Short human-readable result of a full run, for the CLI entry point to
/// print on success.
pub struct RunSummary {
    pub iterations_run: usize,
    pub converged: bool,
    pub final_score: Option<f64>,
    pub output_dir: std::path::PathBuf,
}

/// Runs the full pipeline: the iterative refinement loop followed by the
/// aggregation coordinator's finalization pass.
pub fn run<P: FragmentProcessor>(
    processor: &P,
    fragments: &[FragmentInput],
    config: &RunConfig,
) -> Result<RunSummary> {
    let reference = Reference::load(&config.reference).map_err(|e| StageError::new("reference-load", e))?;

    let basecall_dir = config.fragments_dir.clone();
    let outcome = driver::refine(processor, fragments, reference, config, &basecall_dir)
        .map_err(|e| StageError::new("refinement", e))?;

    info!(
        "refinement finished after {} iteration(s), converged={}",
        outcome.iterations_run, outcome.converged
    );

    let summary = RunSummary {
        iterations_run: outcome.iterations_run,
        converged: outcome.converged,
        final_score: outcome.scores.last().copied(),
        output_dir: config.output_dir.clone(),
    };

    let Some(table) = outcome.freq_table else {
        info!("no base-call records were ever produced; skipping aggregation");
        return Ok(summary);
    };

    coordinator::finalize(
        &basecall_dir,
        outcome.reference.id(),
        &table,
        outcome.reference.len(),
        config,
    )
    .map_err(|e| StageError::new("aggregation", e))?;

    Ok(summary)
}
