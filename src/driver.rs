//! # Iterative Refinement Driver
//!
//! Runs the external per-fragment processor in parallel, re-derives a
//! consensus, and decides whether another iteration is warranted.
//! Fragments within an iteration may complete in any order; iterations
//! themselves are strictly sequential, each gated on the prior iteration's
//! fan-in barrier.
use log::{info, warn};

use anyhow::{Context, Result};

use crate::align;
use crate::basecall;
use crate::config::RunConfig;
use crate::consensus::{self, ConsensusMode};
use crate::dispatch;
use crate::fragment::{FragmentInput, FragmentProcessor};
use crate::freq::{self, FreqTable};
use crate::reference::Reference;

/// The terminal state of the refinement loop: the final reference (the
/// last consensus fed back, or the initial reference if no iteration ever
/// produced records), the per-iteration score history, and whether
/// convergence (score = 1.0) was reached before `max_basecall_iterations`.
pub struct RefinementOutcome {
    pub reference: Reference,
    pub freq_table: Option<FreqTable>,
    pub scores: Vec<f64>,
    pub iterations_run: usize,
    pub converged: bool,
}

/// Runs the bounded dispatch-aggregate-score iteration loop, feeding each
/// iteration's consensus back in as the next reference until the score
/// converges or the iteration budget runs out.
pub fn refine<P: FragmentProcessor>(
    processor: &P,
    fragments: &[FragmentInput],
    mut reference: Reference,
    config: &RunConfig,
    basecall_dir: &std::path::Path,
) -> Result<RefinementOutcome> {
    let mut scores = Vec::new();
    let mut last_table = None;

    for iteration in 1..=config.max_basecall_iterations {
        info!(
            "basecall iteration {iteration}/{}",
            config.max_basecall_iterations
        );

        let reference_path = basecall_dir.join("reference.iteration.fasta");
        reference
            .write(&reference_path)
            .with_context(|| format!("writing iteration {iteration} reference"))?;

        dispatch::dispatch(fragments, config.cpu_count, |fragment| {
            processor
                .process(fragment, &reference, &reference_path, basecall_dir)
                .with_context(|| format!("processing fragment '{}'", fragment.id))
        })?;

        let bcr_files = basecall::list_called_bases_files(basecall_dir)?;
        if bcr_files.is_empty() {
            warn!("no base-call records produced in iteration {iteration}, stopping without a score");
            return Ok(RefinementOutcome {
                reference,
                freq_table: last_table,
                scores,
                iterations_run: iteration,
                converged: false,
            });
        }

        let iteration_mode = if config.align_to_ref {
            ConsensusMode::ReferenceCoordinate
        } else {
            ConsensusMode::GapFree
        };
        let table = freq::aggregate(&bcr_files, &reference)?;
        let consensus = consensus::build(
            reference.id(),
            &table,
            reference.len(),
            config.min_coverage,
            config.min_frequency,
            iteration_mode,
        );

        let score = align::score(&consensus.sequence, reference.sequence());
        info!("iteration {iteration} alignment score: {score:.4}");
        scores.push(score);
        last_table = Some(table);

        // The numerator/denominator of the alignment score produce exactly
        // 1.0 iff the sequences are identical, so an exact comparison is
        // the intended convergence test (no epsilon needed).
        if score == 1.0 {
            return Ok(RefinementOutcome {
                reference,
                freq_table: last_table,
                scores,
                iterations_run: iteration,
                converged: true,
            });
        }

        reference = Reference::from_sequence(reference.id().to_string(), consensus.sequence);
    }

    Ok(RefinementOutcome {
        reference,
        freq_table: last_table,
        scores,
        iterations_run: config.max_basecall_iterations,
        converged: false,
    })
}
