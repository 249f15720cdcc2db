//! # Run configuration
//!
//! [`RunConfig`] is the single source of truth for the knobs recognized by
//! the core. It is built once from parsed CLI flags and never re-read
//! mid-run; invalid combinations are rejected at construction time, so a
//! run fails fast before any work starts rather than partway through.
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::error::PipelineError;

/// Validated, immutable run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub reference: PathBuf,
    pub fragments_dir: PathBuf,
    pub output_dir: PathBuf,
    pub min_coverage: u32,
    pub min_frequency: f64,
    /// Whether each iteration's feedback consensus keeps reference-coordinate
    /// gaps (deletions as `-`) or is built gap-free before being fed back as
    /// the next reference.
    pub align_to_ref: bool,
    pub max_basecall_iterations: usize,
    pub cpu_count: Option<usize>,
    pub cleanup: bool,
}

impl RunConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: PathBuf,
        fragments_dir: PathBuf,
        output_dir: PathBuf,
        min_coverage: u32,
        min_frequency: f64,
        align_to_ref: bool,
        max_basecall_iterations: usize,
        cpu_count: Option<usize>,
        cleanup: bool,
    ) -> Result<Self> {
        if max_basecall_iterations == 0 {
            bail!(PipelineError::InvalidConfig(
                "max_basecall_iterations must be >= 1".to_string()
            ));
        }
        if !(0.0..=1.0).contains(&min_frequency) {
            bail!(PipelineError::InvalidConfig(
                "min_frequency must be in [0, 1]".to_string()
            ));
        }
        if let Some(0) = cpu_count {
            bail!(PipelineError::InvalidConfig(
                "cpu_count must be >= 1 when set".to_string()
            ));
        }
        validate_preexisting_paths(&reference, &fragments_dir, &output_dir)?;

        Ok(Self {
            reference,
            fragments_dir,
            output_dir,
            min_coverage,
            min_frequency,
            align_to_ref,
            max_basecall_iterations,
            cpu_count,
            cleanup,
        })
    }
}

fn validate_preexisting_paths(reference: &Path, fragments_dir: &Path, output_dir: &Path) -> Result<()> {
    if !reference.is_file() {
        bail!(PipelineError::InvalidConfig(format!(
            "reference '{}' does not exist",
            reference.display()
        )));
    }
    if !fragments_dir.is_dir() {
        bail!(PipelineError::InvalidConfig(format!(
            "fragments directory '{}' does not exist",
            fragments_dir.display()
        )));
    }
    if output_dir.exists() {
        let has_entries = std::fs::read_dir(output_dir)?.next().is_some();
        if has_entries {
            bail!(PipelineError::NonEmptyOutputDir {
                path: output_dir.to_path_buf(),
            });
        }
    }
    Ok(())
}
