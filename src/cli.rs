//! # Command line interface
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::config::RunConfig;

#[derive(Parser)]
#[command(
    name = "ngs-consensus",
    author,
    version,
    about = "Per-position allele frequency aggregation and iterative consensus refinement",
    long_about = None
)]
pub struct Cli {
    /// Reference FASTA. Must contain exactly one record.
    #[arg(long)]
    pub reference: PathBuf,

    /// Directory holding per-fragment base-call/read-counter/blast files
    /// for the current iteration; the external per-fragment processor is
    /// expected to (re)populate it on each call.
    #[arg(long)]
    pub fragments_dir: PathBuf,

    /// Destination for freqs.tsv, both consensus FASTAs, the prefix
    /// dictionary, the mutation-read list, and the summed read counter.
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Minimum coverage for a position to avoid N-masking in the consensus.
    #[arg(long, default_value_t = 1, value_parser = non_negative_u32)]
    pub min_coverage: u32,

    /// Minimum frequency for a position's majority base to avoid
    /// N-masking in the consensus.
    #[arg(long, default_value_t = 0.5, value_parser = unit_interval_f64)]
    pub min_frequency: f64,

    /// Whether to carry the consensus forward in reference-coordinate mode
    /// (keeping deletion gaps).
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub align_to_ref: bool,

    /// Maximum number of refinement iterations to run before accepting the
    /// last consensus.
    #[arg(long, default_value_t = 10, value_parser = at_least_one)]
    pub max_basecall_iterations: usize,

    /// Number of worker threads to use per iteration. Defaults to all
    /// available CPUs when unset.
    #[arg(long, value_parser = at_least_one)]
    pub cpu_count: Option<usize>,

    /// When set, skip the prefix compactor and delete intermediate
    /// directories once the run finishes.
    #[arg(long, default_value_t = false)]
    pub cleanup: bool,

    /// Path to the external per-fragment processor (aligner/base-caller)
    /// invoked once per fragment per iteration. Out of scope for this
    /// crate; it only needs to accept `--fragment --reference
    /// --basecall-dir` and populate `basecall_dir` accordingly.
    #[arg(long)]
    pub processor_cmd: PathBuf,
}

impl Cli {
    pub fn into_config(self) -> Result<RunConfig> {
        RunConfig::new(
            self.reference,
            self.fragments_dir,
            self.output_dir,
            self.min_coverage,
            self.min_frequency,
            self.align_to_ref,
            self.max_basecall_iterations,
            self.cpu_count,
            self.cleanup,
        )
    }
}

fn non_negative_u32(s: &str) -> Result<u32> {
    s.parse().context("could not parse value as a non-negative integer")
}

fn unit_interval_f64(s: &str) -> Result<f64> {
    let value: f64 = s.parse().context("could not parse value as a float")?;
    if !(0.0..=1.0).contains(&value) {
        bail!("value must be between 0 and 1, got {value}");
    }
    Ok(value)
}

fn at_least_one(s: &str) -> Result<usize> {
    let value: usize = s.parse().context("could not parse value as an integer")?;
    if value < 1 {
        bail!("value must be at least 1");
    }
    Ok(value)
}
