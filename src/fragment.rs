//! The per-fragment processor boundary.
//!
//! The actual aligner invocation that turns a raw read fragment into
//! base-call records is explicitly out of scope: this crate treats it
//! as an external collaborator and only needs a stable interface to drive
//! it from the refinement loop. [`FragmentProcessor`] is that interface;
//! production callers supply an implementation that shells out to the real
//! aligner, while tests can supply a fake that writes fixture base-call
//! files directly.
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::reference::Reference;

/// One unit of dispatched work: an input read fragment to be processed
/// against the current reference.
#[derive(Debug, Clone)]
pub struct FragmentInput {
    pub id: String,
    pub path: PathBuf,
}

/// Processes a single fragment against the current-iteration reference,
/// writing its base-call and read-counter output under `basecall_dir`.
///
/// `reference_path` is the current iteration's reference already written to
/// disk, read-only for the duration of the batch; implementations must not
/// write to it. Implementors decide their own output file naming; the
/// refinement driver only cares that matching files appear under
/// `basecall_dir` once every fragment in a batch has returned successfully.
pub trait FragmentProcessor: Sync {
    fn process(
        &self,
        fragment: &FragmentInput,
        reference: &Reference,
        reference_path: &Path,
        basecall_dir: &Path,
    ) -> Result<()>;
}

/// Drives an external per-fragment processor as a subprocess, invoked once
/// per fragment per iteration: `<program> --fragment <path> --reference
/// <path> --basecall-dir <dir>`. The CLI binary wires this up by default;
/// tests exercise the refinement driver against fakes instead.
pub struct ExternalCommandProcessor {
    pub program: PathBuf,
}

impl FragmentProcessor for ExternalCommandProcessor {
    fn process(
        &self,
        fragment: &FragmentInput,
        _reference: &Reference,
        reference_path: &Path,
        basecall_dir: &Path,
    ) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--fragment")
            .arg(&fragment.path)
            .arg("--reference")
            .arg(reference_path)
            .arg("--basecall-dir")
            .arg(basecall_dir)
            .status()
            .with_context(|| format!("spawning processor '{}' for fragment '{}'", self.program.display(), fragment.id))?;

        if !status.success() {
            bail!(
                "processor '{}' exited with {status} for fragment '{}'",
                self.program.display(),
                fragment.id
            );
        }
        Ok(())
    }
}
