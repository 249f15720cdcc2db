//! # Reference Loader
//!
//! Reads a single-record reference FASTA into memory. A reference is
//! immutable for the duration of one refinement iteration; the driver
//! constructs a new one from each iteration's consensus.
use std::path::Path;

use anyhow::{bail, Context, Result};
use bio::io::fasta;

use crate::error::PipelineError;

/// An in-memory reference sequence, 1-indexed for the purposes of the rest
/// of the pipeline even though storage is the usual 0-indexed byte slice.
#[derive(Debug, Clone)]
pub struct Reference {
    id: String,
    sequence: Vec<u8>,
}

impl Reference {
    /// Reads the reference FASTA at `path`. The file must contain exactly
    /// one record; anything else is an input-validation error.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = fasta::Reader::from_file(path)
            .with_context(|| format!("opening reference FASTA '{}'", path.display()))?;

        let mut records = reader.records();
        let first = records
            .next()
            .with_context(|| format!("reference FASTA '{}' is empty", path.display()))??;

        if records.next().is_some() {
            let mut count = 2;
            for record in records {
                record?;
                count += 1;
            }
            bail!(PipelineError::MultiRecordReference {
                path: path.to_path_buf(),
                count,
            });
        }

        Ok(Self {
            id: first.id().to_string(),
            sequence: first.seq().to_vec(),
        })
    }

    /// Builds a reference directly from a sequence, used by the refinement
    /// driver to feed back a consensus as the next iteration's reference.
    pub fn from_sequence(id: String, sequence: Vec<u8>) -> Self {
        Self { id, sequence }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Number of positions, L, in 1..=L.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// The reference base at 1-indexed position `pos`.
    pub fn base_at(&self, pos: usize) -> Option<u8> {
        self.sequence.get(pos.checked_sub(1)?).copied()
    }

    /// Writes this reference out as a single-record FASTA, used when the
    /// refinement driver persists an intermediate reference for inspection.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = fasta::Writer::to_file(path)
            .with_context(|| format!("opening '{}' for writing", path.display()))?;
        writer
            .write(&self.id, None, &self.sequence)
            .with_context(|| format!("writing reference to '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_single_record() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ">chr_test\nACGT").unwrap();
        let reference = Reference::load(file.path()).unwrap();
        assert_eq!(reference.id(), "chr_test");
        assert_eq!(reference.len(), 4);
        assert_eq!(reference.base_at(1), Some(b'A'));
        assert_eq!(reference.base_at(4), Some(b'T'));
        assert_eq!(reference.base_at(5), None);
    }

    #[test]
    fn rejects_multi_record_fasta() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ">one\nACGT\n>two\nTTTT").unwrap();
        let err = Reference::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("2"));
    }
}
