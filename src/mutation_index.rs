//! # Mutation→Reads Index Builder
//!
//! Inverts base calls into a `(position, base) -> set of reads` map, used
//! to answer "which reads support this call" without re-scanning every
//! fragment's raw output.
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;

use crate::base::{unscale_pos, Base, ScaledPos};
use crate::basecall;

/// `(ref_pos, read_base) -> read_ids`, merged across every fragment by
/// union of read-id sets. `BTreeSet` keeps each entry's read ids sorted,
/// which makes the serialized output deterministic.
#[derive(Debug, Default)]
pub struct MutationIndex {
    entries: BTreeMap<(ScaledPos, Base), BTreeSet<String>>,
}

impl MutationIndex {
    /// Builds the index by folding every base-call file in `bcr_files`,
    /// full-outer-join-merging on `(ref_pos, read_base)` and unioning the
    /// read-id sets.
    pub fn build(bcr_files: &[impl AsRef<Path>]) -> Result<Self> {
        let mut entries: BTreeMap<(ScaledPos, Base), BTreeSet<String>> = BTreeMap::new();
        for file in bcr_files {
            for record in basecall::read_records(file.as_ref())? {
                entries
                    .entry((record.ref_pos, record.read_base))
                    .or_default()
                    .insert(record.read_id);
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes `mutation_read_list.tsv`: `ref_pos, read_base, read_id`, the
    /// read_id column a semicolon-delimited serialization of the set.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        writer.write_record(["ref_pos", "read_base", "read_id"])?;
        for ((scaled_pos, base), read_ids) in &self.entries {
            let joined = read_ids.iter().cloned().collect::<Vec<_>>().join(";");
            writer.write_record([
                format!("{:.3}", unscale_pos(*scaled_pos)),
                base.to_string(),
                joined,
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fragment_file(rows: &[(f64, &str, &str)]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ref_pos\tread_base\tref_base\tread_id\toverlap\tquality").unwrap();
        for (pos, read_base, read_id) in rows {
            writeln!(file, "{pos}\t{read_base}\tA\t{read_id}\t0\t30").unwrap();
        }
        file
    }

    #[test]
    fn unions_read_ids_across_fragments() {
        let fragment_a = fragment_file(&[(1.0, "G", "read-1"), (1.0, "G", "read-2")]);
        let fragment_b = fragment_file(&[(1.0, "G", "read-3")]);
        let index = MutationIndex::build(&[fragment_a.path(), fragment_b.path()]).unwrap();

        assert_eq!(index.len(), 1);
        let read_ids = &index.entries[&(1000, Base::G)];
        assert_eq!(read_ids.len(), 3);
    }
}
