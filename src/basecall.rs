//! # Base-Call Record Reader
//!
//! Iterates the tab-separated per-base records produced by the external
//! aligner/caller. One file corresponds to one fragment's output for one
//! refinement iteration.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use log::debug;
use serde::Deserialize;

use crate::base::{scale_pos, Base, ScaledPos};
use crate::error::PipelineError;

/// Raw row shape of a base-call TSV, matching the external per-fragment
/// processor's output columns exactly.
#[derive(Debug, Clone, Deserialize)]
struct RawBaseCallRecord {
    ref_pos: f64,
    read_base: String,
    ref_base: String,
    read_id: String,
    overlap: u32,
    quality: u32,
}

/// A single base-call observation, with `read_base`/`ref_base` already
/// validated and parsed.
#[derive(Debug, Clone)]
pub struct BaseCallRecord {
    pub ref_pos: ScaledPos,
    pub read_base: Base,
    pub read_id: String,
    pub overlap: u32,
    pub quality: u32,
}

/// Reads every record of the base-call file at `path`, validating each row
/// as it is parsed. A malformed row (missing column, unknown base) aborts
/// the whole stream with the offending file and line number attached.
pub fn read_records(path: &Path) -> Result<Vec<BaseCallRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("opening base-call file '{}'", path.display()))?;

    let mut records = Vec::new();
    // Row 1 is the header; data rows start at line 2.
    let mut line = 1usize;
    for result in reader.deserialize::<RawBaseCallRecord>() {
        line += 1;
        let raw = result.map_err(|source| PipelineError::MalformedRecord {
            file: path.to_path_buf(),
            line,
            reason: source.to_string(),
        })?;

        let read_base = Base::parse_call(&raw.read_base).map_err(|e| PipelineError::MalformedRecord {
            file: path.to_path_buf(),
            line,
            reason: e.to_string(),
        })?;
        Base::parse_reference(&raw.ref_base).map_err(|e| PipelineError::MalformedRecord {
            file: path.to_path_buf(),
            line,
            reason: e.to_string(),
        })?;

        records.push(BaseCallRecord {
            ref_pos: scale_pos(raw.ref_pos),
            read_base,
            read_id: raw.read_id,
            overlap: raw.overlap,
            quality: raw.quality,
        });
    }

    debug!("read {} record(s) from '{}'", records.len(), path.display());
    Ok(records)
}

/// Whether `path` has no data rows beyond its header. Used by the prefix
/// compactor and the aggregation coordinator to skip empty files silently.
pub fn is_empty_data_file(path: &Path) -> Result<bool> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("opening '{}'", path.display()))?;
    Ok(reader.records().next().is_none())
}

/// Lists base-call files produced in `dir`, i.e. files whose name indicates
/// base-call origin (`*called_bases*`). Other auxiliary files (ignored
/// reads, suspicious reads, blast, read counters) are listed separately by
/// the coordinator.
pub fn list_called_bases_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files_matching(dir, |name| name.contains("called_bases"))
}

/// Whether `file_name` indicates base-call origin: these files are
/// rewritten by the prefix compactor preserving the `ref_pos` index
/// column, unlike other auxiliary files.
pub fn is_basecall_file_name(file_name: &str) -> bool {
    file_name.ends_with("bases")
}

pub(crate) fn list_files_matching(
    dir: &Path,
    predicate: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading directory '{}'", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if predicate(name) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn reads_well_formed_records() {
        let file = write_fixture(
            "ref_pos\tread_base\tref_base\tread_id\toverlap\tquality\n\
             1\tG\tA\tread-1\t0\t30\n\
             1\tG\tA\tread-2\t0\t30\n",
        );
        let records = read_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ref_pos, 1000);
        assert_eq!(records[0].read_base, Base::G);
    }

    #[test]
    fn rejects_unknown_base_with_line_number() {
        let file = write_fixture(
            "ref_pos\tread_base\tref_base\tread_id\toverlap\tquality\n\
             1\tX\tA\tread-1\t0\t30\n",
        );
        let err = read_records(file.path()).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn detects_empty_data_file() {
        let file = write_fixture("ref_pos\tread_base\tref_base\tread_id\toverlap\tquality\n");
        assert!(is_empty_data_file(file.path()).unwrap());
    }

    #[test]
    fn basecall_file_name_matches_bases_suffix() {
        assert!(is_basecall_file_name("fragment1.called_bases"));
        assert!(is_basecall_file_name("fragment1.ignored_bases"));
        assert!(!is_basecall_file_name("fragment1.suspicious_reads"));
    }
}
