//! # Aggregation Coordinator
//!
//! Runs once the refinement driver has converged (or exhausted its
//! iteration budget): concatenates auxiliary per-fragment records, builds
//! the mutation index, sums per-read alignment counters, and writes the
//! two final consensus FASTAs.
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use log::info;

use crate::basecall::{self, list_files_matching};
use crate::config::RunConfig;
use crate::consensus::{self, ConsensusMode};
use crate::freq::FreqTable;
use crate::mutation_index::MutationIndex;
use crate::prefix;

const CATEGORIES: [&str; 4] = [
    "called_bases",
    "ignored_bases",
    "suspicious_reads",
    "ignored_reads",
];

/// Finalizes a converged (or exhausted) run: writes `freqs.tsv`, both
/// consensus FASTAs, the mutation-read list, and the summed read counter,
/// and optionally runs the prefix compactor over auxiliary files first.
pub fn finalize(
    basecall_dir: &Path,
    reference_id: &str,
    table: &FreqTable,
    reference_len: usize,
    config: &RunConfig,
) -> Result<()> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory '{}'", config.output_dir.display()))?;

    concatenate_category(basecall_dir, "blast", &config.output_dir.join("blast.tsv"))?;

    if !config.cleanup {
        let auxiliary_files = list_files_matching(basecall_dir, |name| {
            CATEGORIES.iter().any(|category| name.contains(category))
        })?;
        let dict_path = config.output_dir.join("read_id_prefixes.json");
        prefix::compact(&auxiliary_files, &dict_path)?;

        for category in CATEGORIES {
            let output = config.output_dir.join(format!("{category}.tsv"));
            concatenate_category(basecall_dir, category, &output)?;
        }
    } else {
        info!("cleanup requested, skipping prefix compaction and category concatenation");
    }

    let bcr_files = basecall::list_called_bases_files(basecall_dir)?;
    let mutation_index = MutationIndex::build(&bcr_files)?;
    mutation_index.write_tsv(&config.output_dir.join("mutation_read_list.tsv"))?;

    let read_counters = aggregate_read_counters(basecall_dir)?;
    write_read_counters(&read_counters, &config.output_dir.join("read_counter.tsv"))?;

    table.write_tsv(&config.output_dir.join("freqs.tsv"))?;

    let aligned = consensus::build(
        reference_id,
        table,
        reference_len,
        config.min_coverage,
        config.min_frequency,
        ConsensusMode::ReferenceCoordinate,
    );
    aligned.write(&config.output_dir.join("consensus_aligned_to_ref.fasta"))?;

    let gap_free = consensus::build(
        reference_id,
        table,
        reference_len,
        config.min_coverage,
        config.min_frequency,
        ConsensusMode::GapFree,
    );
    gap_free.write(&config.output_dir.join("consensus.fasta"))?;

    if config.cleanup {
        remove_dir_with_retry(basecall_dir, 5)?;
    }

    Ok(())
}

/// Concatenates every file in `dir` whose name contains `category` into
/// `output`, keeping the header line only from the first file encountered.
fn concatenate_category(dir: &Path, category: &str, output: &Path) -> Result<()> {
    let files = list_files_matching(dir, |name| name.contains(category))?;
    let mut out = fs::File::create(output).with_context(|| format!("creating '{}'", output.display()))?;

    let mut wrote_header = false;
    for file in &files {
        let reader = BufReader::new(fs::File::open(file).with_context(|| format!("opening '{}'", file.display()))?);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if idx == 0 {
                if wrote_header {
                    continue;
                }
                wrote_header = true;
            }
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

/// Sums `number_of_alignments` across every read-counter file in `dir`,
/// grouped by `read_id`.
fn aggregate_read_counters(dir: &Path) -> Result<BTreeMap<String, u64>> {
    let files = list_files_matching(dir, |name| name.contains("read_counter"))?;
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();

    for file in files {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&file)
            .with_context(|| format!("opening '{}'", file.display()))?;
        for record in reader.deserialize::<ReadCounterRow>() {
            let row = record.with_context(|| format!("parsing '{}'", file.display()))?;
            *totals.entry(row.read_id).or_insert(0) += row.number_of_alignments;
        }
    }
    Ok(totals)
}

#[derive(Debug, serde::Deserialize)]
struct ReadCounterRow {
    read_id: String,
    number_of_alignments: u64,
}

fn write_read_counters(totals: &BTreeMap<String, u64>, path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(["read_id", "number_of_alignments"])?;
    for (read_id, count) in totals {
        writer.write_record([read_id.as_str(), &count.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Removes `dir` and its contents, retrying transient failures up to
/// `max_attempts` times before giving up silently; cleanup failures are
/// logged but never propagated.
fn remove_dir_with_retry(dir: &Path, max_attempts: usize) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match fs::remove_dir_all(dir) {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = Some(err);
                info!("cleanup attempt {attempt}/{max_attempts} for '{}' failed, retrying", dir.display());
            }
        }
    }
    if let Some(err) = last_err {
        info!(
            "giving up removing '{}' after {max_attempts} attempts: {err}",
            dir.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn dummy_config(output_dir: PathBuf, fragments_dir: PathBuf, reference: PathBuf) -> RunConfig {
        RunConfig::new(reference, fragments_dir, output_dir, 1, 0.5, true, 5, Some(2), false).unwrap()
    }

    #[test]
    fn finalize_writes_expected_outputs() {
        let dir = tempdir().unwrap();
        let basecall_dir = dir.path().join("basecall");
        fs::create_dir_all(&basecall_dir).unwrap();
        let fragments_dir = dir.path().join("fragments");
        fs::create_dir_all(&fragments_dir).unwrap();
        let output_dir = dir.path().join("out");

        let mut called = fs::File::create(basecall_dir.join("frag1.called_bases")).unwrap();
        writeln!(
            called,
            "ref_pos\tread_base\tref_base\tread_id\toverlap\tquality\n1\tA\tA\tread-1\t0\t30"
        )
        .unwrap();

        let mut counter = fs::File::create(basecall_dir.join("frag1.read_counter")).unwrap();
        writeln!(counter, "read_id\tnumber_of_alignments\nread-1\t2").unwrap();

        let reference_path = dir.path().join("ref.fasta");
        let mut f = fs::File::create(&reference_path).unwrap();
        writeln!(f, ">ref\nA").unwrap();
        let reference = Reference::load(&reference_path).unwrap();

        let table = crate::freq::aggregate(&[basecall_dir.join("frag1.called_bases")], &reference).unwrap();
        let config = dummy_config(output_dir.clone(), fragments_dir, reference_path);

        finalize(&basecall_dir, reference.id(), &table, reference.len(), &config).unwrap();

        assert!(output_dir.join("freqs.tsv").exists());
        assert!(output_dir.join("consensus.fasta").exists());
        assert!(output_dir.join("consensus_aligned_to_ref.fasta").exists());
        assert!(output_dir.join("mutation_read_list.tsv").exists());
        let read_counter = fs::read_to_string(output_dir.join("read_counter.tsv")).unwrap();
        assert!(read_counter.contains("read-1\t2"));
    }
}
