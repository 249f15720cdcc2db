//! End-to-end exercise of the pipeline: a fake per-fragment processor
//! stands in for the external aligner/base-caller, and the full run is
//! driven through `ngs_consensus::run` exactly as the CLI binary would.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::tempdir;

use ngs_consensus::config::RunConfig;
use ngs_consensus::fragment::{FragmentInput, FragmentProcessor};
use ngs_consensus::reference::Reference;

/// Always reports every position as a perfect match to whatever reference
/// it was handed, so the refinement loop converges in one iteration.
struct PerfectCaller;

impl FragmentProcessor for PerfectCaller {
    fn process(
        &self,
        fragment: &FragmentInput,
        reference: &Reference,
        _reference_path: &Path,
        basecall_dir: &Path,
    ) -> Result<()> {
        let called = basecall_dir.join(format!("{}.called_bases", fragment.id));
        let mut file = fs::File::create(called)?;
        writeln!(file, "ref_pos\tread_base\tref_base\tread_id\toverlap\tquality")?;
        for pos in 1..=reference.len() {
            let base = reference.base_at(pos).unwrap() as char;
            for copy in 0..3 {
                writeln!(
                    file,
                    "{pos}\t{base}\t{base}\t{}-r{pos}-{copy}\t0\t35",
                    fragment.id
                )?;
            }
        }

        let counter = basecall_dir.join(format!("{}.read_counter", fragment.id));
        let mut counter_file = fs::File::create(counter)?;
        writeln!(counter_file, "read_id\tnumber_of_alignments")?;
        for pos in 1..=reference.len() {
            for copy in 0..3 {
                writeln!(counter_file, "{}-r{pos}-{copy}\t1", fragment.id)?;
            }
        }
        Ok(())
    }
}

fn write_reference(dir: &Path, sequence: &str) -> PathBuf {
    let path = dir.join("reference.fasta");
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, ">seed\n{sequence}").unwrap();
    path
}

#[test]
fn full_pipeline_converges_and_writes_expected_outputs() {
    let dir = tempdir().unwrap();
    let fragments_dir = dir.path().join("fragments");
    fs::create_dir_all(&fragments_dir).unwrap();
    fs::write(fragments_dir.join("fragment_a.fastq"), b"@placeholder\n").unwrap();
    fs::write(fragments_dir.join("fragment_b.fastq"), b"@placeholder\n").unwrap();

    let output_dir = dir.path().join("out");
    let reference_path = write_reference(dir.path(), "ACGT");

    let config = RunConfig::new(
        reference_path,
        fragments_dir.clone(),
        output_dir.clone(),
        1,
        0.5,
        true,
        5,
        Some(2),
        false,
    )
    .unwrap();

    let fragments = vec![
        FragmentInput {
            id: "fragment_a".to_string(),
            path: fragments_dir.join("fragment_a.fastq"),
        },
        FragmentInput {
            id: "fragment_b".to_string(),
            path: fragments_dir.join("fragment_b.fastq"),
        },
    ];

    ngs_consensus::run(&PerfectCaller, &fragments, &config).unwrap();

    let freqs = fs::read_to_string(output_dir.join("freqs.tsv")).unwrap();
    assert!(freqs.lines().count() > 1, "freqs.tsv should have a header and data rows");

    let consensus = fs::read_to_string(output_dir.join("consensus.fasta")).unwrap();
    assert!(consensus.contains("ACGT"));

    let aligned = fs::read_to_string(output_dir.join("consensus_aligned_to_ref.fasta")).unwrap();
    assert!(aligned.contains("ACGT"));

    assert!(output_dir.join("mutation_read_list.tsv").exists());
    let read_counter = fs::read_to_string(output_dir.join("read_counter.tsv")).unwrap();
    assert!(read_counter.lines().count() > 1);

    assert!(output_dir.join("read_id_prefixes.json").exists());
}

#[test]
fn rejects_nonexistent_reference_before_any_work_starts() {
    let dir = tempdir().unwrap();
    let fragments_dir = dir.path().join("fragments");
    fs::create_dir_all(&fragments_dir).unwrap();
    fs::write(fragments_dir.join("fragment_a.fastq"), b"@placeholder\n").unwrap();

    let result = RunConfig::new(
        dir.path().join("missing.fasta"),
        fragments_dir,
        dir.path().join("out"),
        1,
        0.5,
        true,
        5,
        None,
        false,
    );
    assert!(result.is_err());
}
