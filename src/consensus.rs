//! # Consensus Builder
//!
//! Derives a consensus FASTA from an allele-frequency table, either keeping
//! reference-coordinate gaps (`-`) or stripping them for a gap-free
//! nucleotide sequence.
use std::path::Path;

use anyhow::{Context, Result};
use bio::io::fasta;

use crate::base::{is_insertion, scale_pos, Base};
use crate::freq::FreqTable;

/// Selects which of the two output layouts the consensus builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusMode {
    /// Keep `-` deletions so output-position `i` corresponds to
    /// reference-position `i`.
    ReferenceCoordinate,
    /// Strip `-` characters, yielding a pure nucleotide sequence.
    GapFree,
}

/// A derived consensus sequence, still carrying the id it should be written
/// under (the originating reference's id is reused).
#[derive(Debug, Clone)]
pub struct Consensus {
    pub id: String,
    pub sequence: Vec<u8>,
}

/// Builds a consensus sequence from `table` over `reference_len` positions.
///
/// For each integer position, the AFR row with `base_rank = 0` is chosen
/// (ties broken deterministically by `Base`'s declared ordering, matching
/// the seeding order); positions falling below `min_coverage` or
/// `min_frequency`, or with no candidate row at all, are masked as `N`.
/// Insertions are included only when their own frequency exceeds 0.5 and
/// the coverage at their integer position clears `min_coverage`.
pub fn build(
    id: &str,
    table: &FreqTable,
    reference_len: usize,
    min_coverage: u32,
    min_frequency: f64,
    mode: ConsensusMode,
) -> Consensus {
    let mut sequence = Vec::with_capacity(reference_len);

    for pos in 1..=reference_len as i64 {
        sequence.push(emit_integer_position(table, pos, min_coverage, min_frequency));
        sequence.extend(emit_insertions(table, pos, min_coverage));
    }

    if mode == ConsensusMode::GapFree {
        sequence.retain(|&b| b != b'-');
    }

    Consensus {
        id: id.to_string(),
        sequence,
    }
}

fn emit_integer_position(table: &FreqTable, pos: i64, min_coverage: u32, min_frequency: f64) -> u8 {
    let coverage = table.coverage_at(pos);
    let candidate = table.rows.iter().find(|r| {
        scale_pos(r.ref_pos) == pos * 1000 && r.base_rank == 0
    });

    match candidate {
        Some(row) if coverage >= min_coverage && row.frequency >= min_frequency => row.read_base.as_char() as u8,
        _ => b'N',
    }
}

fn emit_insertions(table: &FreqTable, pos: i64, min_coverage: u32) -> Vec<u8> {
    let coverage = table.coverage_at(pos);
    if coverage < min_coverage {
        return Vec::new();
    }

    let mut insertions: Vec<(i64, Base)> = table
        .rows
        .iter()
        .filter(|r| {
            let scaled = scale_pos(r.ref_pos);
            is_insertion(scaled) && scaled / 1000 == pos && r.frequency > 0.5
        })
        .map(|r| (scale_pos(r.ref_pos), r.read_base))
        .collect();
    insertions.sort_by_key(|(scaled, _)| *scaled);

    insertions.into_iter().map(|(_, base)| base.as_char() as u8).collect()
}

impl Consensus {
    /// Writes the consensus out as a single-record FASTA.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = fasta::Writer::to_file(path)
            .with_context(|| format!("opening '{}' for writing", path.display()))?;
        writer
            .write(&self.id, None, &self.sequence)
            .with_context(|| format!("writing consensus to '{}'", path.display()))
    }
}
