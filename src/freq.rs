//! # Frequency Aggregator
//!
//! Converts per-read base-call streams into the allele-frequency table.
//! The dataframe group-by/merge/rank pipeline this replaces is
//! re-architected here as three explicit passes over a hash map keyed by
//! scaled position and base, which avoids both floating-point grouping
//! ambiguity and a full dataframe dependency.
use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;

use crate::base::{integer_part, scale_pos, unscale_pos, Base, ScaledPos, ALL_BASES};
use crate::basecall::{self, BaseCallRecord};
use crate::reference::Reference;

/// One row of the aggregated allele-frequency table.
#[derive(Debug, Clone, PartialEq)]
pub struct AlleleFreqRow {
    pub ref_pos: f64,
    pub read_base: Base,
    pub ref_base: Base,
    pub base_count: u32,
    pub overlap_ratio: f64,
    pub avg_qscore: f64,
    pub coverage: u32,
    pub frequency: f64,
    pub base_rank: i64,
    pub probability: f64,
}

/// The full allele-frequency table for one iteration, sorted by
/// `(ref_pos, read_base)`.
#[derive(Debug, Clone, Default)]
pub struct FreqTable {
    pub rows: Vec<AlleleFreqRow>,
}

#[derive(Default)]
struct Accumulator {
    read_ids: HashSet<String>,
    overlap_sum: u64,
    quality_sum: u64,
}

/// Builds the allele-frequency table from every base-call file in
/// `bcr_files`, seeded densely over `reference`'s coordinate grid so every
/// position carries a row for all five bases even where nothing was
/// observed.
pub fn aggregate(bcr_files: &[impl AsRef<Path>], reference: &Reference) -> Result<FreqTable> {
    let mut accum: HashMap<(ScaledPos, Base), Accumulator> = HashMap::new();

    // Step 1: seed every integer position with all five bases so that the
    // table stays dense even where nothing was observed.
    for pos in 1..=reference.len() {
        let scaled = scale_pos(pos as f64);
        for base in ALL_BASES {
            accum.entry((scaled, base)).or_default();
        }
    }

    // Steps 2-3: fold every stream's records into the running accumulators.
    // Grouping by (ref_pos, read_base) and counting *distinct* read_ids
    // mirrors the union semantics used when merging partial tables: a read
    // that appears twice for the same call at the same position (which
    // would violate the BCR uniqueness invariant) is still only counted
    // once.
    for file in bcr_files {
        for record in basecall::read_records(file.as_ref())? {
            let BaseCallRecord {
                ref_pos,
                read_base,
                read_id,
                overlap,
                quality,
            } = record;
            let entry = accum.entry((ref_pos, read_base)).or_default();
            entry.read_ids.insert(read_id);
            entry.overlap_sum += overlap as u64;
            entry.quality_sum += quality as u64;
        }
    }

    // Steps 4-8: turn accumulators into rows with overlap_ratio/avg_qscore
    // resolved, dropping the helper sums.
    let mut rows: Vec<AlleleFreqRow> = accum
        .into_iter()
        .map(|((scaled_pos, read_base), acc)| {
            let base_count = acc.read_ids.len() as u32;
            let overlap_ratio = if base_count > 0 {
                acc.overlap_sum as f64 / base_count as f64 / 2.0
            } else {
                0.0
            };
            let total_calls = base_count as f64 * (1.0 + overlap_ratio);
            let avg_qscore = if total_calls > 0.0 {
                round_to(acc.quality_sum as f64 / total_calls, 1)
            } else {
                0.0
            };
            let ref_base = reference
                .base_at(integer_part(scaled_pos) as usize)
                .and_then(|b| Base::from_reference_byte(b).ok())
                .unwrap_or(Base::A);

            AlleleFreqRow {
                ref_pos: unscale_pos(scaled_pos),
                read_base,
                ref_base,
                base_count,
                overlap_ratio: round_to(overlap_ratio, 4),
                avg_qscore,
                coverage: 0,
                frequency: 0.0,
                base_rank: 0,
                probability: 0.0,
            }
        })
        .collect();

    // Step 9: coverage, broadcast per integer(ref_pos).
    let mut coverage_by_pos: HashMap<i64, u32> = HashMap::new();
    for row in &rows {
        *coverage_by_pos.entry(integer_part(scale_pos(row.ref_pos))).or_insert(0) += row.base_count;
    }
    for row in &mut rows {
        row.coverage = coverage_by_pos[&integer_part(scale_pos(row.ref_pos))];
    }

    // Step 10: frequency.
    for row in &mut rows {
        row.frequency = if row.coverage > 0 {
            round_to(row.base_count as f64 / row.coverage as f64, 4)
        } else {
            0.0
        };
    }

    // Step 11: base_rank = (#distinct read_base values in the whole table)
    // - rank_ascending_min(base_count grouped by exact ref_pos).
    let n_distinct_bases = rows.iter().map(|r| r.read_base).collect::<HashSet<_>>().len() as i64;
    assign_base_ranks(&mut rows, n_distinct_bases);

    // Step 12: probability.
    for row in &mut rows {
        row.probability = round_to(1.0 - (1.0 - row.frequency).powi(row.coverage as i32), 4);
    }

    rows.sort_by(|a, b| {
        scale_pos(a.ref_pos)
            .cmp(&scale_pos(b.ref_pos))
            .then(a.read_base.cmp(&b.read_base))
    });

    Ok(FreqTable { rows })
}

/// Assigns `base_rank` in place, grouping rows by their exact (scaled)
/// `ref_pos` and applying the "min" tie method: equal `base_count` values
/// share the lowest rank within the group, and the next distinct value
/// skips by the number of tied rows.
fn assign_base_ranks(rows: &mut [AlleleFreqRow], n_distinct_bases: i64) {
    let mut groups: HashMap<ScaledPos, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        groups.entry(scale_pos(row.ref_pos)).or_default().push(idx);
    }

    for indices in groups.values() {
        let mut sorted = indices.clone();
        sorted.sort_by_key(|&idx| rows[idx].base_count);

        let mut rank = 1i64;
        let mut previous_count: Option<u32> = None;
        for (position, &idx) in sorted.iter().enumerate() {
            let count = rows[idx].base_count;
            if previous_count != Some(count) {
                rank = position as i64 + 1;
                previous_count = Some(count);
            }
            rows[idx].base_rank = n_distinct_bases - rank;
        }
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

impl FreqTable {
    /// Coverage at integer reference position `pos`, or 0 if never seeded.
    pub fn coverage_at(&self, pos: i64) -> u32 {
        self.rows
            .iter()
            .find(|r| integer_part(scale_pos(r.ref_pos)) == pos && !crate::base::is_insertion(scale_pos(r.ref_pos)))
            .map(|r| r.coverage)
            .unwrap_or(0)
    }

    /// Writes the table to `path` as `freqs.tsv`.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        writer.write_record([
            "ref_pos",
            "read_base",
            "ref_base",
            "base_count",
            "overlap_ratio",
            "avg_qscore",
            "coverage",
            "frequency",
            "base_rank",
            "probability",
        ])?;
        for row in &self.rows {
            writer.write_record([
                format!("{:.3}", row.ref_pos),
                row.read_base.to_string(),
                row.ref_base.to_string(),
                row.base_count.to_string(),
                format!("{:.4}", row.overlap_ratio),
                format!("{:.4}", row.avg_qscore),
                row.coverage.to_string(),
                format!("{:.4}", row.frequency),
                row.base_rank.to_string(),
                format!("{:.4}", row.probability),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}
