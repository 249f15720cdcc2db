//! # Prefix Compactor
//!
//! Read IDs are long and repeat prefixes; this module assigns stable
//! numeric IDs to shared 31-character read-ID prefixes and rewrites
//! affected files in place, keeping per-mutation read-id tables small.
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde_json;

use crate::basecall::{is_basecall_file_name, is_empty_data_file};

/// Length of the read-id prefix that gets interned into the dictionary.
pub const PREFIX_LEN: usize = 31;

/// Persisted mapping from fixed-length read-id prefix to a positive integer.
/// Monotonically extended: existing keys never change value, and new keys
/// receive `max(existing) + 1`, assigned in the order prefixes are first
/// encountered during a pass-1 scan.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PrefixDictionary(BTreeMap<String, u32>);

impl PrefixDictionary {
    /// Loads the dictionary from `path`, or starts empty if it doesn't
    /// exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).with_context(|| format!("parsing '{}'", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
        serde_json::to_writer_pretty(file, &self.0).with_context(|| format!("writing '{}'", path.display()))
    }

    pub fn get(&self, prefix: &str) -> Option<u32> {
        self.0.get(prefix).copied()
    }

    /// Whether `n` is a value actually assigned to some prefix.
    fn contains_value(&self, n: u32) -> bool {
        self.0.values().any(|&v| v == n)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extends the dictionary with any prefixes in `prefixes` not already
    /// present, in iteration order, each receiving the next integer above
    /// the current maximum.
    fn extend_with(&mut self, prefixes: impl IntoIterator<Item = String>) {
        let mut next = self.0.values().max().copied().unwrap_or(0) + 1;
        for prefix in prefixes {
            self.0.entry(prefix).or_insert_with(|| {
                let assigned = next;
                next += 1;
                assigned
            });
        }
    }
}

/// Splits a read_id into its 31-character prefix and tail. Read ids shorter
/// than [`PREFIX_LEN`] use the whole string as the prefix with an empty
/// tail.
fn split_prefix(read_id: &str) -> (&str, &str) {
    match read_id.char_indices().nth(PREFIX_LEN) {
        Some((byte_idx, _)) => read_id.split_at(byte_idx),
        None => (read_id, ""),
    }
}

/// Whether `read_id` already has the compactor's own `<n>-<tail>` shape
/// (leading digits then a dash) *and* the leading digits name a value the
/// dictionary actually assigned. A freshly rewritten id is far shorter than
/// [`PREFIX_LEN`], so without this check a second pass over an
/// already-rewritten file would treat the whole short string as a brand new
/// prefix and reassign it, breaking the idempotence the compactor promises.
///
/// read_id is an opaque string with no format guarantee, so a raw,
/// never-compacted id can coincidentally look like `<digits>-<suffix>`
/// (a lane/tile-encoded id, say). Shape alone isn't enough to tell that
/// apart from this compactor's own output; checking that the digits are a
/// value the dictionary actually handed out is.
fn already_compacted(read_id: &str, dict: &PrefixDictionary) -> bool {
    let digits = read_id.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || read_id.as_bytes().get(digits) != Some(&b'-') {
        return false;
    }
    read_id[..digits]
        .parse::<u32>()
        .is_ok_and(|n| dict.contains_value(n))
}

/// Runs the two-pass compaction over every file in `files` that has a
/// `read_id` column, persisting the dictionary at `dict_path`. Empty files
/// (no data rows) are skipped silently. Returns the dictionary produced.
pub fn compact(files: &[PathBuf], dict_path: &Path) -> Result<PrefixDictionary> {
    let mut files_sorted = files.to_vec();
    files_sorted.sort();

    let mut dict = PrefixDictionary::load(dict_path)?;

    // Pass 1: scan every file for unseen prefixes and extend the dictionary.
    for file in &files_sorted {
        if is_empty_data_file(file)? {
            continue;
        }
        let prefixes = collect_prefixes(file, &dict)?;
        dict.extend_with(prefixes);
    }
    dict.save(dict_path)?;

    // Pass 2: rewrite every file's read_id column using the now-complete
    // dictionary.
    for file in &files_sorted {
        if is_empty_data_file(file)? {
            continue;
        }
        rewrite_file(file, &dict)?;
    }

    Ok(dict)
}

fn collect_prefixes(path: &Path, dict: &PrefixDictionary) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("opening '{}'", path.display()))?;
    let headers = reader.headers()?.clone();
    let read_id_idx = read_id_column(&headers, path)?;

    let mut prefixes = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(read_id) = record.get(read_id_idx) {
            if already_compacted(read_id, dict) {
                continue;
            }
            prefixes.push(split_prefix(read_id).0.to_string());
        }
    }
    Ok(prefixes)
}

fn rewrite_file(path: &Path, dict: &PrefixDictionary) -> Result<()> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("opening '{}'", path.display()))?;
    let headers = reader.headers()?.clone();
    let read_id_idx = read_id_column(&headers, path)?;

    let tmp_path = path.with_extension("rewrite.tmp");
    {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&tmp_path)
            .with_context(|| format!("creating '{}'", tmp_path.display()))?;
        writer.write_record(&headers)?;

        for record in reader.records() {
            let record = record?;
            let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
            if !already_compacted(&fields[read_id_idx], dict) {
                let (prefix, tail) = split_prefix(&fields[read_id_idx]);
                let id = dict
                    .get(prefix)
                    .with_context(|| format!("prefix '{prefix}' missing from dictionary after pass 1"))?;
                fields[read_id_idx] = format!("{id}-{tail}");
            }
            writer.write_record(&fields)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp_path, path).with_context(|| format!("replacing '{}'", path.display()))?;
    Ok(())
}

fn read_id_column(headers: &csv::StringRecord, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == "read_id")
        .with_context(|| format!("'{}' has no read_id column", path.display()))
}

/// Whether `path`'s name marks it as base-call output, which governs the
/// file layout the compactor preserves when rewriting.
pub fn preserves_ref_pos_column(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(is_basecall_file_name)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    /// Prefix compaction across two files sharing a 31-char prefix.
    #[test]
    fn compacts_shared_prefix_across_files() {
        let dir = tempdir().unwrap();
        let prefix = "A".repeat(PREFIX_LEN);

        let file_a = dir.path().join("a.called_bases");
        let mut f = File::create(&file_a).unwrap();
        writeln!(f, "ref_pos\tread_id").unwrap();
        writeln!(f, "1\t{prefix}-xyz").unwrap();

        let file_b = dir.path().join("b.called_bases");
        let mut f = File::create(&file_b).unwrap();
        writeln!(f, "ref_pos\tread_id").unwrap();
        writeln!(f, "1\t{prefix}-uvw").unwrap();

        let dict_path = dir.path().join("read_id_prefixes.json");
        let dict = compact(&[file_a.clone(), file_b.clone()], &dict_path).unwrap();
        assert_eq!(dict.get(&prefix), Some(1));
        assert_eq!(dict.len(), 1);

        let rewritten_a = fs::read_to_string(&file_a).unwrap();
        assert!(rewritten_a.contains("1--xyz"));
        let rewritten_b = fs::read_to_string(&file_b).unwrap();
        assert!(rewritten_b.contains("1--uvw"));
    }

    #[test]
    fn running_twice_on_same_files_is_idempotent() {
        let dir = tempdir().unwrap();
        let prefix = "C".repeat(PREFIX_LEN);
        let file = dir.path().join("a.called_bases");
        let mut f = File::create(&file).unwrap();
        writeln!(f, "ref_pos\tread_id").unwrap();
        writeln!(f, "1\t{prefix}-xyz").unwrap();

        let dict_path = dir.path().join("read_id_prefixes.json");
        let first_dict = compact(&[file.clone()], &dict_path).unwrap();
        let after_first = fs::read_to_string(&file).unwrap();

        // A second pass over the already-rewritten file should find its
        // (now short) read_id prefix already interned and leave everything
        // byte-for-byte unchanged.
        let second_dict = compact(&[file.clone()], &dict_path).unwrap();
        let after_second = fs::read_to_string(&file).unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(second_dict.len(), first_dict.len());
    }

    #[test]
    fn digit_prefixed_raw_id_not_in_dictionary_is_compacted_normally() {
        // "42-readA" looks like this compactor's own `<n>-<tail>` output,
        // but nothing has assigned 42 yet, so it must be treated as a raw,
        // never-compacted id (e.g. a lane/tile-encoded read name) and
        // interned like any other prefix rather than skipped.
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.called_bases");
        let mut f = File::create(&file).unwrap();
        writeln!(f, "ref_pos\tread_id").unwrap();
        writeln!(f, "1\t42-readA").unwrap();

        let dict_path = dir.path().join("dict.json");
        let dict = compact(&[file.clone()], &dict_path).unwrap();

        assert_eq!(dict.get("42-readA"), Some(1));
        let rewritten = fs::read_to_string(&file).unwrap();
        assert!(rewritten.contains("1-"));
    }

    #[test]
    fn empty_files_are_skipped() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("empty.called_bases");
        let mut f = File::create(&file).unwrap();
        writeln!(f, "ref_pos\tread_id").unwrap();

        let dict_path = dir.path().join("dict.json");
        let dict = compact(&[file.clone()], &dict_path).unwrap();
        assert!(dict.is_empty());
    }
}
