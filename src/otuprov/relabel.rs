//! Dataset-provenance relabeling of FASTA and map files.
//!
//! After per-dataset dereplication every output still carries bare
//! sequence IDs; before datasets are concatenated and re-dereplicated,
//! those IDs get the dataset label stitched in so provenance survives
//! the next round. Dataset labels come from file stems with `_`
//! swapped for `-`, and must themselves contain no underscores.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io;

use anyhow;

use bio::io::fasta;

use crate::keys;

/// Prefixes every FASTA header with `datasetID--`, turning `>seqID`
/// into `>datasetID--seqID`. Returns the number of records written.
pub fn relabel_trimmed_fasta<R: io::Read, W: io::Write>(
    input: R,
    dest: W,
    dataset: &str,
) -> Result<usize, anyhow::Error> {
    let mut writer = fasta::Writer::new(dest);
    let mut total = 0;

    for result in fasta::Reader::new(input).records() {
        let record = result?;
        let new_id = keys::sample_key(dataset, record.id());
        writer.write(&new_id, record.desc(), record.seq())?;
        total += 1;
    }

    Ok(total)
}

/// Rewrites dereplicated-FASTA headers `>seqID;size=N` as
/// `>seqID--datasetID;size=N_1`. The trailing `_1` makes downstream
/// dereplication treat the whole handle as the sample ID. Returns the
/// number of records written.
pub fn relabel_derep_fasta<R: io::Read, W: io::Write>(
    input: R,
    dest: W,
    dataset: &str,
) -> Result<usize, anyhow::Error> {
    let mut writer = fasta::Writer::new(dest);
    let mut total = 0;

    for result in fasta::Reader::new(input).records() {
        let record = result?;
        let id = record.id();
        let (bare, annot) = id.split_once(';').ok_or_else(|| {
            RelabelError::NoSizeAnnotation(id.to_string())
        })?;
        let new_id =
            format!("{};{}_1", keys::dataset_suffixed(bare, dataset), annot);
        writer.write(&new_id, record.desc(), record.seq())?;
        total += 1;
    }

    Ok(total)
}

/// Rewrites the first column of a dereplication map so each `seqID`
/// becomes `seqID--datasetID`, leaving the token list untouched.
pub fn relabel_map(
    name: &str,
    text: &str,
    dataset: &str,
) -> Result<String, anyhow::Error> {
    let mut relabeled = String::new();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (seq_id, tokens) =
            line.trim_end().split_once('\t').ok_or_else(|| {
                RelabelError::NoTab {
                    file: name.to_string(),
                    line: line.to_string(),
                }
            })?;
        relabeled.push_str(&keys::dataset_suffixed(seq_id, dataset));
        relabeled.push('\t');
        relabeled.push_str(tokens);
        relabeled.push('\n');
    }

    Ok(relabeled)
}

/// Totals the `size=N` annotations on each line of a dereplication
/// map, in file order.
pub fn total_sizes(
    name: &str,
    map_text: &str,
) -> Result<Vec<(String, u64)>, anyhow::Error> {
    let pattern = keys::size_pattern();
    let mut sizes = Vec::new();

    for line in map_text.lines() {
        if line.is_empty() {
            continue;
        }
        let (seq_id, tokens) =
            line.trim_end().split_once('\t').ok_or_else(|| {
                RelabelError::NoTab {
                    file: name.to_string(),
                    line: line.to_string(),
                }
            })?;
        let mut total = 0;
        for token in tokens.split(' ').filter(|t| !t.is_empty()) {
            total += keys::annotated_size(&pattern, token).map_err(|_| {
                RelabelError::NoTokenSize {
                    file: name.to_string(),
                    token: token.to_string(),
                    line: line.to_string(),
                }
            })?;
        }
        sizes.push((seq_id.to_string(), total));
    }

    Ok(sizes)
}

/// Rewrites a dereplicated FASTA with headers `>seqID;size=TOTAL` and
/// records ordered largest total first. `sizes` comes from
/// `total_sizes` on the matching map; a sequence on either side
/// without a counterpart on the other is a fatal inconsistency.
pub fn sort_fasta_by_size<R: io::Read, W: io::Write>(
    input: R,
    dest: W,
    sizes: &[(String, u64)],
) -> Result<usize, anyhow::Error> {
    let totals: HashMap<&str, u64> = sizes
        .iter()
        .map(|(seq_id, total)| (seq_id.as_str(), *total))
        .collect();

    let mut records: HashMap<String, fasta::Record> = HashMap::new();
    for result in fasta::Reader::new(input).records() {
        let record = result?;
        let bare = keys::strip_size(record.id()).to_string();
        if !totals.contains_key(bare.as_str()) {
            return Err(RelabelError::UnmappedSequence(bare).into());
        }
        records.insert(bare, record);
    }

    // Stable sort keeps map-file order among equal sizes.
    let mut ordered: Vec<&(String, u64)> = sizes.iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1));

    let mut writer = fasta::Writer::new(dest);
    let mut total = 0;
    for (seq_id, size) in ordered {
        let record = records.get(seq_id).ok_or_else(|| {
            RelabelError::MissingSequence(seq_id.to_string())
        })?;
        let new_id = format!("{};size={}", seq_id, size);
        writer.write(&new_id, record.desc(), record.seq())?;
        total += 1;
    }

    Ok(total)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelabelError {
    NoTab { file: String, line: String },
    NoSizeAnnotation(String),
    NoTokenSize { file: String, token: String, line: String },
    UnmappedSequence(String),
    MissingSequence(String),
}

impl fmt::Display for RelabelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RelabelError::NoTab { file, line } => {
                write!(f, "{}: no tab separator in \"{}\"", file, line)
            }
            RelabelError::NoSizeAnnotation(id) => {
                write!(f, "No size annotation in FASTA header \"{}\"", id)
            }
            RelabelError::NoTokenSize { file, token, line } => write!(
                f,
                "{}: no size annotation in token \"{}\" in \"{}\"",
                file, token, line
            ),
            RelabelError::UnmappedSequence(id) => {
                write!(f, "FASTA sequence \"{}\" missing from map file", id)
            }
            RelabelError::MissingSequence(id) => {
                write!(f, "Mapped sequence \"{}\" missing from FASTA file", id)
            }
        }
    }
}

impl Error for RelabelError {}
