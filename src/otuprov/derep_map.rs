//! Parsing of dereplication map files.
//!
//! Two layers of bookkeeping share the same outer shape, one line per
//! retained sequence with a tab between the sequence ID and a
//! space-separated token list:
//!
//! * the master map, produced by re-dereplicating the concatenated
//!   per-dataset dereplicated reads, whose tokens are
//!   `origID--datasetID;size=N:1` and record which dataset-level
//!   sequence collapsed into each doubly-dereplicated sequence;
//!
//! * per-dataset maps, whose tokens are `sampleID:count` and record how
//!   many reads each sample contributed to a dataset-level sequence.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow;

use crate::keys;

/// A (seqID, dataset) pair that appeared more than once in the master
/// map. Only one original ID per pair is representable; the later one
/// wins and the earlier is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateOrigin {
    pub seq_id: String,
    pub dataset: String,
    pub dropped: String,
    pub kept: String,
}

/// Master dereplication map: for each doubly-dereplicated sequence ID,
/// the original sequence ID it collapsed from in each dataset.
#[derive(Debug, Clone, Default)]
pub struct MasterDerepMap {
    origins: HashMap<String, HashMap<String, String>>,
    duplicates: Vec<DuplicateOrigin>,
}

impl MasterDerepMap {
    /// Per-dataset original IDs for one sequence, keyed by normalized
    /// dataset label.
    pub fn origins_of(&self, seq_id: &str) -> Option<&HashMap<String, String>> {
        self.origins.get(seq_id)
    }

    /// Collisions encountered while parsing. Non-empty means the
    /// upstream dereplication emitted two origins for the same
    /// (sequence, dataset) pair and data was lost.
    pub fn duplicates(&self) -> &[DuplicateOrigin] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// One dataset's dereplication map: per-sample read counts for each
/// original sequence ID. Counts stay as the numeric strings found in
/// the file; they are only converted when abundances are summed.
#[derive(Debug, Clone, Default)]
pub struct DatasetDerepMap {
    counts: HashMap<String, HashMap<String, String>>,
}

impl DatasetDerepMap {
    pub fn samples_of(&self, seq_id: &str) -> Option<&HashMap<String, String>> {
        self.counts.get(seq_id)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Reads the master dereplication map file.
pub fn read_master_derep_map<P: AsRef<Path>>(
    map_file: P,
) -> Result<MasterDerepMap, anyhow::Error> {
    let name = map_file.as_ref().display().to_string();
    let text = fs::read_to_string(&map_file)?;
    parse_master_derep_map(&name, &text)
}

/// Parses master map text, with `name` identifying the source in error
/// messages.
pub fn parse_master_derep_map(
    name: &str,
    text: &str,
) -> Result<MasterDerepMap, anyhow::Error> {
    let mut map = MasterDerepMap::default();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (seq_id, token_list) = split_map_line(name, line)?;
        let origins = map.origins.entry(seq_id.to_string()).or_default();

        let mut collisions = Vec::new();
        for token in token_list.split(' ').filter(|t| !t.is_empty()) {
            let parsed = keys::parse_master_token(token).map_err(|_| {
                DerepMapError::BadToken {
                    file: name.to_string(),
                    token: token.to_string(),
                    line: line.to_string(),
                }
            })?;
            if let Some(dropped) =
                origins.insert(parsed.dataset.clone(), parsed.orig_id.clone())
            {
                collisions.push(DuplicateOrigin {
                    seq_id: seq_id.to_string(),
                    dataset: parsed.dataset,
                    dropped,
                    kept: parsed.orig_id,
                });
            }
        }
        map.duplicates.extend(collisions);
    }

    Ok(map)
}

/// Reads one per-dataset dereplication map file.
pub fn read_dataset_derep_map<P: AsRef<Path>>(
    map_file: P,
) -> Result<DatasetDerepMap, anyhow::Error> {
    let name = map_file.as_ref().display().to_string();
    let text = fs::read_to_string(&map_file)?;
    parse_dataset_derep_map(&name, &text)
}

/// Parses per-dataset map text, with `name` identifying the source in
/// error messages.
pub fn parse_dataset_derep_map(
    name: &str,
    text: &str,
) -> Result<DatasetDerepMap, anyhow::Error> {
    let mut map = DatasetDerepMap::default();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (seq_id, token_list) = split_map_line(name, line)?;
        let samples = map.counts.entry(seq_id.to_string()).or_default();

        for token in token_list.split(' ').filter(|t| !t.is_empty()) {
            let (sample, count) =
                token.split_once(':').ok_or_else(|| DerepMapError::BadToken {
                    file: name.to_string(),
                    token: token.to_string(),
                    line: line.to_string(),
                })?;
            samples.insert(sample.to_string(), count.to_string());
        }
    }

    Ok(map)
}

/// Scans a directory for per-dataset `*.map` files, skipping the
/// reserved master map, and parses each. The dataset name is the file
/// stem before the first `.`.
pub fn read_dataset_derep_maps<P: AsRef<Path>>(
    derep_dir: P,
) -> Result<HashMap<String, DatasetDerepMap>, anyhow::Error> {
    let mut dataset_maps = HashMap::new();

    for entry in fs::read_dir(&derep_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !file_name.ends_with(".map") || file_name.starts_with(keys::MASTER_MAP_PREFIX)
        {
            continue;
        }
        let dataset = file_name.split('.').next().unwrap_or(file_name);
        let map = read_dataset_derep_map(entry.path())?;
        dataset_maps.insert(dataset.to_string(), map);
    }

    Ok(dataset_maps)
}

fn split_map_line<'a>(
    name: &str,
    line: &'a str,
) -> Result<(&'a str, &'a str), DerepMapError> {
    let trimmed = line.trim_end();
    trimmed.split_once('\t').ok_or_else(|| DerepMapError::NoTab {
        file: name.to_string(),
        line: line.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerepMapError {
    NoTab { file: String, line: String },
    BadToken { file: String, token: String, line: String },
}

impl fmt::Display for DerepMapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DerepMapError::NoTab { file, line } => {
                write!(f, "{}: no tab separator in \"{}\"", file, line)
            }
            DerepMapError::BadToken { file, token, line } => write!(
                f,
                "{}: bad map token \"{}\" in \"{}\"",
                file, token, line
            ),
        }
    }
}

impl Error for DerepMapError {}
