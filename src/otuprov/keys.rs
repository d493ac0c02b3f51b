//! Composite-key conventions shared across the pipeline.
//!
//! Sequence and sample identifiers are composed out of plain string
//! conventions: `datasetID--recordID` joins a dataset label to a record
//! identifier, `;size=N` annotates a sequence ID with its dereplicated
//! abundance, and dataset labels swap `-` for `_` when they round-trip
//! through file stems. Each script used to re-implement these splits
//! independently; they live here once, with round-trip tests.

use std::error::Error;
use std::fmt;

use regex::Regex;

/// Separator between a dataset label and the record it qualifies.
pub const DATASET_SEP: &str = "--";

/// Filename prefix reserved for the concatenated master map, which the
/// per-dataset map directory scan must skip.
pub const MASTER_MAP_PREFIX: &str = "dereped";

/// One token of a master dereplication map line,
/// `origID--datasetID;size=N:1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterToken {
    pub orig_id: String,
    pub dataset: String,
}

/// Truncates a sequence ID at its `;size=N` annotation, if any.
pub fn strip_size(seq_id: &str) -> &str {
    match seq_id.find(';') {
        Some(at) => &seq_id[..at],
        None => seq_id,
    }
}

/// Normalizes a raw dataset label for use as a map key: every `-`
/// becomes `_`, recovering the file stem the label was derived from.
/// Lossy by convention — two dataset names differing only in dash
/// versus underscore placement collapse to the same label, so dataset
/// names must not contain underscores to begin with.
pub fn dataset_label(raw: &str) -> String {
    raw.replace('-', "_")
}

/// Derives the dashed dataset label encoded into sequence headers from
/// a file stem, the inverse of `dataset_label`.
pub fn dataset_from_stem(stem: &str) -> String {
    stem.replace('_', "-")
}

/// Qualifies a sample ID with its dataset, `datasetID--sampleID`.
pub fn sample_key(dataset: &str, sample: &str) -> String {
    format!("{}{}{}", dataset, DATASET_SEP, sample)
}

/// Joins a record ID to a dataset label, `recordID--datasetID`.
pub fn dataset_suffixed(record: &str, dataset: &str) -> String {
    format!("{}{}{}", record, DATASET_SEP, dataset)
}

/// Splits a master map token `origID--datasetID;size=N:1` into its
/// original sequence ID and normalized dataset label.
pub fn parse_master_token(token: &str) -> Result<MasterToken, KeyError> {
    let (orig_id, rest) = token
        .split_once(DATASET_SEP)
        .ok_or_else(|| KeyError::BadToken(token.to_string()))?;
    if orig_id.is_empty() || rest.is_empty() {
        return Err(KeyError::BadToken(token.to_string()));
    }
    let raw_dataset = match rest.find(';') {
        Some(at) => &rest[..at],
        None => rest,
    };
    Ok(MasterToken {
        orig_id: orig_id.to_string(),
        dataset: dataset_label(raw_dataset),
    })
}

/// Pattern matching the `size=N` abundance annotation.
pub fn size_pattern() -> Regex {
    Regex::new(r"size=(\d+)").unwrap()
}

/// Extracts the `size=N` annotation from a sequence ID or map token
/// using a pre-compiled `size_pattern()`.
pub fn annotated_size(pattern: &Regex, text: &str) -> Result<u64, KeyError> {
    let cap = pattern
        .captures(text)
        .ok_or_else(|| KeyError::NoSize(text.to_string()))?;
    cap[1]
        .parse::<u64>()
        .map_err(|_| KeyError::NoSize(text.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    BadToken(String),
    NoSize(String),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyError::BadToken(token) => {
                write!(f, "Bad dataset token: \"{}\"", token)
            }
            KeyError::NoSize(text) => {
                write!(f, "No size annotation in \"{}\"", text)
            }
        }
    }
}

impl Error for KeyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_size_annotation() {
        assert_eq!(strip_size("seq1;size=532"), "seq1");
        assert_eq!(strip_size("seq1"), "seq1");
        assert_eq!(strip_size(";size=1"), "");
    }

    #[test]
    fn dataset_label_round_trip() {
        assert_eq!(dataset_label("crc-zhao"), "crc_zhao");
        assert_eq!(dataset_from_stem("crc_zhao"), "crc-zhao");
        assert_eq!(dataset_from_stem(&dataset_label("crc-zhao")), "crc-zhao");
        assert_eq!(dataset_label(&dataset_from_stem("crc_zhao")), "crc_zhao");
    }

    #[test]
    fn labels_never_keep_dashes() {
        for raw in ["a-b-c", "a-b", "abc"] {
            assert!(!dataset_label(raw).contains('-'));
        }
    }

    #[test]
    fn master_token_fields() {
        let tok = parse_master_token("seq44--crc-zhao;size=123:1").unwrap();
        assert_eq!(tok.orig_id, "seq44");
        assert_eq!(tok.dataset, "crc_zhao");

        let bare = parse_master_token("seq44--crc-zhao").unwrap();
        assert_eq!(bare.dataset, "crc_zhao");

        assert!(parse_master_token("seq44;size=123").is_err());
        assert!(parse_master_token("--crc-zhao;size=1:1").is_err());
    }

    #[test]
    fn sample_keys_qualified() {
        assert_eq!(sample_key("crc_zhao", "s1"), "crc_zhao--s1");
        assert_eq!(dataset_suffixed("seq1", "crc-zhao"), "seq1--crc-zhao");
    }

    #[test]
    fn sizes_extracted() {
        let pat = size_pattern();
        assert_eq!(annotated_size(&pat, "seq1;size=532").unwrap(), 532);
        assert_eq!(
            annotated_size(&pat, "seq44--crc-zhao;size=123:1").unwrap(),
            123
        );
        assert!(annotated_size(&pat, "seq1").is_err());
    }
}
