//! Parsing of clustering results into OTU membership.
//!
//! The clustering tool reports one row per input sequence in a
//! five-column tab-delimited table. A row typed `otu` declares its
//! query ID as a new OTU seed, which is the first member of its own
//! cluster; a row typed `match` assigns its query ID to the OTU seeded
//! by the ID in the final column. Seed rows precede their match rows in
//! well-formed output, so a match against an unseen seed is fatal.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow;

use crate::keys;

/// One OTU and the sequence IDs clustered into it, in file order.
/// The seed is always the first member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtuCluster {
    otu_id: String,
    members: Vec<String>,
}

impl OtuCluster {
    pub fn otu_id(&self) -> &str {
        &self.otu_id
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }
}

/// All OTU clusters from one clustering run, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ClusterAssignment {
    clusters: Vec<OtuCluster>,
    seed_index: HashMap<String, usize>,
}

impl ClusterAssignment {
    pub fn clusters(&self) -> &[OtuCluster] {
        &self.clusters
    }

    pub fn get(&self, otu_id: &str) -> Option<&OtuCluster> {
        self.seed_index.get(otu_id).map(|at| &self.clusters[*at])
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    fn open_cluster(&mut self, otu_id: &str) {
        self.seed_index
            .insert(otu_id.to_string(), self.clusters.len());
        self.clusters.push(OtuCluster {
            otu_id: otu_id.to_string(),
            members: vec![otu_id.to_string()],
        });
    }

    fn add_member(&mut self, otu_id: &str, seq_id: &str) -> Option<()> {
        let at = *self.seed_index.get(otu_id)?;
        self.clusters[at].members.push(seq_id.to_string());
        Some(())
    }
}

/// Reads a clustering-result file into a `ClusterAssignment`.
pub fn read_cluster_results<P: AsRef<Path>>(
    cluster_file: P,
) -> Result<ClusterAssignment, anyhow::Error> {
    let name = cluster_file.as_ref().display().to_string();
    let text = fs::read_to_string(&cluster_file)?;
    parse_cluster_results(&name, &text)
}

/// Parses clustering-result text, with `name` identifying the source
/// in error messages.
pub fn parse_cluster_results(
    name: &str,
    text: &str,
) -> Result<ClusterAssignment, anyhow::Error> {
    let mut assignment = ClusterAssignment::default();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() < 2 {
            return Err(ClusterError::short_row(name, line).into());
        }
        let seq_id = keys::strip_size(fields[0]);

        match fields[1] {
            "otu" => assignment.open_cluster(seq_id),
            "match" => {
                if fields.len() < 5 {
                    return Err(ClusterError::short_row(name, line).into());
                }
                let otu_id = keys::strip_size(fields[4]);
                assignment.add_member(otu_id, seq_id).ok_or_else(|| {
                    ClusterError::UnknownSeed {
                        file: name.to_string(),
                        seed: otu_id.to_string(),
                        line: line.to_string(),
                    }
                })?;
            }
            other => {
                return Err(ClusterError::BadRecordType {
                    file: name.to_string(),
                    record_type: other.to_string(),
                    line: line.to_string(),
                }
                .into())
            }
        }
    }

    Ok(assignment)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    ShortRow { file: String, line: String },
    BadRecordType { file: String, record_type: String, line: String },
    UnknownSeed { file: String, seed: String, line: String },
}

impl ClusterError {
    fn short_row(file: &str, line: &str) -> Self {
        ClusterError::ShortRow {
            file: file.to_string(),
            line: line.to_string(),
        }
    }
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClusterError::ShortRow { file, line } => {
                write!(f, "{}: too few columns in \"{}\"", file, line)
            }
            ClusterError::BadRecordType { file, record_type, line } => write!(
                f,
                "{}: unknown record type \"{}\" in \"{}\"",
                file, record_type, line
            ),
            ClusterError::UnknownSeed { file, seed, line } => write!(
                f,
                "{}: match against unseen OTU seed \"{}\" in \"{}\"",
                file, seed, line
            ),
        }
    }
}

impl Error for ClusterError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(assignment: &ClusterAssignment, otu: &str) -> Vec<String> {
        assignment.get(otu).unwrap().members().to_vec()
    }

    #[test]
    fn seeds_are_their_own_members() {
        let text = "A;size=10\totu\t*\t*\t*\nB;size=4\tmatch\t99.2\t*\tA\n";
        let assignment = parse_cluster_results("test.tab", text).unwrap();
        assert_eq!(assignment.len(), 1);
        assert_eq!(members(&assignment, "A"), vec!["A", "B"]);
    }

    #[test]
    fn clusters_in_discovery_order() {
        let text = "\
A\totu\t*\t*\t*
B\totu\t*\t*\t*
C\tmatch\t98.0\t*\tB
D\tmatch\t97.1\t*\tA
";
        let assignment = parse_cluster_results("test.tab", text).unwrap();
        let otus: Vec<&str> = assignment
            .clusters()
            .iter()
            .map(|c| c.otu_id())
            .collect();
        assert_eq!(otus, vec!["A", "B"]);
        assert_eq!(members(&assignment, "A"), vec!["A", "D"]);
        assert_eq!(members(&assignment, "B"), vec!["B", "C"]);
    }

    #[test]
    fn size_annotations_stripped_from_both_ends() {
        let text = "A;size=8\totu\t*\t*\t*\nB;size=2\tmatch\t99.9\t*\tA;size=8\n";
        let assignment = parse_cluster_results("test.tab", text).unwrap();
        assert_eq!(members(&assignment, "A"), vec!["A", "B"]);
    }

    #[test]
    fn match_before_seed_is_fatal() {
        let text = "B\tmatch\t99.2\t*\tA\nA\totu\t*\t*\t*\n";
        let err = parse_cluster_results("test.tab", text).unwrap_err();
        let err = err.downcast::<ClusterError>().unwrap();
        match err {
            ClusterError::UnknownSeed { seed, .. } => assert_eq!(seed, "A"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn malformed_rows_name_the_file_and_line() {
        let err = parse_cluster_results("run7.tab", "A\tchimera\t*\t*\t*\n")
            .unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("run7.tab"));
        assert!(msg.contains("chimera"));

        let err = parse_cluster_results("run7.tab", "A\tmatch\t99.0\n").unwrap_err();
        assert!(format!("{}", err).contains("too few columns"));
    }
}
