//! Reconstruction of per-sample OTU abundances from layered
//! dereplication bookkeeping.
//!
//! Sequences are dereplicated twice before clustering: once within
//! each dataset, then again across the concatenated datasets. The
//! clustering output therefore refers to doubly-dereplicated IDs, and
//! recovering an OTU-by-sample count table means walking back through
//! both layers: cluster member -> master map -> dataset-level original
//! ID -> per-dataset map -> per-sample counts, summed per OTU with
//! samples requalified as `datasetID--sampleID`.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io;

use anyhow;

use crate::cluster::ClusterAssignment;
use crate::derep_map::{DatasetDerepMap, MasterDerepMap};
use crate::keys;

/// The dataset-level original sequence IDs feeding one OTU from one
/// dataset, in the order their cluster members were discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetContribution {
    dataset: String,
    orig_ids: Vec<String>,
}

impl DatasetContribution {
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn orig_ids(&self) -> &[String] {
        &self.orig_ids
    }
}

/// Every dataset contribution to one OTU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtuContribution {
    otu_id: String,
    datasets: Vec<DatasetContribution>,
}

impl OtuContribution {
    pub fn otu_id(&self) -> &str {
        &self.otu_id
    }

    pub fn datasets(&self) -> &[DatasetContribution] {
        &self.datasets
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetContribution> {
        self.datasets.iter().find(|d| d.dataset == name)
    }

    fn push_orig_id(&mut self, dataset: &str, orig_id: &str) {
        match self.datasets.iter_mut().find(|d| d.dataset == dataset) {
            Some(found) => found.orig_ids.push(orig_id.to_string()),
            None => self.datasets.push(DatasetContribution {
                dataset: dataset.to_string(),
                orig_ids: vec![orig_id.to_string()],
            }),
        }
    }
}

/// Join of a `ClusterAssignment` against a `MasterDerepMap`: for every
/// OTU, the original sequence IDs that feed it, grouped by dataset.
/// OTUs stay in cluster discovery order.
#[derive(Debug, Clone, Default)]
pub struct ContributionIndex {
    otus: Vec<OtuContribution>,
}

impl ContributionIndex {
    pub fn otus(&self) -> &[OtuContribution] {
        &self.otus
    }

    pub fn get(&self, otu_id: &str) -> Option<&OtuContribution> {
        self.otus.iter().find(|o| o.otu_id == otu_id)
    }

    pub fn len(&self) -> usize {
        self.otus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.otus.is_empty()
    }
}

/// Builds the contribution index. Every member of every cluster must
/// appear in the master map; a member that does not means the
/// clustering input and the dereplication input disagree, and the
/// join aborts naming the offending sequence.
pub fn build_contribution_index(
    assignment: &ClusterAssignment,
    master: &MasterDerepMap,
) -> Result<ContributionIndex, anyhow::Error> {
    let mut index = ContributionIndex::default();

    for cluster in assignment.clusters() {
        let mut contribution = OtuContribution {
            otu_id: cluster.otu_id().to_string(),
            datasets: Vec::new(),
        };

        for member in cluster.members() {
            let origins = master.origins_of(member).ok_or_else(|| {
                ProvenanceError::MissingMasterEntry {
                    seq_id: member.to_string(),
                    otu_id: cluster.otu_id().to_string(),
                }
            })?;
            // Sorted so the per-OTU dataset order does not depend on
            // hash iteration; each member has one origin per dataset.
            let mut datasets: Vec<&String> = origins.keys().collect();
            datasets.sort();
            for dataset in datasets {
                contribution.push_orig_id(dataset, &origins[dataset]);
            }
        }

        index.otus.push(contribution);
    }

    Ok(index)
}

/// Sums per-sample counts over the original sequence IDs contributing
/// to one OTU from one dataset, keying the result by
/// `datasetID--sampleID`. Samples appear only if some contributing
/// sequence observed them; zero backfill happens at serialization.
pub fn collapse_counts(
    dataset: &str,
    orig_ids: &[String],
    dataset_map: &DatasetDerepMap,
) -> Result<HashMap<String, f64>, anyhow::Error> {
    let mut collapsed: HashMap<String, f64> = HashMap::new();

    for orig_id in orig_ids {
        let samples = dataset_map.samples_of(orig_id).ok_or_else(|| {
            ProvenanceError::MissingOriginal {
                dataset: dataset.to_string(),
                seq_id: orig_id.to_string(),
            }
        })?;
        for (sample, count) in samples {
            let count: f64 =
                count.parse().map_err(|_| ProvenanceError::BadCount {
                    dataset: dataset.to_string(),
                    seq_id: orig_id.to_string(),
                    sample: sample.to_string(),
                    value: count.to_string(),
                })?;
            *collapsed
                .entry(keys::sample_key(dataset, sample))
                .or_insert(0.0) += count;
        }
    }

    Ok(collapsed)
}

/// The terminal OTU-by-sample count table.
#[derive(Debug, Clone, Default)]
pub struct AbundanceTable {
    otu_order: Vec<String>,
    rows: HashMap<String, HashMap<String, f64>>,
}

impl AbundanceTable {
    /// OTU IDs in cluster discovery order.
    pub fn otus(&self) -> &[String] {
        &self.otu_order
    }

    /// The qualified-sample counts for one OTU.
    pub fn counts_of(&self, otu_id: &str) -> Option<&HashMap<String, f64>> {
        self.rows.get(otu_id)
    }

    /// Union of all qualified sample IDs across the table, sorted.
    pub fn sample_keys(&self) -> Vec<String> {
        let mut samples: Vec<String> = Vec::new();
        for counts in self.rows.values() {
            for sample in counts.keys() {
                if !samples.contains(sample) {
                    samples.push(sample.clone());
                }
            }
        }
        samples.sort();
        samples
    }

    /// Writes the table as a tab-delimited matrix with OTUs as columns
    /// and qualified samples as rows. Combinations never observed
    /// during aggregation are written as 0.
    pub fn write_tsv<W: io::Write>(&self, dest: W) -> Result<(), anyhow::Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(dest);

        let mut header = vec![String::new()];
        header.extend(self.otu_order.iter().cloned());
        writer.write_record(&header)?;

        for sample in self.sample_keys() {
            let mut record = vec![sample.clone()];
            for otu in &self.otu_order {
                let count = self
                    .rows
                    .get(otu)
                    .and_then(|counts| counts.get(&sample))
                    .copied()
                    .unwrap_or(0.0);
                record.push(format!("{}", count));
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Assembles the final table: for every OTU and every contributing
/// dataset, collapse that dataset's counts and merge them into the
/// OTU's row. Qualified sample IDs are disjoint across datasets, so
/// merging never overwrites.
pub fn assemble_table(
    index: &ContributionIndex,
    dataset_maps: &HashMap<String, DatasetDerepMap>,
) -> Result<AbundanceTable, anyhow::Error> {
    let mut table = AbundanceTable::default();

    for otu in index.otus() {
        let mut row: HashMap<String, f64> = HashMap::new();
        for contribution in otu.datasets() {
            let dataset_map =
                dataset_maps.get(contribution.dataset()).ok_or_else(|| {
                    ProvenanceError::MissingDatasetMap {
                        dataset: contribution.dataset().to_string(),
                        otu_id: otu.otu_id().to_string(),
                    }
                })?;
            let collapsed = collapse_counts(
                contribution.dataset(),
                contribution.orig_ids(),
                dataset_map,
            )?;
            row.extend(collapsed);
        }
        table.otu_order.push(otu.otu_id().to_string());
        table.rows.insert(otu.otu_id().to_string(), row);
    }

    Ok(table)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvenanceError {
    MissingMasterEntry { seq_id: String, otu_id: String },
    MissingOriginal { dataset: String, seq_id: String },
    BadCount { dataset: String, seq_id: String, sample: String, value: String },
    MissingDatasetMap { dataset: String, otu_id: String },
}

impl fmt::Display for ProvenanceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProvenanceError::MissingMasterEntry { seq_id, otu_id } => write!(
                f,
                "Cluster member \"{}\" (OTU \"{}\") missing from master dereplication map",
                seq_id, otu_id
            ),
            ProvenanceError::MissingOriginal { dataset, seq_id } => write!(
                f,
                "Sequence \"{}\" missing from dereplication map for dataset \"{}\"",
                seq_id, dataset
            ),
            ProvenanceError::BadCount { dataset, seq_id, sample, value } => write!(
                f,
                "Bad count \"{}\" for sample \"{}\" of sequence \"{}\" in dataset \"{}\"",
                value, sample, seq_id, dataset
            ),
            ProvenanceError::MissingDatasetMap { dataset, otu_id } => write!(
                f,
                "No dereplication map for dataset \"{}\" contributing to OTU \"{}\"",
                dataset, otu_id
            ),
        }
    }
}

impl Error for ProvenanceError {}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cluster::parse_cluster_results;
    use crate::derep_map::{parse_dataset_derep_map, parse_master_derep_map};

    fn clusters(text: &str) -> ClusterAssignment {
        parse_cluster_results("test.tab", text).unwrap()
    }

    fn master(text: &str) -> MasterDerepMap {
        parse_master_derep_map("dereped.map", text).unwrap()
    }

    fn dataset_map(name: &str, text: &str) -> DatasetDerepMap {
        parse_dataset_derep_map(name, text).unwrap()
    }

    #[test]
    fn contribution_index_from_single_cluster() {
        let assignment = clusters("A\totu\t*\t*\t*\nB\tmatch\t99.0\t*\tA\n");
        let map = master("A\tX--ds1;size=5:1\nB\tY--ds1;size=3:1\n");

        let index = build_contribution_index(&assignment, &map).unwrap();
        assert_eq!(index.len(), 1);

        let otu = index.get("A").unwrap();
        let ds1 = otu.dataset("ds1").unwrap();
        assert_eq!(ds1.orig_ids(), ["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn member_missing_from_master_map_aborts() {
        let assignment = clusters("A\totu\t*\t*\t*\nB\tmatch\t99.0\t*\tA\n");
        let map = master("A\tX--ds1;size=5:1\n");

        let err = build_contribution_index(&assignment, &map).unwrap_err();
        let err = err.downcast::<ProvenanceError>().unwrap();
        match err {
            ProvenanceError::MissingMasterEntry { seq_id, otu_id } => {
                assert_eq!(seq_id, "B");
                assert_eq!(otu_id, "A");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn collapse_sums_across_sequences() {
        let map = dataset_map("ds1.map", "X\ts1:5\nY\ts1:3\n");
        let orig_ids = vec!["X".to_string(), "Y".to_string()];

        let collapsed = collapse_counts("ds1", &orig_ids, &map).unwrap();
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed.get("ds1--s1").copied(), Some(8.0));
    }

    #[test]
    fn collapse_is_order_independent() {
        let map = dataset_map("ds1.map", "X\ts1:5 s2:2\nY\ts1:3\nZ\ts3:7\n");
        let fwd = vec!["X".to_string(), "Y".to_string(), "Z".to_string()];
        let rev: Vec<String> = fwd.iter().rev().cloned().collect();

        assert_eq!(
            collapse_counts("ds1", &fwd, &map).unwrap(),
            collapse_counts("ds1", &rev, &map).unwrap()
        );
    }

    #[test]
    fn collapse_keeps_only_observed_samples() {
        let map = dataset_map("ds1.map", "X\ts1:5\nY\ts2:3\n");
        let collapsed =
            collapse_counts("ds1", &["X".to_string()], &map).unwrap();
        assert_eq!(collapsed.len(), 1);
        assert!(collapsed.get("ds1--s2").is_none());
    }

    #[test]
    fn bad_count_names_its_location() {
        let map = dataset_map("ds1.map", "X\ts1:five\n");
        let err = collapse_counts("ds1", &["X".to_string()], &map).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("five"));
        assert!(msg.contains("s1"));
        assert!(msg.contains("ds1"));
    }

    #[test]
    fn assembled_row_unions_datasets() {
        let assignment = clusters("A\totu\t*\t*\t*\nB\tmatch\t99.0\t*\tA\n");
        let map = master("A\tX--ds1;size=5:1 P--ds2;size=2:1\nB\tY--ds1;size=3:1\n");
        let index = build_contribution_index(&assignment, &map).unwrap();

        let mut maps = HashMap::new();
        maps.insert("ds1".to_string(), dataset_map("ds1.map", "X\ts1:5\nY\ts1:3\n"));
        maps.insert("ds2".to_string(), dataset_map("ds2.map", "P\ts1:2 s9:4\n"));

        let table = assemble_table(&index, &maps).unwrap();
        let row = table.counts_of("A").unwrap();
        assert_eq!(row.get("ds1--s1").copied(), Some(8.0));
        assert_eq!(row.get("ds2--s1").copied(), Some(2.0));
        assert_eq!(row.get("ds2--s9").copied(), Some(4.0));
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn contributing_dataset_without_map_aborts() {
        let assignment = clusters("A\totu\t*\t*\t*\n");
        let map = master("A\tX--ds1;size=5:1\n");
        let index = build_contribution_index(&assignment, &map).unwrap();

        let err = assemble_table(&index, &HashMap::new()).unwrap_err();
        let err = err.downcast::<ProvenanceError>().unwrap();
        match err {
            ProvenanceError::MissingDatasetMap { dataset, otu_id } => {
                assert_eq!(dataset, "ds1");
                assert_eq!(otu_id, "A");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn serialized_table_backfills_zero() {
        let assignment = clusters("A\totu\t*\t*\t*\nB\totu\t*\t*\t*\n");
        let map = master("A\tX--ds1;size=5:1\nB\tP--ds2;size=2:1\n");
        let index = build_contribution_index(&assignment, &map).unwrap();

        let mut maps = HashMap::new();
        maps.insert("ds1".to_string(), dataset_map("ds1.map", "X\ts1:5\n"));
        maps.insert("ds2".to_string(), dataset_map("ds2.map", "P\ts2:2\n"));

        let table = assemble_table(&index, &maps).unwrap();
        let mut out = Vec::new();
        table.write_tsv(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let expected = "\
\tA\tB
ds1--s1\t5\t0
ds2--s2\t0\t2
";
        assert_eq!(text, expected);
    }
}
